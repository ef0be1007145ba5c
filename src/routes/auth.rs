use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::{encode_jwt, AuthError};
use crate::error::ApiError;
use crate::models::user::{SigninRequest, SignupRequest, User};
use crate::state::AppState;

pub async fn signup(
    State(state): State<AppState>,
    payload: Result<Json<SignupRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(payload) = payload.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    payload.validate()?;

    let existing_user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
        .bind(&payload.email)
        .fetch_optional(&state.db)
        .await?;

    if existing_user.is_some() {
        return Err(ApiError::Conflict(
            "An account with this email already exists.".to_string(),
        ));
    }

    let password_hash = bcrypt::hash(&payload.password, bcrypt::DEFAULT_COST).map_err(|err| {
        tracing::error!("failed to hash password: {err}");
        ApiError::Auth(AuthError::Internal)
    })?;

    let user_id = Uuid::new_v4();
    let user = sqlx::query_as::<_, User>(
        "INSERT INTO users (id, name, email, password_hash) VALUES ($1, $2, $3, $4) RETURNING *",
    )
    .bind(user_id)
    .bind(payload.name.trim())
    .bind(payload.email.trim())
    .bind(&password_hash)
    .fetch_one(&state.db)
    .await?;

    let token = encode_jwt(user.id, &state.auth_keys)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Account created.",
            "token": token,
            "user": user,
        })),
    ))
}

pub async fn signin(
    State(state): State<AppState>,
    payload: Result<Json<SigninRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(payload) = payload.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
        .bind(&payload.email)
        .fetch_optional(&state.db)
        .await?;

    // Same response whether the email is unknown or the password is wrong.
    let user = user.ok_or(AuthError::WrongCredentials)?;

    let password_is_correct =
        bcrypt::verify(&payload.password, &user.password_hash).map_err(|err| {
            tracing::error!("failed to verify password: {err}");
            ApiError::Auth(AuthError::Internal)
        })?;

    if !password_is_correct {
        return Err(AuthError::WrongCredentials.into());
    }

    let token = encode_jwt(user.id, &state.auth_keys)?;

    Ok(Json(json!({
        "message": "Signed in.",
        "token": token,
        "user": user,
    })))
}
