use std::collections::BTreeMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;

use crate::auth::AuthError;

/// Field name -> problem description, reported under `errors` in 400 bodies.
pub type FieldErrors = BTreeMap<&'static str, String>;

/// The errors a request handler can produce. Every variant renders as a
/// structured JSON body; a raw error never escapes as a plain-text response.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// A required field is missing, malformed, or outside its allowed set.
    #[error("validation failed")]
    Validation(FieldErrors),

    /// The request itself is malformed (bad id, unparseable body).
    #[error("{0}")]
    BadRequest(String),

    /// The record does not exist, or belongs to another user. The two cases
    /// are deliberately indistinguishable to the caller.
    #[error("{0}")]
    NotFound(String),

    /// A second record would violate a uniqueness rule (e.g. signup email).
    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Any failure in the session/transaction lifecycle, including commit.
    #[error("an unexpected database error occurred: {0}")]
    Database(#[from] sqlx::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Validation(errors) => (
                StatusCode::BAD_REQUEST,
                json!({
                    "message": "Validation failed.",
                    "errors": errors,
                }),
            ),
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, json!({ "message": message }))
            }
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, json!({ "message": message })),
            ApiError::Conflict(message) => (StatusCode::CONFLICT, json!({ "message": message })),
            ApiError::Auth(err) => return err.into_response(),
            ApiError::Database(err) => {
                tracing::error!("database error: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({
                        "message": "An unexpected error occurred on the server.",
                        "error": err.to_string(),
                    }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn validation_error_renders_field_map() {
        let mut errors = FieldErrors::new();
        errors.insert("amount", "Amount must be greater than zero.".to_string());

        let response = ApiError::Validation(errors).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["message"], "Validation failed.");
        assert_eq!(body["errors"]["amount"], "Amount must be greater than zero.");
    }

    #[tokio::test]
    async fn not_found_renders_message_only() {
        let response =
            ApiError::NotFound("Expense not found or you don't have permission.".to_string())
                .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = body_json(response).await;
        assert_eq!(
            body["message"],
            "Expense not found or you don't have permission."
        );
        assert!(body.get("errors").is_none());
    }

    #[tokio::test]
    async fn database_error_includes_diagnostic_detail() {
        let response = ApiError::Database(sqlx::Error::PoolTimedOut).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        assert_eq!(body["message"], "An unexpected error occurred on the server.");
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn conflict_maps_to_409() {
        let response =
            ApiError::Conflict("An account with this email already exists.".to_string())
                .into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
