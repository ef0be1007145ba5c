use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::Json,
};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::Claims;
use crate::database::{self, WriteTx};
use crate::error::ApiError;
use crate::events::{Collection, Operation};
use crate::models::income::{
    CreateIncomeRequest, Income, IncomeCategoryTotal, IncomeDraft, UpdateIncomeRequest,
};
use crate::routes::parse_id;
use crate::state::AppState;

const NOT_FOUND_MESSAGE: &str = "Income not found or you don't have permission.";

// Record a new income
pub async fn create_income(
    State(state): State<AppState>,
    claims: Claims,
    payload: Result<Json<CreateIncomeRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(payload) = payload.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    let income_id = Uuid::new_v4();
    let user_id = claims.sub;

    let income = database::execute_write(
        &state.db,
        &state.bus,
        Collection::Incomes,
        Operation::Insert,
        income_id,
        || payload.validate(),
        |draft: IncomeDraft, tx: &mut WriteTx| {
            Box::pin(async move {
                let income = sqlx::query_as::<_, Income>(
                    "INSERT INTO incomes \
                     (id, user_id, external_id, category, amount, description, date, time) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING *",
                )
                .bind(income_id)
                .bind(user_id)
                .bind(&draft.external_id)
                .bind(&draft.category)
                .bind(draft.amount)
                .bind(&draft.description)
                .bind(draft.date)
                .bind(&draft.time)
                .fetch_one(&mut **tx)
                .await?;

                Ok(income)
            })
        },
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Income recorded.",
            "income": income,
            "isolationLevel": database::SNAPSHOT_ISOLATION,
        })),
    ))
}

// Get all incomes for the authenticated user
pub async fn list_incomes(
    State(state): State<AppState>,
    claims: Claims,
) -> Result<Json<Value>, ApiError> {
    let incomes = sqlx::query_as::<_, Income>(
        "SELECT * FROM incomes WHERE user_id = $1 ORDER BY date DESC, created_at DESC",
    )
    .bind(claims.sub)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(json!({
        "incomes": incomes,
        "isolationLevel": database::READ_COMMITTED_ISOLATION,
    })))
}

// Get a single income by id
pub async fn get_income(
    State(state): State<AppState>,
    claims: Claims,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let income_id = parse_id(&id)?;

    let income =
        sqlx::query_as::<_, Income>("SELECT * FROM incomes WHERE id = $1 AND user_id = $2")
            .bind(income_id)
            .bind(claims.sub)
            .fetch_optional(&state.db)
            .await?
            .ok_or_else(|| ApiError::NotFound(NOT_FOUND_MESSAGE.to_string()))?;

    Ok(Json(json!({
        "income": income,
        "isolationLevel": database::READ_COMMITTED_ISOLATION,
    })))
}

// Replace an income; the full field set is required again
pub async fn update_income(
    State(state): State<AppState>,
    claims: Claims,
    Path(id): Path<String>,
    payload: Result<Json<UpdateIncomeRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let income_id = parse_id(&id)?;
    let Json(payload) = payload.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    let user_id = claims.sub;

    let income = database::execute_write(
        &state.db,
        &state.bus,
        Collection::Incomes,
        Operation::Update,
        income_id,
        || payload.validate(),
        |draft: IncomeDraft, tx: &mut WriteTx| {
            Box::pin(async move {
                // The lookup reads the same snapshot the update writes to.
                sqlx::query_as::<_, Income>("SELECT * FROM incomes WHERE id = $1 AND user_id = $2")
                    .bind(income_id)
                    .bind(user_id)
                    .fetch_optional(&mut **tx)
                    .await?
                    .ok_or_else(|| ApiError::NotFound(NOT_FOUND_MESSAGE.to_string()))?;

                let income = sqlx::query_as::<_, Income>(
                    "UPDATE incomes SET external_id = $1, category = $2, amount = $3, \
                     description = $4, date = $5, time = $6, updated_at = NOW() \
                     WHERE id = $7 AND user_id = $8 RETURNING *",
                )
                .bind(&draft.external_id)
                .bind(&draft.category)
                .bind(draft.amount)
                .bind(&draft.description)
                .bind(draft.date)
                .bind(&draft.time)
                .bind(income_id)
                .bind(user_id)
                .fetch_one(&mut **tx)
                .await?;

                Ok(income)
            })
        },
    )
    .await?;

    Ok(Json(json!({
        "message": "Income updated.",
        "income": income,
        "isolationLevel": database::SNAPSHOT_ISOLATION,
    })))
}

// Delete an income after re-verifying ownership
pub async fn delete_income(
    State(state): State<AppState>,
    claims: Claims,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let income_id = parse_id(&id)?;
    let user_id = claims.sub;

    database::execute_write(
        &state.db,
        &state.bus,
        Collection::Incomes,
        Operation::Delete,
        income_id,
        || Ok(()),
        |_: (), tx: &mut WriteTx| {
            Box::pin(async move {
                sqlx::query_as::<_, Income>("SELECT * FROM incomes WHERE id = $1 AND user_id = $2")
                    .bind(income_id)
                    .bind(user_id)
                    .fetch_optional(&mut **tx)
                    .await?
                    .ok_or_else(|| ApiError::NotFound(NOT_FOUND_MESSAGE.to_string()))?;

                sqlx::query("DELETE FROM incomes WHERE id = $1 AND user_id = $2")
                    .bind(income_id)
                    .bind(user_id)
                    .execute(&mut **tx)
                    .await?;

                Ok(())
            })
        },
    )
    .await?;

    Ok(Json(json!({
        "message": "Income deleted.",
        "deletedId": income_id,
        "isolationLevel": database::SNAPSHOT_ISOLATION,
    })))
}

// Aggregates: overall total plus per-category totals. Plain read-committed
// queries, never part of a write transaction.
pub async fn income_stats(
    State(state): State<AppState>,
    claims: Claims,
) -> Result<Json<Value>, ApiError> {
    let total = sqlx::query_scalar::<_, Decimal>(
        "SELECT COALESCE(SUM(amount), 0) FROM incomes WHERE user_id = $1",
    )
    .bind(claims.sub)
    .fetch_one(&state.db)
    .await?;

    let category_totals = sqlx::query_as::<_, IncomeCategoryTotal>(
        "SELECT category, SUM(amount) AS total, COUNT(*) AS count \
         FROM incomes WHERE user_id = $1 \
         GROUP BY category ORDER BY total DESC",
    )
    .bind(claims.sub)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(json!({
        "total": total,
        "categoryTotals": category_totals,
        "isolationLevel": database::READ_COMMITTED_ISOLATION,
    })))
}
