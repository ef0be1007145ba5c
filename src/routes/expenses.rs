use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::Claims;
use crate::database::{self, WriteTx};
use crate::error::ApiError;
use crate::events::{Collection, Operation};
use crate::models::expense::{
    CreateExpenseRequest, Expense, ExpenseCategoryTotal, ExpenseDailyTotal, ExpenseDraft,
    UpdateExpenseRequest,
};
use crate::routes::parse_id;
use crate::state::AppState;

const NOT_FOUND_MESSAGE: &str = "Expense not found or you don't have permission.";

// Record a new expense
pub async fn create_expense(
    State(state): State<AppState>,
    claims: Claims,
    payload: Result<Json<CreateExpenseRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(payload) = payload.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    let expense_id = Uuid::new_v4();
    let user_id = claims.sub;

    let expense = database::execute_write(
        &state.db,
        &state.bus,
        Collection::Expenses,
        Operation::Insert,
        expense_id,
        || payload.validate(),
        |draft: ExpenseDraft, tx: &mut WriteTx| {
            Box::pin(async move {
                let expense = sqlx::query_as::<_, Expense>(
                    "INSERT INTO expenses (id, user_id, category, item, amount, recorded_date) \
                     VALUES ($1, $2, $3, $4, $5, $6) RETURNING *",
                )
                .bind(expense_id)
                .bind(user_id)
                .bind(&draft.category)
                .bind(&draft.item)
                .bind(draft.amount)
                .bind(draft.recorded_date)
                .fetch_one(&mut **tx)
                .await?;

                Ok(expense)
            })
        },
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Expense recorded.",
            "expense": expense,
            "isolationLevel": database::SNAPSHOT_ISOLATION,
        })),
    ))
}

// Get all expenses for the authenticated user
pub async fn list_expenses(
    State(state): State<AppState>,
    claims: Claims,
) -> Result<Json<Value>, ApiError> {
    let expenses = sqlx::query_as::<_, Expense>(
        "SELECT * FROM expenses WHERE user_id = $1 ORDER BY recorded_date DESC, created_at DESC",
    )
    .bind(claims.sub)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(json!({
        "expenses": expenses,
        "isolationLevel": database::READ_COMMITTED_ISOLATION,
    })))
}

// Get a single expense by id
pub async fn get_expense(
    State(state): State<AppState>,
    claims: Claims,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let expense_id = parse_id(&id)?;

    let expense =
        sqlx::query_as::<_, Expense>("SELECT * FROM expenses WHERE id = $1 AND user_id = $2")
            .bind(expense_id)
            .bind(claims.sub)
            .fetch_optional(&state.db)
            .await?
            .ok_or_else(|| ApiError::NotFound(NOT_FOUND_MESSAGE.to_string()))?;

    Ok(Json(json!({
        "expense": expense,
        "isolationLevel": database::READ_COMMITTED_ISOLATION,
    })))
}

// Replace an expense; the full field set is required again
pub async fn update_expense(
    State(state): State<AppState>,
    claims: Claims,
    Path(id): Path<String>,
    payload: Result<Json<UpdateExpenseRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let expense_id = parse_id(&id)?;
    let Json(payload) = payload.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    let user_id = claims.sub;

    let expense = database::execute_write(
        &state.db,
        &state.bus,
        Collection::Expenses,
        Operation::Update,
        expense_id,
        || payload.validate(),
        |draft: ExpenseDraft, tx: &mut WriteTx| {
            Box::pin(async move {
                // The lookup reads the same snapshot the update writes to.
                sqlx::query_as::<_, Expense>(
                    "SELECT * FROM expenses WHERE id = $1 AND user_id = $2",
                )
                .bind(expense_id)
                .bind(user_id)
                .fetch_optional(&mut **tx)
                .await?
                .ok_or_else(|| ApiError::NotFound(NOT_FOUND_MESSAGE.to_string()))?;

                let expense = sqlx::query_as::<_, Expense>(
                    "UPDATE expenses SET category = $1, item = $2, amount = $3, \
                     recorded_date = $4, updated_at = NOW() \
                     WHERE id = $5 AND user_id = $6 RETURNING *",
                )
                .bind(&draft.category)
                .bind(&draft.item)
                .bind(draft.amount)
                .bind(draft.recorded_date)
                .bind(expense_id)
                .bind(user_id)
                .fetch_one(&mut **tx)
                .await?;

                Ok(expense)
            })
        },
    )
    .await?;

    Ok(Json(json!({
        "message": "Expense updated.",
        "expense": expense,
        "isolationLevel": database::SNAPSHOT_ISOLATION,
    })))
}

// Delete an expense after re-verifying ownership
pub async fn delete_expense(
    State(state): State<AppState>,
    claims: Claims,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let expense_id = parse_id(&id)?;
    let user_id = claims.sub;

    database::execute_write(
        &state.db,
        &state.bus,
        Collection::Expenses,
        Operation::Delete,
        expense_id,
        || Ok(()),
        |_: (), tx: &mut WriteTx| {
            Box::pin(async move {
                sqlx::query_as::<_, Expense>(
                    "SELECT * FROM expenses WHERE id = $1 AND user_id = $2",
                )
                .bind(expense_id)
                .bind(user_id)
                .fetch_optional(&mut **tx)
                .await?
                .ok_or_else(|| ApiError::NotFound(NOT_FOUND_MESSAGE.to_string()))?;

                sqlx::query("DELETE FROM expenses WHERE id = $1 AND user_id = $2")
                    .bind(expense_id)
                    .bind(user_id)
                    .execute(&mut **tx)
                    .await?;

                Ok(())
            })
        },
    )
    .await?;

    Ok(Json(json!({
        "message": "Expense deleted.",
        "deletedId": expense_id,
        "isolationLevel": database::SNAPSHOT_ISOLATION,
    })))
}

// Aggregates: per-category totals plus the rolling 7-day window. Plain
// read-committed queries, never part of a write transaction.
pub async fn expense_stats(
    State(state): State<AppState>,
    claims: Claims,
) -> Result<Json<Value>, ApiError> {
    let category_totals = sqlx::query_as::<_, ExpenseCategoryTotal>(
        "SELECT category, SUM(amount) AS total, COUNT(*) AS count \
         FROM expenses WHERE user_id = $1 \
         GROUP BY category ORDER BY total DESC",
    )
    .bind(claims.sub)
    .fetch_all(&state.db)
    .await?;

    let last_seven_days = sqlx::query_as::<_, ExpenseDailyTotal>(
        "SELECT recorded_date AS date, SUM(amount) AS total \
         FROM expenses WHERE user_id = $1 AND recorded_date >= CURRENT_DATE - 6 \
         GROUP BY recorded_date ORDER BY recorded_date",
    )
    .bind(claims.sub)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(json!({
        "categoryTotals": category_totals,
        "last7Days": last_seven_days,
        "isolationLevel": database::READ_COMMITTED_ISOLATION,
    })))
}
