use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::Claims;
use crate::database::{self, WriteTx};
use crate::error::ApiError;
use crate::events::{Collection, Operation};
use crate::models::transaction::{
    CreateTransactionRequest, Transaction, TransactionDraft, UpdateTransactionRequest,
};
use crate::routes::parse_id;
use crate::state::AppState;

const NOT_FOUND_MESSAGE: &str = "Transaction not found or you don't have permission.";

const DEFAULT_PAGE_SIZE: i64 = 10;
const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct TransactionQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    /// Exact status match.
    pub status: Option<String>,
    /// Substring match on the client-supplied external id.
    pub id: Option<String>,
    /// Exact date match, YYYY-MM-DD.
    pub date: Option<String>,
}

// List transactions with server-side filtering applied before pagination
pub async fn list_transactions(
    State(state): State<AppState>,
    claims: Claims,
    query: Result<Query<TransactionQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(query) = query.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = (page - 1) * limit;

    // An empty string is an unset filter, not a match against "".
    let status = query.status.as_deref().filter(|value| !value.is_empty());
    let id_fragment = query.id.as_deref().filter(|value| !value.is_empty());
    let date = match query.date.as_deref().filter(|value| !value.is_empty()) {
        Some(raw) => Some(NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
            ApiError::BadRequest("Date filter must use the YYYY-MM-DD format.".to_string())
        })?),
        None => None,
    };

    let mut filter_sql = String::from(" FROM transactions WHERE user_id = $1");
    let mut param_count = 2;

    if status.is_some() {
        filter_sql.push_str(&format!(" AND status = ${param_count}"));
        param_count += 1;
    }
    if id_fragment.is_some() {
        filter_sql.push_str(&format!(" AND external_id ILIKE '%' || ${param_count} || '%'"));
        param_count += 1;
    }
    if date.is_some() {
        filter_sql.push_str(&format!(" AND date = ${param_count}"));
        param_count += 1;
    }

    let count_sql = format!("SELECT COUNT(*){filter_sql}");
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql).bind(claims.sub);
    if let Some(status) = status {
        count_query = count_query.bind(status);
    }
    if let Some(id_fragment) = id_fragment {
        count_query = count_query.bind(id_fragment);
    }
    if let Some(date) = date {
        count_query = count_query.bind(date);
    }
    let total_count = count_query.fetch_one(&state.db).await?;

    let list_sql = format!(
        "SELECT *{filter_sql} ORDER BY date DESC, created_at DESC LIMIT ${param_count} OFFSET ${}",
        param_count + 1
    );
    let mut list_query = sqlx::query_as::<_, Transaction>(&list_sql).bind(claims.sub);
    if let Some(status) = status {
        list_query = list_query.bind(status);
    }
    if let Some(id_fragment) = id_fragment {
        list_query = list_query.bind(id_fragment);
    }
    if let Some(date) = date {
        list_query = list_query.bind(date);
    }
    let transactions = list_query
        .bind(limit)
        .bind(offset)
        .fetch_all(&state.db)
        .await?;

    Ok(Json(json!({
        "transactions": transactions,
        "totalPages": total_pages(total_count, limit),
        "currentPage": page,
        "totalCount": total_count,
        "isolationLevel": database::READ_COMMITTED_ISOLATION,
    })))
}

fn total_pages(total_count: i64, limit: i64) -> i64 {
    (total_count + limit - 1) / limit
}

// Record a new transaction
pub async fn create_transaction(
    State(state): State<AppState>,
    claims: Claims,
    payload: Result<Json<CreateTransactionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(payload) = payload.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    let transaction_id = Uuid::new_v4();
    let user_id = claims.sub;

    let transaction = database::execute_write(
        &state.db,
        &state.bus,
        Collection::Transactions,
        Operation::Insert,
        transaction_id,
        || payload.validate(),
        |draft: TransactionDraft, tx: &mut WriteTx| {
            Box::pin(async move {
                let transaction = sqlx::query_as::<_, Transaction>(
                    "INSERT INTO transactions \
                     (id, user_id, external_id, date, time, type, amount, status, discount, \
                      fee_charge, depository_institution, description) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) RETURNING *",
                )
                .bind(transaction_id)
                .bind(user_id)
                .bind(&draft.external_id)
                .bind(draft.date)
                .bind(&draft.time)
                .bind(&draft.transaction_type)
                .bind(draft.amount)
                .bind(&draft.status)
                .bind(draft.discount)
                .bind(draft.fee_charge)
                .bind(&draft.depository_institution)
                .bind(&draft.description)
                .fetch_one(&mut **tx)
                .await?;

                Ok(transaction)
            })
        },
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Transaction recorded.",
            "transaction": transaction,
            "isolationLevel": database::SNAPSHOT_ISOLATION,
        })),
    ))
}

// Get a single transaction by id
pub async fn get_transaction(
    State(state): State<AppState>,
    claims: Claims,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let transaction_id = parse_id(&id)?;

    let transaction = sqlx::query_as::<_, Transaction>(
        "SELECT * FROM transactions WHERE id = $1 AND user_id = $2",
    )
    .bind(transaction_id)
    .bind(claims.sub)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::NotFound(NOT_FOUND_MESSAGE.to_string()))?;

    Ok(Json(json!({
        "transaction": transaction,
        "isolationLevel": database::READ_COMMITTED_ISOLATION,
    })))
}

// Replace a transaction; the full field set is required again
pub async fn update_transaction(
    State(state): State<AppState>,
    claims: Claims,
    Path(id): Path<String>,
    payload: Result<Json<UpdateTransactionRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let transaction_id = parse_id(&id)?;
    let Json(payload) = payload.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    let user_id = claims.sub;

    let transaction = database::execute_write(
        &state.db,
        &state.bus,
        Collection::Transactions,
        Operation::Update,
        transaction_id,
        || payload.validate(),
        |draft: TransactionDraft, tx: &mut WriteTx| {
            Box::pin(async move {
                // The lookup reads the same snapshot the update writes to.
                sqlx::query_as::<_, Transaction>(
                    "SELECT * FROM transactions WHERE id = $1 AND user_id = $2",
                )
                .bind(transaction_id)
                .bind(user_id)
                .fetch_optional(&mut **tx)
                .await?
                .ok_or_else(|| ApiError::NotFound(NOT_FOUND_MESSAGE.to_string()))?;

                let transaction = sqlx::query_as::<_, Transaction>(
                    "UPDATE transactions SET external_id = $1, date = $2, time = $3, type = $4, \
                     amount = $5, status = $6, discount = $7, fee_charge = $8, \
                     depository_institution = $9, description = $10, updated_at = NOW() \
                     WHERE id = $11 AND user_id = $12 RETURNING *",
                )
                .bind(&draft.external_id)
                .bind(draft.date)
                .bind(&draft.time)
                .bind(&draft.transaction_type)
                .bind(draft.amount)
                .bind(&draft.status)
                .bind(draft.discount)
                .bind(draft.fee_charge)
                .bind(&draft.depository_institution)
                .bind(&draft.description)
                .bind(transaction_id)
                .bind(user_id)
                .fetch_one(&mut **tx)
                .await?;

                Ok(transaction)
            })
        },
    )
    .await?;

    Ok(Json(json!({
        "message": "Transaction updated.",
        "transaction": transaction,
        "isolationLevel": database::SNAPSHOT_ISOLATION,
    })))
}

// Delete a transaction after re-verifying ownership
pub async fn delete_transaction(
    State(state): State<AppState>,
    claims: Claims,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let transaction_id = parse_id(&id)?;
    let user_id = claims.sub;

    database::execute_write(
        &state.db,
        &state.bus,
        Collection::Transactions,
        Operation::Delete,
        transaction_id,
        || Ok(()),
        |_: (), tx: &mut WriteTx| {
            Box::pin(async move {
                sqlx::query_as::<_, Transaction>(
                    "SELECT * FROM transactions WHERE id = $1 AND user_id = $2",
                )
                .bind(transaction_id)
                .bind(user_id)
                .fetch_optional(&mut **tx)
                .await?
                .ok_or_else(|| ApiError::NotFound(NOT_FOUND_MESSAGE.to_string()))?;

                sqlx::query("DELETE FROM transactions WHERE id = $1 AND user_id = $2")
                    .bind(transaction_id)
                    .bind(user_id)
                    .execute(&mut **tx)
                    .await?;

                Ok(())
            })
        },
    )
    .await?;

    Ok(Json(json!({
        "message": "Transaction deleted.",
        "deletedId": transaction_id,
        "isolationLevel": database::SNAPSHOT_ISOLATION,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_pages_rounds_up() {
        assert_eq!(total_pages(0, 10), 0);
        assert_eq!(total_pages(1, 10), 1);
        assert_eq!(total_pages(10, 10), 1);
        assert_eq!(total_pages(11, 10), 2);
        assert_eq!(total_pages(95, 10), 10);
    }
}
