//! Connection pool, migrations, and the transactional write coordinator.
//!
//! Every mutation of an expense, income, or transaction record goes through
//! [`execute_write`]: one transaction at REPEATABLE READ (PostgreSQL's
//! snapshot isolation), validation before any write statement, an explicit
//! commit or rollback, and exactly one [`ChangeEvent`] on the bus once the
//! outcome is known. Plain reads stay on the pool at the default READ
//! COMMITTED level.

use std::time::Instant;

use futures::future::BoxFuture;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::ApiError;
use crate::events::{ChangeEvent, Collection, EventBus, Operation};

pub type Database = PgPool;
pub type WriteTx = Transaction<'static, Postgres>;

/// Isolation labels reported in response bodies, so callers can assert the
/// guarantee that was actually in force.
pub const SNAPSHOT_ISOLATION: &str = "REPEATABLE READ (snapshot)";
pub const READ_COMMITTED_ISOLATION: &str = "READ COMMITTED (majority)";

pub async fn create_database_connection(database_url: &str) -> Result<Database, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &Database) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// Run one logical mutation as a snapshot-isolated transaction and publish
/// the outcome on the bus.
///
/// `validate` runs first, inside the open transaction; a failure aborts
/// before any write statement is issued and surfaces as a 4xx. `write`
/// receives the validated payload and the transaction, so its lookups read
/// the same snapshot its statements write to. Any error on the way
/// (validation, lookup, write, or commit itself) rolls the transaction back;
/// the sqlx transaction guard additionally rolls back on drop, so no code
/// path leaks an open session. Aborted transactions are never retried here;
/// the caller has to resubmit.
pub async fn execute_write<P, T, V, W>(
    db: &Database,
    bus: &EventBus,
    collection: Collection,
    operation: Operation,
    document_id: Uuid,
    validate: V,
    write: W,
) -> Result<T, ApiError>
where
    V: FnOnce() -> Result<P, ApiError>,
    W: for<'t> FnOnce(P, &'t mut WriteTx) -> BoxFuture<'t, Result<T, ApiError>>,
{
    let started = Instant::now();
    let result = run_transactional(db, validate, write).await;
    let execution_time_ms = started.elapsed().as_millis() as u64;

    match &result {
        Ok(_) => bus.emit(ChangeEvent::committed(
            collection,
            operation,
            document_id,
            execution_time_ms,
        )),
        Err(err) => bus.emit(ChangeEvent::aborted(
            collection,
            operation,
            document_id,
            execution_time_ms,
            err.to_string(),
        )),
    }

    result
}

async fn run_transactional<P, T, V, W>(db: &Database, validate: V, write: W) -> Result<T, ApiError>
where
    V: FnOnce() -> Result<P, ApiError>,
    W: for<'t> FnOnce(P, &'t mut WriteTx) -> BoxFuture<'t, Result<T, ApiError>>,
{
    let mut tx = db.begin().await?;
    // Must be the first statement of the transaction.
    sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
        .execute(&mut *tx)
        .await?;

    let payload = match validate() {
        Ok(payload) => payload,
        Err(err) => {
            abort(tx).await;
            return Err(err);
        }
    };

    match write(payload, &mut tx).await {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            abort(tx).await;
            Err(err)
        }
    }
}

/// Roll back without masking the error that caused the abort.
async fn abort(tx: WriteTx) {
    if let Err(err) = tx.rollback().await {
        tracing::error!("failed to abort transaction: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn isolation_labels_are_literal() {
        assert_eq!(SNAPSHOT_ISOLATION, "REPEATABLE READ (snapshot)");
        assert_eq!(READ_COMMITTED_ISOLATION, "READ COMMITTED (majority)");
    }
}
