//! Change events and the in-process bus that fans them out to push clients.
//!
//! The transactional write path publishes exactly one event per completed
//! mutation attempt (committed or aborted). Delivery is best-effort and
//! at-most-once: a client that connects after an event was published never
//! sees it, and a client whose connection lags simply misses frames.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

/// The mutation kind, serialized under the wire key `type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Insert => "insert",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

/// The collection the mutation touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Expenses,
    Incomes,
    Transactions,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Expenses => "expenses",
            Collection::Incomes => "incomes",
            Collection::Transactions => "transactions",
        }
    }

    fn singular(&self) -> &'static str {
        match self {
            Collection::Expenses => "expense",
            Collection::Incomes => "income",
            Collection::Transactions => "transaction",
        }
    }
}

/// Final state of the transaction behind a mutation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionState {
    Committed,
    Aborted,
}

/// One completed mutation attempt, as broadcast to every connected client.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    #[serde(rename = "type")]
    pub operation: Operation,
    pub collection: Collection,
    pub document_id: Uuid,
    pub message: String,
    #[serde(rename = "executionTime")]
    pub execution_time_ms: u64,
    pub transaction_state: TransactionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn committed(
        collection: Collection,
        operation: Operation,
        document_id: Uuid,
        execution_time_ms: u64,
    ) -> Self {
        Self {
            operation,
            collection,
            document_id,
            message: format!(
                "{} {} committed in {}ms",
                collection.singular(),
                operation.as_str(),
                execution_time_ms
            ),
            execution_time_ms,
            transaction_state: TransactionState::Committed,
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn aborted(
        collection: Collection,
        operation: Operation,
        document_id: Uuid,
        execution_time_ms: u64,
        error: String,
    ) -> Self {
        Self {
            operation,
            collection,
            document_id,
            message: format!(
                "{} {} aborted after {}ms: {}",
                collection.singular(),
                operation.as_str(),
                execution_time_ms,
                error
            ),
            execution_time_ms,
            transaction_state: TransactionState::Aborted,
            error: Some(error),
            timestamp: Utc::now(),
        }
    }
}

/// Broadcast-based bus connecting the write coordinator to push clients.
///
/// Constructed once at startup and handed around through application state.
/// Each subscriber gets an independent stream; a subscriber that falls more
/// than the buffer capacity behind receives a `Lagged` error and misses the
/// overwritten events.
pub struct EventBus {
    tx: broadcast::Sender<ChangeEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event to all current subscribers. With no subscribers the
    /// event is dropped silently.
    pub fn emit(&self, event: ChangeEvent) {
        tracing::debug!(
            collection = event.collection.as_str(),
            operation = event.operation.as_str(),
            subscribers = self.tx.receiver_count(),
            "change event"
        );
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insert_event() -> ChangeEvent {
        ChangeEvent::committed(Collection::Expenses, Operation::Insert, Uuid::nil(), 12)
    }

    #[tokio::test]
    async fn emit_reaches_subscriber() {
        let bus = EventBus::new(32);
        let mut rx = bus.subscribe();

        bus.emit(insert_event());

        let event = rx.recv().await.unwrap();
        assert_eq!(event.operation, Operation::Insert);
        assert_eq!(event.collection, Collection::Expenses);
        assert_eq!(event.transaction_state, TransactionState::Committed);
    }

    #[tokio::test]
    async fn every_connected_subscriber_receives_the_event() {
        let bus = EventBus::new(32);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.emit(insert_event());

        assert_eq!(rx1.recv().await.unwrap().collection, Collection::Expenses);
        assert_eq!(rx2.recv().await.unwrap().collection, Collection::Expenses);
    }

    #[tokio::test]
    async fn late_subscriber_never_sees_earlier_events() {
        let bus = EventBus::new(32);

        bus.emit(insert_event());

        let mut rx = bus.subscribe();
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn emit_without_subscribers_does_not_panic() {
        let bus = EventBus::new(32);
        bus.emit(insert_event());
    }

    #[tokio::test]
    async fn subscriber_count_tracks_connections() {
        let bus = EventBus::new(32);
        assert_eq!(bus.subscriber_count(), 0);

        let rx1 = bus.subscribe();
        let _rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        drop(rx1);
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn committed_event_wire_format() {
        let json = serde_json::to_value(insert_event()).unwrap();

        assert_eq!(json["type"], "insert");
        assert_eq!(json["collection"], "expenses");
        assert_eq!(json["executionTime"], 12);
        assert_eq!(json["transactionState"], "committed");
        assert!(json["timestamp"].is_string());
        assert!(json.get("error").is_none());
    }

    #[test]
    fn aborted_event_carries_the_error() {
        let event = ChangeEvent::aborted(
            Collection::Incomes,
            Operation::Update,
            Uuid::nil(),
            3,
            "validation failed".to_string(),
        );
        let json = serde_json::to_value(event).unwrap();

        assert_eq!(json["type"], "update");
        assert_eq!(json["collection"], "incomes");
        assert_eq!(json["transactionState"], "aborted");
        assert_eq!(json["error"], "validation failed");
    }
}
