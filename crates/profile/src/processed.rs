use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::SagaId;
use thiserror::Error;

/// A row in the dedup ledger.
///
/// Presence means "the side effect for this saga on this topic has already
/// run" (success or terminal failure alike), not merely that a message
/// was seen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedEvent {
    pub saga_id: SagaId,
    pub topic: String,
    pub processed_at: DateTime<Utc>,
}

/// Errors that can occur when interacting with the dedup ledger.
#[derive(Debug, Error)]
pub enum ProcessedStoreError {
    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Core trait for dedup ledger implementations.
///
/// The ledger is colocated with the profile database. Its uniqueness
/// constraint is what serializes concurrent deliveries of the same saga
/// id: whichever consumer records first wins, and the loser sees `false`
/// and treats the work as already handled.
#[async_trait]
pub trait ProcessedEventStore: Send + Sync {
    /// Records that the side effect for `(saga_id, topic)` has run.
    ///
    /// Returns true if this call created the entry, false if it already
    /// existed — losing the race is not an error.
    async fn record(&self, saga_id: SagaId, topic: &str) -> Result<bool, ProcessedStoreError>;

    /// Returns true if `(saga_id, topic)` is already recorded.
    async fn contains(&self, saga_id: SagaId, topic: &str) -> Result<bool, ProcessedStoreError>;

    /// Time-based cleanup: deletes entries recorded before `cutoff`,
    /// returning how many were removed. Entries are otherwise never
    /// deleted.
    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, ProcessedStoreError>;
}
