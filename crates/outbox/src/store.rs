use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::event::{OutboxEvent, OutboxEventId, OutboxStatus};
use crate::Result;

/// Core trait for outbox store implementations.
///
/// The store is colocated with the identity database. Appending a row in
/// the same transaction as the domain write it describes is the identity
/// store's job; this trait covers what the publisher and cleanup job need.
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Inserts a row outside any domain transaction.
    ///
    /// Only tests and tooling append this way; saga-initiating writes go
    /// through the identity store so the append shares the domain
    /// transaction.
    async fn insert(&self, event: OutboxEvent) -> Result<()>;

    /// Fetches up to `limit` NEW rows, oldest first.
    ///
    /// Published and Failed rows are never returned. Concurrent pollers
    /// may fetch the same rows; duplicate sends are tolerated because
    /// consumption is idempotent.
    async fn fetch_unpublished(&self, limit: u32) -> Result<Vec<OutboxEvent>>;

    /// Records a broker ack: sets the row Published and counts the
    /// attempt.
    async fn mark_published(&self, id: OutboxEventId) -> Result<()>;

    /// Records a failed publish attempt and returns the resulting status.
    ///
    /// The attempt counter is incremented first; when it then exceeds
    /// `max_attempts` the row is sealed Failed, otherwise it stays New and
    /// will be retried. A row that fails `max_attempts` times but succeeds
    /// on the next try is therefore still Published.
    async fn record_failed_attempt(
        &self,
        id: OutboxEventId,
        max_attempts: i32,
    ) -> Result<OutboxStatus>;

    /// Deletes up to `limit` resolved (Published or Failed) rows created
    /// before `cutoff`, returning how many were deleted. NEW rows are
    /// never touched regardless of age.
    async fn purge_resolved(&self, cutoff: DateTime<Utc>, limit: u32) -> Result<u64>;

    /// Loads a row by ID.
    async fn get(&self, id: OutboxEventId) -> Result<Option<OutboxEvent>>;

    /// Counts rows in a given status.
    async fn count_by_status(&self, status: OutboxStatus) -> Result<u64>;
}
