//! Periodic purge of resolved outbox rows.

use std::time::Duration;

use crate::store::OutboxStore;
use crate::Result;

/// Cleanup tuning knobs.
#[derive(Debug, Clone)]
pub struct CleanupConfig {
    /// Delay between cleanup runs.
    pub interval: Duration,
    /// Resolved rows younger than this are kept.
    pub retention: chrono::Duration,
    /// Rows deleted per batch; a short batch ends the run.
    pub batch_size: u32,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3 * 60 * 60),
            retention: chrono::Duration::days(30),
            batch_size: 2000,
        }
    }
}

/// Deletes Published and Failed rows past the retention window.
///
/// NEW rows are never touched regardless of age: an undelivered event is
/// still owed to the broker. One task owns the loop, so runs never
/// overlap.
pub struct OutboxCleanup<S: OutboxStore> {
    store: S,
    config: CleanupConfig,
}

impl<S: OutboxStore> OutboxCleanup<S> {
    /// Creates a new cleanup job over a store.
    pub fn new(store: S, config: CleanupConfig) -> Self {
        Self { store, config }
    }

    /// Runs one full purge, batching until a short batch signals the
    /// backlog is drained. Returns the total number of rows deleted.
    #[tracing::instrument(skip(self))]
    pub async fn purge_once(&self) -> Result<u64> {
        let cutoff = chrono::Utc::now() - self.config.retention;
        let mut total = 0u64;

        loop {
            let deleted = self
                .store
                .purge_resolved(cutoff, self.config.batch_size)
                .await?;
            total += deleted;
            if deleted < u64::from(self.config.batch_size) {
                break;
            }
        }

        if total > 0 {
            metrics::counter!("outbox_purged_total").increment(total);
            tracing::info!(deleted = total, "purged resolved outbox rows");
        }

        Ok(total)
    }

    /// Runs the cleanup loop until the task is dropped or aborted.
    pub async fn run(&self) {
        loop {
            if let Err(e) = self.purge_once().await {
                tracing::error!(error = %e, "outbox cleanup run failed");
            }
            tokio::time::sleep(self.config.interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::OutboxEvent;
    use crate::memory::InMemoryOutboxStore;
    use crate::OutboxStatus;
    use chrono::Utc;

    async fn resolved_row_aged_days(store: &InMemoryOutboxStore, days: i64) -> OutboxEvent {
        let row = OutboxEvent::new("User", "u", "user.created.v2", serde_json::json!({}));
        store.insert(row.clone()).await.unwrap();
        store.mark_published(row.id).await.unwrap();
        store
            .backdate(row.id, Utc::now() - chrono::Duration::days(days))
            .await;
        row
    }

    #[tokio::test]
    async fn purge_drains_in_batches_until_short_batch() {
        let store = InMemoryOutboxStore::new();
        for _ in 0..7 {
            resolved_row_aged_days(&store, 45).await;
        }

        let cleanup = OutboxCleanup::new(
            store.clone(),
            CleanupConfig {
                batch_size: 3,
                ..CleanupConfig::default()
            },
        );

        // 3 + 3 + 1: the short final batch ends the run.
        assert_eq!(cleanup.purge_once().await.unwrap(), 7);
        assert_eq!(store.row_count().await, 0);
    }

    #[tokio::test]
    async fn purge_keeps_rows_inside_retention() {
        let store = InMemoryOutboxStore::new();
        resolved_row_aged_days(&store, 45).await;
        let recent = resolved_row_aged_days(&store, 5).await;

        let cleanup = OutboxCleanup::new(store.clone(), CleanupConfig::default());
        assert_eq!(cleanup.purge_once().await.unwrap(), 1);
        assert!(store.get(recent.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn purge_never_touches_new_rows() {
        let store = InMemoryOutboxStore::new();
        let row = OutboxEvent::new("User", "u", "user.created.v2", serde_json::json!({}));
        store.insert(row.clone()).await.unwrap();
        store
            .backdate(row.id, Utc::now() - chrono::Duration::days(365))
            .await;

        let cleanup = OutboxCleanup::new(store.clone(), CleanupConfig::default());
        assert_eq!(cleanup.purge_once().await.unwrap(), 0);

        let stored = store.get(row.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OutboxStatus::New);
    }

    #[tokio::test]
    async fn purge_on_empty_store_is_a_noop() {
        let store = InMemoryOutboxStore::new();
        let cleanup = OutboxCleanup::new(store, CleanupConfig::default());
        assert_eq!(cleanup.purge_once().await.unwrap(), 0);
    }
}
