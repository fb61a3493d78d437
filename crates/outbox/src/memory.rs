use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::event::{OutboxEvent, OutboxEventId, OutboxStatus};
use crate::store::OutboxStore;
use crate::{OutboxStoreError, Result};

/// In-memory outbox store.
///
/// Backs the default wiring and the tests; provides the same interface as
/// the PostgreSQL implementation. Cloning shares the underlying rows, so
/// the identity store and the publisher can hold the same instance.
#[derive(Clone, Default)]
pub struct InMemoryOutboxStore {
    rows: Arc<RwLock<Vec<OutboxEvent>>>,
}

impl InMemoryOutboxStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of rows, any status.
    pub async fn row_count(&self) -> usize {
        self.rows.read().await.len()
    }

    /// Removes all rows.
    pub async fn clear(&self) {
        self.rows.write().await.clear();
    }

    /// Rewrites a row's `created_at`, for retention tests.
    pub async fn backdate(&self, id: OutboxEventId, created_at: DateTime<Utc>) {
        let mut rows = self.rows.write().await;
        if let Some(row) = rows.iter_mut().find(|r| r.id == id) {
            row.created_at = created_at;
        }
    }
}

#[async_trait]
impl OutboxStore for InMemoryOutboxStore {
    async fn insert(&self, event: OutboxEvent) -> Result<()> {
        self.rows.write().await.push(event);
        Ok(())
    }

    async fn fetch_unpublished(&self, limit: u32) -> Result<Vec<OutboxEvent>> {
        let rows = self.rows.read().await;
        let mut unpublished: Vec<_> = rows
            .iter()
            .filter(|r| r.status == OutboxStatus::New)
            .cloned()
            .collect();
        unpublished.sort_by_key(|r| r.created_at);
        unpublished.truncate(limit as usize);
        Ok(unpublished)
    }

    async fn mark_published(&self, id: OutboxEventId) -> Result<()> {
        let mut rows = self.rows.write().await;
        let row = rows
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(OutboxStoreError::RowNotFound(id))?;
        row.status = OutboxStatus::Published;
        row.attempts += 1;
        Ok(())
    }

    async fn record_failed_attempt(
        &self,
        id: OutboxEventId,
        max_attempts: i32,
    ) -> Result<OutboxStatus> {
        let mut rows = self.rows.write().await;
        let row = rows
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(OutboxStoreError::RowNotFound(id))?;
        row.attempts += 1;
        if row.attempts > max_attempts {
            row.status = OutboxStatus::Failed;
        }
        Ok(row.status)
    }

    async fn purge_resolved(&self, cutoff: DateTime<Utc>, limit: u32) -> Result<u64> {
        let mut rows = self.rows.write().await;
        let mut deleted = 0u64;
        rows.retain(|r| {
            if deleted < u64::from(limit) && r.status.is_resolved() && r.created_at < cutoff {
                deleted += 1;
                false
            } else {
                true
            }
        });
        Ok(deleted)
    }

    async fn get(&self, id: OutboxEventId) -> Result<Option<OutboxEvent>> {
        Ok(self.rows.read().await.iter().find(|r| r.id == id).cloned())
    }

    async fn count_by_status(&self, status: OutboxStatus) -> Result<u64> {
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .filter(|r| r.status == status)
            .count() as u64)
    }
}
