use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::event::{OutboxEvent, OutboxEventId, OutboxStatus};
use crate::store::OutboxStore;
use crate::{OutboxStoreError, Result};

/// PostgreSQL-backed outbox store.
#[derive(Clone)]
pub struct PostgresOutboxStore {
    pool: PgPool,
}

impl PostgresOutboxStore {
    /// Creates a new PostgreSQL outbox store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    /// Appends a row inside a caller-owned transaction.
    ///
    /// The identity store uses this so the outbox append commits or rolls
    /// back together with the domain write it describes.
    pub async fn append_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        event: &OutboxEvent,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO outbox_events (id, aggregate_type, aggregate_id, event_type, payload, status, attempts, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(event.id.as_uuid())
        .bind(&event.aggregate_type)
        .bind(&event.aggregate_id)
        .bind(&event.event_type)
        .bind(&event.payload)
        .bind(event.status.as_str())
        .bind(event.attempts)
        .bind(event.created_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    fn row_to_event(row: PgRow) -> Result<OutboxEvent> {
        let status_str: String = row.try_get("status")?;
        let status = OutboxStatus::parse(&status_str).ok_or_else(|| {
            OutboxStoreError::Serialization(serde_json::Error::io(std::io::Error::other(format!(
                "unknown outbox status: {status_str}"
            ))))
        })?;

        Ok(OutboxEvent {
            id: OutboxEventId::from_uuid(row.try_get::<Uuid, _>("id")?),
            aggregate_type: row.try_get("aggregate_type")?,
            aggregate_id: row.try_get("aggregate_id")?,
            event_type: row.try_get("event_type")?,
            payload: row.try_get("payload")?,
            status,
            attempts: row.try_get("attempts")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl OutboxStore for PostgresOutboxStore {
    async fn insert(&self, event: OutboxEvent) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::append_in_tx(&mut tx, &event).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn fetch_unpublished(&self, limit: u32) -> Result<Vec<OutboxEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT id, aggregate_type, aggregate_id, event_type, payload, status, attempts, created_at
            FROM outbox_events
            WHERE status = 'NEW'
            ORDER BY created_at ASC
            LIMIT $1
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_event).collect()
    }

    async fn mark_published(&self, id: OutboxEventId) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_events
            SET status = 'PUBLISHED', attempts = attempts + 1
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(OutboxStoreError::RowNotFound(id));
        }
        Ok(())
    }

    async fn record_failed_attempt(
        &self,
        id: OutboxEventId,
        max_attempts: i32,
    ) -> Result<OutboxStatus> {
        let row = sqlx::query(
            r#"
            UPDATE outbox_events
            SET attempts = attempts + 1,
                status = CASE WHEN attempts + 1 > $2 THEN 'FAILED' ELSE status END
            WHERE id = $1
            RETURNING status
            "#,
        )
        .bind(id.as_uuid())
        .bind(max_attempts)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(OutboxStoreError::RowNotFound(id))?;

        let status_str: String = row.try_get("status")?;
        OutboxStatus::parse(&status_str).ok_or_else(|| {
            OutboxStoreError::Serialization(serde_json::Error::io(std::io::Error::other(format!(
                "unknown outbox status: {status_str}"
            ))))
        })
    }

    async fn purge_resolved(&self, cutoff: DateTime<Utc>, limit: u32) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM outbox_events
            WHERE id IN (
                SELECT id FROM outbox_events
                WHERE status IN ('PUBLISHED', 'FAILED') AND created_at < $1
                ORDER BY created_at ASC
                LIMIT $2
            )
            "#,
        )
        .bind(cutoff)
        .bind(i64::from(limit))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn get(&self, id: OutboxEventId) -> Result<Option<OutboxEvent>> {
        let row = sqlx::query(
            r#"
            SELECT id, aggregate_type, aggregate_id, event_type, payload, status, attempts, created_at
            FROM outbox_events
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_event).transpose()
    }

    async fn count_by_status(&self, status: OutboxStatus) -> Result<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM outbox_events WHERE status = $1")
                .bind(status.as_str())
                .fetch_one(&self.pool)
                .await?;
        Ok(count as u64)
    }
}
