use async_trait::async_trait;
use common::UserId;
use domain::Role;
use outbox::{OutboxEvent, PostgresOutboxStore};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::error::{IdentityError, Result};
use crate::store::IdentityStore;
use crate::user::{IdentityUser, UserStatus};

/// PostgreSQL-backed identity store.
///
/// The outbox table lives in the same database, so the saga-initiating
/// operations append the outbox row inside the same transaction as the
/// user write.
#[derive(Clone)]
pub struct PostgresIdentityStore {
    pool: PgPool,
}

impl PostgresIdentityStore {
    /// Creates a new PostgreSQL identity store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_user(row: PgRow) -> Result<IdentityUser> {
        let role_str: String = row.try_get("role")?;
        let role = match role_str.as_str() {
            "MANAGER" => Role::Manager,
            "STAFF" => Role::Staff,
            "CUSTOMER" => Role::Customer,
            other => {
                return Err(IdentityError::Serialization(serde_json::Error::io(
                    std::io::Error::other(format!("unknown role: {other}")),
                )));
            }
        };

        let status_str: String = row.try_get("status")?;
        let status = UserStatus::parse(&status_str).ok_or_else(|| {
            IdentityError::Serialization(serde_json::Error::io(std::io::Error::other(format!(
                "unknown user status: {status_str}"
            ))))
        })?;

        Ok(IdentityUser {
            id: UserId::from_uuid(row.try_get::<Uuid, _>("id")?),
            email: row.try_get("email")?,
            fullname: row.try_get("fullname")?,
            phone_number: row.try_get("phone_number")?,
            role,
            status,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl IdentityStore for PostgresIdentityStore {
    async fn create_user(&self, user: IdentityUser, event: OutboxEvent) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO users (id, email, fullname, phone_number, role, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(&user.email)
        .bind(&user.fullname)
        .bind(&user.phone_number)
        .bind(user.role.as_str())
        .bind(user.status.as_str())
        .bind(user.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("unique_user_email")
            {
                return IdentityError::DuplicateEmail(user.email.clone());
            }
            IdentityError::Database(e)
        })?;

        PostgresOutboxStore::append_in_tx(&mut tx, &event).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn mark_pending_deletion(
        &self,
        user_id: UserId,
        event: OutboxEvent,
    ) -> Result<IdentityUser> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            SELECT id, email, fullname, phone_number, role, status, created_at
            FROM users
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(IdentityError::UserNotFound(user_id))?;

        let user = Self::row_to_user(row)?;

        sqlx::query("UPDATE users SET status = 'PENDING_DELETION' WHERE id = $1")
            .bind(user_id.as_uuid())
            .execute(&mut *tx)
            .await?;

        PostgresOutboxStore::append_in_tx(&mut tx, &event).await?;

        tx.commit().await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<IdentityUser>> {
        let row = sqlx::query(
            r#"
            SELECT id, email, fullname, phone_number, role, status, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_user).transpose()
    }

    async fn get(&self, user_id: UserId) -> Result<Option<IdentityUser>> {
        let row = sqlx::query(
            r#"
            SELECT id, email, fullname, phone_number, role, status, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_user).transpose()
    }

    async fn set_status(&self, user_id: UserId, status: UserStatus) -> Result<bool> {
        let result = sqlx::query("UPDATE users SET status = $2 WHERE id = $1")
            .bind(user_id.as_uuid())
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_user(&self, user_id: UserId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
