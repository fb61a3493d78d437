use async_trait::async_trait;
use common::UserId;
use outbox::OutboxEvent;

use crate::error::Result;
use crate::user::{IdentityUser, UserStatus};

/// Core trait for identity store implementations.
///
/// The saga-initiating operations take the outbox row as a parameter and
/// commit it atomically with the domain write: if the transaction rolls
/// back, no event exists, and a committed user row always has its event.
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Inserts a speculative user row and its saga-initiating outbox row
    /// in one local transaction.
    ///
    /// Fails with `DuplicateEmail` if the email is already taken; the
    /// uniqueness constraint is the backstop for concurrent requests that
    /// both pass the pre-check.
    async fn create_user(&self, user: IdentityUser, event: OutboxEvent) -> Result<()>;

    /// Marks a user `PendingDeletion` and appends the deletion saga's
    /// outbox row in one local transaction. Returns the user as it was
    /// before the update.
    async fn mark_pending_deletion(&self, user_id: UserId, event: OutboxEvent)
        -> Result<IdentityUser>;

    /// Looks a user up by email (pre-saga duplicate check).
    async fn find_by_email(&self, email: &str) -> Result<Option<IdentityUser>>;

    /// Loads a user by ID.
    async fn get(&self, user_id: UserId) -> Result<Option<IdentityUser>>;

    /// Sets a user's status. Returns false if the row is gone.
    async fn set_status(&self, user_id: UserId, status: UserStatus) -> Result<bool>;

    /// Deletes a user row. Idempotent: returns false if the row was
    /// already gone, which callers treat as success.
    async fn delete_user(&self, user_id: UserId) -> Result<bool>;
}
