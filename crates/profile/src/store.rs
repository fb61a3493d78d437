use async_trait::async_trait;
use common::UserId;
use domain::ProfileAggregate;
use thiserror::Error;

/// Errors that can occur when interacting with the profile store.
#[derive(Debug, Error)]
pub enum ProfileStoreError {
    /// A profile already exists for this user; a concurrent duplicate
    /// delivery won the insert.
    #[error("Profile already exists for user {0}")]
    AlreadyExists(UserId),

    /// The store rejected the aggregate (domain failure).
    #[error("Profile rejected: {0}")]
    Rejected(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Core trait for profile store implementations.
///
/// The aggregate and its business-role associations are persisted in one
/// local transaction; a failure leaves neither behind — except for the
/// defensive path, where the consumer explicitly removes associations that
/// survived a partial commit.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Persists a profile aggregate and its associations atomically.
    async fn insert_profile(&self, profile: ProfileAggregate) -> Result<(), ProfileStoreError>;

    /// Deletes a profile and its associations. Idempotent: returns false
    /// if the profile was already gone.
    async fn delete_profile(&self, user_id: UserId) -> Result<bool, ProfileStoreError>;

    /// Defensive compensation: removes any business-role associations
    /// left behind by a partially committed insert. Returns the number
    /// removed.
    async fn remove_role_assignments(&self, user_id: UserId) -> Result<u64, ProfileStoreError>;

    /// Loads a profile by user ID.
    async fn get(&self, user_id: UserId) -> Result<Option<ProfileAggregate>, ProfileStoreError>;
}
