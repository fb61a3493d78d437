use common::UserId;
use outbox::OutboxStoreError;
use thiserror::Error;

/// Errors that can occur in the identity service.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// A user with this email already exists; rejected before any saga
    /// state is created.
    #[error("A user with email '{0}' already exists")]
    DuplicateEmail(String),

    /// The user row does not exist.
    #[error("User not found: {0}")]
    UserNotFound(UserId),

    /// The user is not in a state that allows the requested operation.
    #[error("User {user_id} is {status}, expected {expected}")]
    InvalidUserState {
        user_id: UserId,
        status: String,
        expected: String,
    },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// An outbox store error occurred.
    #[error("Outbox error: {0}")]
    Outbox(#[from] OutboxStoreError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for identity operations.
pub type Result<T> = std::result::Result<T, IdentityError>;
