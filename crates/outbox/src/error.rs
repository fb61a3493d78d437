use thiserror::Error;

use crate::event::OutboxEventId;

/// Errors that can occur when interacting with the outbox store.
#[derive(Debug, Error)]
pub enum OutboxStoreError {
    /// The referenced row does not exist.
    #[error("Outbox row not found: {0}")]
    RowNotFound(OutboxEventId),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for outbox store operations.
pub type Result<T> = std::result::Result<T, OutboxStoreError>;
