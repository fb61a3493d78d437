use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// A message delivered on a topic.
#[derive(Debug, Clone)]
pub struct Message {
    pub topic: String,
    /// Partition key; delivery order is only guaranteed per key.
    pub partition_key: String,
    pub payload: serde_json::Value,
}

/// Errors returned by broker operations.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The broker could not be reached; the caller may retry.
    #[error("broker unavailable: {0}")]
    Unavailable(String),

    /// The broker rejected the message.
    #[error("publish rejected: {0}")]
    Rejected(String),
}

/// Core trait for message broker implementations.
///
/// Delivery is at-least-once: consumers must tolerate duplicates. There is
/// no cross-partition ordering; callers pick partition keys so that the
/// events that must stay ordered share one.
#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Publishes a payload to a topic under a partition key.
    ///
    /// Returns once the broker has acknowledged the message.
    async fn publish(
        &self,
        topic: &str,
        partition_key: &str,
        payload: serde_json::Value,
    ) -> Result<(), BrokerError>;

    /// Subscribes to a topic, returning the receiving end of the
    /// subscription. Every subscriber receives every message on the topic.
    async fn subscribe(&self, topic: &str) -> mpsc::UnboundedReceiver<Message>;
}
