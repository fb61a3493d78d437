//! In-memory broker for wiring and tests.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::broker::{BrokerError, Message, MessageBroker};

#[derive(Default)]
struct BrokerState {
    subscribers: HashMap<String, Vec<mpsc::UnboundedSender<Message>>>,
    delivered: Vec<Message>,
    fail_remaining: u32,
}

/// In-memory topic fan-out with failure injection.
///
/// `fail_next_publishes` makes the next N publish calls return
/// [`BrokerError::Unavailable`], which is how tests exercise the outbox
/// retry and poison paths. The delivery log keeps every acknowledged
/// message for assertions.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<RwLock<BrokerState>>,
}

impl InMemoryBroker {
    /// Creates a new broker with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` publish calls fail as unreachable.
    pub fn fail_next_publishes(&self, count: u32) {
        self.state.write().unwrap().fail_remaining = count;
    }

    /// Returns all acknowledged messages on a topic, in publish order.
    pub fn delivered(&self, topic: &str) -> Vec<Message> {
        self.state
            .read()
            .unwrap()
            .delivered
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    /// Number of acknowledged messages on a topic.
    pub fn delivered_count(&self, topic: &str) -> usize {
        self.delivered(topic).len()
    }

    /// Re-delivers an already-acknowledged message to current subscribers,
    /// simulating the duplicate delivery an at-least-once broker is
    /// allowed to produce.
    pub fn redeliver(&self, message: &Message) {
        let mut state = self.state.write().unwrap();
        Self::fan_out(&mut state, message.clone());
    }

    fn fan_out(state: &mut BrokerState, message: Message) {
        if let Some(senders) = state.subscribers.get_mut(&message.topic) {
            senders.retain(|tx| tx.send(message.clone()).is_ok());
        }
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn publish(
        &self,
        topic: &str,
        partition_key: &str,
        payload: serde_json::Value,
    ) -> Result<(), BrokerError> {
        let mut state = self.state.write().unwrap();

        if state.fail_remaining > 0 {
            state.fail_remaining -= 1;
            return Err(BrokerError::Unavailable(
                "injected broker failure".to_string(),
            ));
        }

        let message = Message {
            topic: topic.to_string(),
            partition_key: partition_key.to_string(),
            payload,
        };
        state.delivered.push(message.clone());
        Self::fan_out(&mut state, message);
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state
            .write()
            .unwrap()
            .subscribers
            .entry(topic.to_string())
            .or_default()
            .push(tx);
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_all_subscribers() {
        let broker = InMemoryBroker::new();
        let mut rx1 = broker.subscribe("t").await;
        let mut rx2 = broker.subscribe("t").await;

        broker
            .publish("t", "k", serde_json::json!({"n": 1}))
            .await
            .unwrap();

        assert_eq!(rx1.recv().await.unwrap().partition_key, "k");
        assert_eq!(rx2.recv().await.unwrap().payload["n"], 1);
        assert_eq!(broker.delivered_count("t"), 1);
    }

    #[tokio::test]
    async fn injected_failures_are_consumed_in_order() {
        let broker = InMemoryBroker::new();
        broker.fail_next_publishes(2);

        assert!(broker.publish("t", "k", serde_json::json!({})).await.is_err());
        assert!(broker.publish("t", "k", serde_json::json!({})).await.is_err());
        assert!(broker.publish("t", "k", serde_json::json!({})).await.is_ok());
        assert_eq!(broker.delivered_count("t"), 1);
    }

    #[tokio::test]
    async fn redeliver_duplicates_to_subscribers_without_logging() {
        let broker = InMemoryBroker::new();
        let mut rx = broker.subscribe("t").await;

        broker
            .publish("t", "k", serde_json::json!({"n": 1}))
            .await
            .unwrap();
        let first = rx.recv().await.unwrap();

        broker.redeliver(&first);
        let second = rx.recv().await.unwrap();

        assert_eq!(first.payload, second.payload);
        // The log counts acknowledged publishes, not deliveries.
        assert_eq!(broker.delivered_count("t"), 1);
    }

    #[tokio::test]
    async fn dropped_subscriber_is_pruned() {
        let broker = InMemoryBroker::new();
        let rx = broker.subscribe("t").await;
        drop(rx);

        // Must not error against the closed channel.
        broker
            .publish("t", "k", serde_json::json!({}))
            .await
            .unwrap();
    }
}
