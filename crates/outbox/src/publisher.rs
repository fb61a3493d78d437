//! Single-flight poller that drains NEW outbox rows to the broker.

use std::time::Duration;

use messaging::MessageBroker;

use crate::event::OutboxStatus;
use crate::store::OutboxStore;
use crate::Result;

/// Publisher tuning knobs.
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Delay between non-empty poll cycles.
    pub poll_interval: Duration,
    /// Maximum rows fetched per cycle.
    pub batch_size: u32,
    /// Attempt ceiling; a row whose attempts exceed it is sealed Failed.
    pub max_attempts: i32,
    /// Idle backoff grows by this step per consecutive empty cycle.
    pub idle_backoff_step: Duration,
    /// Idle backoff never exceeds this.
    pub idle_backoff_cap: Duration,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1000),
            batch_size: 100,
            max_attempts: 10,
            idle_backoff_step: Duration::from_millis(200),
            idle_backoff_cap: Duration::from_millis(5000),
        }
    }
}

impl PublisherConfig {
    /// Sleep applied after the n-th consecutive empty poll:
    /// `min(step * n, cap)`.
    pub fn idle_backoff(&self, consecutive_empty: u32) -> Duration {
        let backoff = self
            .idle_backoff_step
            .saturating_mul(consecutive_empty);
        backoff.min(self.idle_backoff_cap)
    }
}

/// Drains the outbox to the broker.
///
/// One publisher task owns one loop, so cycles never overlap. Multiple
/// publisher instances racing over the same NEW rows are tolerated (no
/// row-level claim): downstream consumption is idempotent, so a duplicate
/// send is wasted work, not a correctness problem.
pub struct OutboxPublisher<S, B>
where
    S: OutboxStore,
    B: MessageBroker,
{
    store: S,
    broker: B,
    config: PublisherConfig,
}

impl<S, B> OutboxPublisher<S, B>
where
    S: OutboxStore,
    B: MessageBroker,
{
    /// Creates a new publisher over a store and broker.
    pub fn new(store: S, broker: B, config: PublisherConfig) -> Self {
        Self {
            store,
            broker,
            config,
        }
    }

    /// Runs one poll cycle and returns the number of rows fetched.
    ///
    /// Each fetched row is published under its aggregate id as partition
    /// key. An ack resolves the row Published; a failure leaves it NEW for
    /// the next cycle until the attempt ceiling seals it Failed.
    #[tracing::instrument(skip(self))]
    pub async fn drain_once(&self) -> Result<usize> {
        let batch = self.store.fetch_unpublished(self.config.batch_size).await?;
        if batch.is_empty() {
            return Ok(0);
        }

        let fetched = batch.len();
        for row in batch {
            match self
                .broker
                .publish(&row.event_type, &row.aggregate_id, row.payload.clone())
                .await
            {
                Ok(()) => {
                    self.store.mark_published(row.id).await?;
                    metrics::counter!("outbox_published_total").increment(1);
                }
                Err(e) => {
                    let status = self
                        .store
                        .record_failed_attempt(row.id, self.config.max_attempts)
                        .await?;
                    metrics::counter!("outbox_publish_failures_total").increment(1);

                    if status == OutboxStatus::Failed {
                        metrics::counter!("outbox_poisoned_total").increment(1);
                        tracing::warn!(
                            outbox_id = %row.id,
                            event_type = %row.event_type,
                            error = %e,
                            "outbox row sealed as poison after exhausting retries"
                        );
                    } else {
                        tracing::debug!(
                            outbox_id = %row.id,
                            error = %e,
                            "publish failed, row left for retry"
                        );
                    }
                }
            }
        }

        Ok(fetched)
    }

    /// Runs the poll loop until the task is dropped or aborted.
    ///
    /// Empty cycles back off linearly up to the cap; the backoff counter
    /// resets on the next non-empty cycle.
    pub async fn run(&self) {
        let mut consecutive_empty: u32 = 0;

        loop {
            match self.drain_once().await {
                Ok(0) => {
                    consecutive_empty += 1;
                    tokio::time::sleep(self.config.idle_backoff(consecutive_empty)).await;
                }
                Ok(_) => {
                    consecutive_empty = 0;
                    tokio::time::sleep(self.config.poll_interval).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "outbox poll cycle failed");
                    tokio::time::sleep(self.config.poll_interval).await;
                }
            }
        }
    }
}
