//! Listens for the profile side's terminal events and applies the
//! identity-side consequences: activation, compensating deletes, and wait
//! handle resolution.

use std::sync::Arc;

use domain::{
    ProfileDeletionCompleted, ProfileDeletionFailed, ProfileProvisioningCompleted,
    ProfileProvisioningFailed, topics,
};
use messaging::Message;
use tokio::sync::mpsc;

use crate::coordinator::SagaCoordinator;
use crate::error::Result;
use crate::store::IdentityStore;
use crate::user::UserStatus;

/// Subscriptions the listener consumes, one receiver per topic.
pub struct TerminalEventStreams {
    pub profile_completed: mpsc::UnboundedReceiver<Message>,
    pub profile_failed: mpsc::UnboundedReceiver<Message>,
    pub delete_completed: mpsc::UnboundedReceiver<Message>,
    pub delete_failed: mpsc::UnboundedReceiver<Message>,
}

/// Applies terminal events to the identity store and resolves waits.
///
/// Compensation lives here: a creation failure deletes the speculative
/// identity row, making the two-write sequence eventually atomic from the
/// client's perspective. Every store action is idempotent, so duplicate
/// terminal events are harmless.
pub struct TerminalEventListener<I: IdentityStore> {
    store: I,
    coordinator: Arc<SagaCoordinator>,
}

impl<I: IdentityStore> TerminalEventListener<I> {
    /// Creates a new listener.
    pub fn new(store: I, coordinator: Arc<SagaCoordinator>) -> Self {
        Self { store, coordinator }
    }

    /// Dispatches one message by topic.
    ///
    /// Unknown topics are ignored; decode failures are surfaced to the
    /// caller for logging but poison nothing.
    pub async fn handle_message(&self, message: &Message) -> Result<()> {
        match message.topic.as_str() {
            topics::PROFILE_COMPLETED => {
                let event: ProfileProvisioningCompleted =
                    serde_json::from_value(message.payload.clone())?;
                self.on_profile_completed(event).await
            }
            topics::PROFILE_FAILED => {
                let event: ProfileProvisioningFailed =
                    serde_json::from_value(message.payload.clone())?;
                self.on_profile_failed(event).await
            }
            topics::DELETE_PROFILE_COMPLETED => {
                let event: ProfileDeletionCompleted =
                    serde_json::from_value(message.payload.clone())?;
                self.on_delete_completed(event).await
            }
            topics::USER_DELETE_FAILED => {
                let event: ProfileDeletionFailed =
                    serde_json::from_value(message.payload.clone())?;
                self.on_delete_failed(event).await
            }
            other => {
                tracing::debug!(topic = other, "ignoring message on unexpected topic");
                Ok(())
            }
        }
    }

    /// Consumes the four terminal-event subscriptions until all senders
    /// close.
    pub async fn run(&self, mut streams: TerminalEventStreams) {
        loop {
            let message = tokio::select! {
                Some(m) = streams.profile_completed.recv() => m,
                Some(m) = streams.profile_failed.recv() => m,
                Some(m) = streams.delete_completed.recv() => m,
                Some(m) = streams.delete_failed.recv() => m,
                else => break,
            };

            if let Err(e) = self.handle_message(&message).await {
                tracing::error!(topic = %message.topic, error = %e, "failed to handle terminal event");
            }
        }
    }

    #[tracing::instrument(skip(self, event), fields(saga_id = %event.saga_id))]
    async fn on_profile_completed(&self, event: ProfileProvisioningCompleted) -> Result<()> {
        let updated = self
            .store
            .set_status(event.user_id, UserStatus::Active)
            .await?;
        if !updated {
            tracing::warn!(user_id = %event.user_id, "completion for a user row that no longer exists");
        }

        metrics::counter!("provisioning_sagas_completed").increment(1);
        self.coordinator.complete(event.saga_id, event.user_id);
        Ok(())
    }

    #[tracing::instrument(skip(self, event), fields(saga_id = %event.saga_id))]
    async fn on_profile_failed(&self, event: ProfileProvisioningFailed) -> Result<()> {
        // Compensating delete of the speculative row. Idempotent: the row
        // may already be gone on a duplicate failure event.
        let deleted = self.store.delete_user(event.user_id).await?;
        if deleted {
            tracing::info!(
                user_id = %event.user_id,
                code = %event.code,
                reason = %event.reason,
                "compensated identity row after profile failure"
            );
        } else {
            tracing::debug!(user_id = %event.user_id, "identity row already compensated");
        }

        metrics::counter!("provisioning_sagas_failed").increment(1);
        self.coordinator.fail(event.saga_id, event.code, event.reason);
        Ok(())
    }

    #[tracing::instrument(skip(self, event), fields(saga_id = %event.saga_id))]
    async fn on_delete_completed(&self, event: ProfileDeletionCompleted) -> Result<()> {
        self.store.delete_user(event.user_id).await?;
        metrics::counter!("deletion_sagas_completed").increment(1);
        self.coordinator.complete(event.saga_id, event.user_id);
        Ok(())
    }

    #[tracing::instrument(skip(self, event), fields(saga_id = %event.saga_id))]
    async fn on_delete_failed(&self, event: ProfileDeletionFailed) -> Result<()> {
        // The deletion never happened downstream; put the row back in
        // service.
        let restored = self
            .store
            .set_status(event.user_id, UserStatus::Active)
            .await?;
        if !restored {
            tracing::warn!(user_id = %event.user_id, "delete-failed for a user row that no longer exists");
        }

        metrics::counter!("deletion_sagas_failed").increment(1);
        self.coordinator.fail(event.saga_id, event.code, event.reason);
        Ok(())
    }
}
