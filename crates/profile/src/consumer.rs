//! Idempotent consumer of the saga-initiating events.
//!
//! Per-saga work is serialized by the dedup ledger's uniqueness
//! constraint, not by locks: the loser of a concurrent-delivery race
//! detects the conflict and treats the saga as already handled. Both
//! success and terminal failure record a ledger entry, so a failed
//! creation is never replayed as a retry.

use common::UserId;
use domain::{
    FailureCode, ProfileAggregate, ProfileDeletionCompleted, ProfileDeletionFailed,
    ProfileProvisioningCompleted, ProfileProvisioningFailed, RoleDetails, UserDeletionRequested,
    UserProvisioningRequested, topics,
};
use messaging::{Message, MessageBroker};
use tokio::sync::mpsc;

use crate::branch::{BranchDirectory, PreconditionPolicy};
use crate::error::ProvisionError;
use crate::processed::ProcessedEventStore;
use crate::store::{ProfileStore, ProfileStoreError};

/// Subscriptions the consumer drains, one receiver per topic.
pub struct ConsumerStreams {
    pub created: mpsc::UnboundedReceiver<Message>,
    pub delete_requested: mpsc::UnboundedReceiver<Message>,
}

/// What handling one delivery amounted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleOutcome {
    /// The side effect ran and the completion event was published.
    Provisioned,
    /// The profile was removed and the deletion completion published.
    Deleted,
    /// A duplicate delivery, or the loser of a concurrent race; nothing
    /// was done.
    AlreadyProcessed,
    /// The saga failed terminally and the failure event was published.
    Failed(FailureCode),
}

/// Builds and persists profile aggregates, reporting terminal outcomes
/// back toward the identity service.
pub struct ProvisioningConsumer<P, S, D, B>
where
    P: ProcessedEventStore,
    S: ProfileStore,
    D: BranchDirectory,
    B: MessageBroker,
{
    processed: P,
    profiles: S,
    branches: D,
    broker: B,
    policy: PreconditionPolicy,
}

impl<P, S, D, B> ProvisioningConsumer<P, S, D, B>
where
    P: ProcessedEventStore,
    S: ProfileStore,
    D: BranchDirectory,
    B: MessageBroker,
{
    /// Creates a new consumer.
    pub fn new(processed: P, profiles: S, branches: D, broker: B, policy: PreconditionPolicy) -> Self {
        Self {
            processed,
            profiles,
            branches,
            broker,
            policy,
        }
    }

    /// Decodes and dispatches one message by topic.
    pub async fn handle_message(&self, message: &Message) -> Result<HandleOutcome, ProvisionError> {
        match message.topic.as_str() {
            topics::USER_CREATED => {
                let event: UserProvisioningRequested =
                    serde_json::from_value(message.payload.clone())?;
                self.handle_creation(event).await
            }
            topics::USER_DELETE_REQUESTED => {
                let event: UserDeletionRequested =
                    serde_json::from_value(message.payload.clone())?;
                self.handle_deletion(event).await
            }
            other => {
                tracing::debug!(topic = other, "ignoring message on unexpected topic");
                Ok(HandleOutcome::AlreadyProcessed)
            }
        }
    }

    /// Consumes both subscriptions until all senders close. Broker
    /// failures while publishing a terminal event are logged and left to
    /// redelivery: the ledger entry is already in place, so the retry is
    /// absorbed as a duplicate.
    pub async fn run(&self, mut streams: ConsumerStreams) {
        loop {
            let message = tokio::select! {
                Some(m) = streams.created.recv() => m,
                Some(m) = streams.delete_requested.recv() => m,
                else => break,
            };

            if let Err(e) = self.handle_message(&message).await {
                tracing::error!(topic = %message.topic, error = %e, "failed to handle provisioning event");
            }
        }
    }

    /// Handles one creation event idempotently.
    #[tracing::instrument(skip(self, event), fields(saga_id = %event.saga_id, role = %event.details.role()))]
    pub async fn handle_creation(
        &self,
        event: UserProvisioningRequested,
    ) -> Result<HandleOutcome, ProvisionError> {
        if self
            .processed
            .contains(event.saga_id, topics::USER_CREATED)
            .await?
        {
            metrics::counter!("duplicate_deliveries_total").increment(1);
            tracing::debug!("duplicate creation delivery, already handled");
            return Ok(HandleOutcome::AlreadyProcessed);
        }

        if let Err(e) = self.check_branch_precondition(&event.details).await {
            return self.fail_creation(&event, e).await;
        }

        let aggregate = ProfileAggregate::from_request(&event);
        match self.profiles.insert_profile(aggregate).await {
            Ok(()) => {
                if !self
                    .processed
                    .record(event.saga_id, topics::USER_CREATED)
                    .await?
                {
                    // A concurrent delivery recorded first; it owns the
                    // terminal publish.
                    return Ok(HandleOutcome::AlreadyProcessed);
                }

                self.publish_completion(&event).await;
                metrics::counter!("profiles_provisioned_total").increment(1);
                tracing::info!(user_id = %event.user_id, "profile provisioned");
                Ok(HandleOutcome::Provisioned)
            }
            Err(ProfileStoreError::AlreadyExists(_)) => {
                // Lost the insert race, or a redelivery after a crash
                // between insert and record. The profile exists, so the
                // saga succeeded; make sure the ledger and the identity
                // side both know.
                if self
                    .processed
                    .record(event.saga_id, topics::USER_CREATED)
                    .await?
                {
                    self.publish_completion(&event).await;
                }
                Ok(HandleOutcome::AlreadyProcessed)
            }
            Err(e) => self.fail_creation(&event, ProvisionError::Store(e)).await,
        }
    }

    /// Handles one deletion event idempotently.
    #[tracing::instrument(skip(self, event), fields(saga_id = %event.saga_id))]
    pub async fn handle_deletion(
        &self,
        event: UserDeletionRequested,
    ) -> Result<HandleOutcome, ProvisionError> {
        if self
            .processed
            .contains(event.saga_id, topics::USER_DELETE_REQUESTED)
            .await?
        {
            metrics::counter!("duplicate_deliveries_total").increment(1);
            return Ok(HandleOutcome::AlreadyProcessed);
        }

        match self.profiles.delete_profile(event.user_id).await {
            // An absent profile still deletes cleanly: the aim of the
            // saga is "no profile row", however it is reached.
            Ok(_removed) => {
                if !self
                    .processed
                    .record(event.saga_id, topics::USER_DELETE_REQUESTED)
                    .await?
                {
                    return Ok(HandleOutcome::AlreadyProcessed);
                }

                let completed = ProfileDeletionCompleted::new(event.saga_id, event.user_id);
                self.publish(
                    topics::DELETE_PROFILE_COMPLETED,
                    event.user_id,
                    serde_json::to_value(&completed)?,
                )
                .await;
                metrics::counter!("profiles_deleted_total").increment(1);
                Ok(HandleOutcome::Deleted)
            }
            Err(e) => {
                let error = ProvisionError::Store(e);
                let code = error.failure_code();

                if !self
                    .processed
                    .record(event.saga_id, topics::USER_DELETE_REQUESTED)
                    .await?
                {
                    return Ok(HandleOutcome::AlreadyProcessed);
                }

                let failed = ProfileDeletionFailed::new(
                    event.saga_id,
                    event.user_id,
                    code,
                    error.to_string(),
                );
                self.publish(
                    topics::USER_DELETE_FAILED,
                    event.user_id,
                    serde_json::to_value(&failed)?,
                )
                .await;
                metrics::counter!("profile_deletions_failed_total").increment(1);
                tracing::warn!(user_id = %event.user_id, error = %error, "profile deletion failed");
                Ok(HandleOutcome::Failed(code))
            }
        }
    }

    async fn check_branch_precondition(&self, details: &RoleDetails) -> Result<(), ProvisionError> {
        let Some(branch_id) = details.branch_id() else {
            // Customers are not attached to a branch.
            return Ok(());
        };

        match self.branches.branch_exists(branch_id).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(ProvisionError::BranchNotFound(branch_id)),
            Err(e) => match self.policy {
                PreconditionPolicy::FailClosed => Err(ProvisionError::BranchLookup(e.to_string())),
                PreconditionPolicy::FailOpen => {
                    metrics::counter!("branch_lookup_failures_ignored_total").increment(1);
                    tracing::warn!(
                        %branch_id,
                        error = %e,
                        "branch directory unreachable, provisioning anyway (fail-open policy)"
                    );
                    Ok(())
                }
            },
        }
    }

    /// Terminal failure path: defensively clean up partial associations,
    /// record the ledger entry so the failure is not replayed as a retry,
    /// then report the failure.
    async fn fail_creation(
        &self,
        event: &UserProvisioningRequested,
        error: ProvisionError,
    ) -> Result<HandleOutcome, ProvisionError> {
        match self.profiles.remove_role_assignments(event.user_id).await {
            Ok(0) => {}
            Ok(removed) => {
                tracing::warn!(
                    user_id = %event.user_id,
                    removed,
                    "removed role assignments left by a partial commit"
                );
            }
            Err(e) => {
                tracing::error!(user_id = %event.user_id, error = %e, "defensive cleanup failed");
            }
        }

        let code = error.failure_code();
        if !self
            .processed
            .record(event.saga_id, topics::USER_CREATED)
            .await?
        {
            return Ok(HandleOutcome::AlreadyProcessed);
        }

        let failed = ProfileProvisioningFailed::new(
            event.saga_id,
            event.user_id,
            code,
            error.to_string(),
        );
        self.publish(
            topics::PROFILE_FAILED,
            event.user_id,
            serde_json::to_value(&failed)?,
        )
        .await;

        metrics::counter!("profile_provisioning_failed_total").increment(1);
        tracing::warn!(user_id = %event.user_id, %code, error = %error, "profile provisioning failed");
        Ok(HandleOutcome::Failed(code))
    }

    async fn publish_completion(&self, event: &UserProvisioningRequested) {
        let completed = ProfileProvisioningCompleted::new(event.saga_id, event.user_id);
        match serde_json::to_value(&completed) {
            Ok(payload) => self.publish(topics::PROFILE_COMPLETED, event.user_id, payload).await,
            Err(e) => tracing::error!(error = %e, "failed to encode completion event"),
        }
    }

    // Terminal events go straight to the broker. A failed publish leaves
    // the saga unresolved until the broker redelivers the request event,
    // which the ledger absorbs as a duplicate.
    async fn publish(&self, topic: &str, user_id: UserId, payload: serde_json::Value) {
        if let Err(e) = self
            .broker
            .publish(topic, &user_id.to_string(), payload)
            .await
        {
            tracing::error!(topic, %user_id, error = %e, "failed to publish terminal event");
        }
    }
}
