//! Entry points for starting creation and deletion sagas.

use std::sync::Arc;

use common::{SagaId, UserId};
use domain::{Role, RoleDetails, UserDeletionRequested, UserProvisioningRequested, topics};
use outbox::OutboxEvent;

use crate::coordinator::{SagaCoordinator, SagaWaitHandle};
use crate::error::{IdentityError, Result};
use crate::store::IdentityStore;
use crate::user::IdentityUser;

/// Aggregate type recorded on outbox rows written by this service.
const AGGREGATE_TYPE: &str = "User";

/// A validated request to provision a new user.
#[derive(Debug, Clone)]
pub struct NewUserRequest {
    pub email: String,
    pub fullname: String,
    pub phone_number: String,
    pub details: RoleDetails,
}

/// Handed back to the HTTP layer once the saga-initiating write committed.
pub struct StartedSaga {
    pub saga_id: SagaId,
    pub user_id: UserId,
    pub handle: SagaWaitHandle,
}

/// Starts sagas: performs the pre-saga validation, the atomic
/// user-plus-outbox write, and registers the wait handle.
pub struct ProvisioningService<I: IdentityStore> {
    store: I,
    coordinator: Arc<SagaCoordinator>,
}

impl<I: IdentityStore> ProvisioningService<I> {
    /// Creates a new service over a store and wait registry.
    pub fn new(store: I, coordinator: Arc<SagaCoordinator>) -> Self {
        Self { store, coordinator }
    }

    /// The wait registry this service registers handles in.
    pub fn coordinator(&self) -> &Arc<SagaCoordinator> {
        &self.coordinator
    }

    /// Read access to the identity store.
    pub fn store(&self) -> &I {
        &self.store
    }

    /// Starts a creation saga.
    ///
    /// Duplicate emails are rejected here, synchronously, before any saga
    /// state exists: no saga id is allocated and no outbox row is written.
    /// On success the speculative user row and its outbox row are
    /// committed atomically and a wait handle is registered.
    #[tracing::instrument(skip(self, request), fields(email = %request.email))]
    pub async fn begin_creation(&self, request: NewUserRequest) -> Result<StartedSaga> {
        if self.store.find_by_email(&request.email).await?.is_some() {
            metrics::counter!("provisioning_rejected_duplicate_email").increment(1);
            return Err(IdentityError::DuplicateEmail(request.email));
        }

        let user = IdentityUser::new(
            request.email.clone(),
            request.fullname.clone(),
            request.phone_number.clone(),
            request.details.role(),
        );
        let saga_id = SagaId::new();

        let event = UserProvisioningRequested::new(
            saga_id,
            user.id,
            request.email,
            request.fullname,
            request.phone_number,
            request.details,
        );
        let outbox_event = OutboxEvent::new(
            AGGREGATE_TYPE,
            user.id.to_string(),
            topics::USER_CREATED,
            serde_json::to_value(&event)?,
        );

        let user_id = user.id;
        self.store.create_user(user, outbox_event).await?;

        metrics::counter!("provisioning_sagas_started").increment(1);
        tracing::info!(%saga_id, %user_id, "creation saga started");

        let handle = self.coordinator.register(saga_id);
        Ok(StartedSaga {
            saga_id,
            user_id,
            handle,
        })
    }

    /// Starts a deletion saga for an existing user of the expected role.
    ///
    /// The row is marked `PendingDeletion` in the same transaction that
    /// appends the deletion event; the row itself is only removed once the
    /// profile side confirms.
    #[tracing::instrument(skip(self))]
    pub async fn begin_deletion(&self, user_id: UserId, expected_role: Role) -> Result<StartedSaga> {
        let user = self
            .store
            .get(user_id)
            .await?
            .ok_or(IdentityError::UserNotFound(user_id))?;

        if user.role != expected_role {
            // Deleting a staff member through the manager endpoint (or
            // vice versa) addresses a row that, for this surface, does
            // not exist.
            return Err(IdentityError::UserNotFound(user_id));
        }

        let saga_id = SagaId::new();
        let event = UserDeletionRequested::new(saga_id, user_id, user.role);
        let outbox_event = OutboxEvent::new(
            AGGREGATE_TYPE,
            user_id.to_string(),
            topics::USER_DELETE_REQUESTED,
            serde_json::to_value(&event)?,
        );

        self.store.mark_pending_deletion(user_id, outbox_event).await?;

        metrics::counter!("deletion_sagas_started").increment(1);
        tracing::info!(%saga_id, %user_id, "deletion saga started");

        let handle = self.coordinator.register(saga_id);
        Ok(StartedSaga {
            saga_id,
            user_id,
            handle,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryIdentityStore;
    use crate::user::UserStatus;
    use chrono::NaiveDate;
    use common::BranchId;
    use outbox::{InMemoryOutboxStore, OutboxStatus, OutboxStore};

    fn service() -> (
        ProvisioningService<InMemoryIdentityStore>,
        InMemoryIdentityStore,
        InMemoryOutboxStore,
    ) {
        let outbox = InMemoryOutboxStore::new();
        let store = InMemoryIdentityStore::new(outbox.clone());
        let service = ProvisioningService::new(store.clone(), Arc::new(SagaCoordinator::new()));
        (service, store, outbox)
    }

    fn manager_request(email: &str) -> NewUserRequest {
        NewUserRequest {
            email: email.to_string(),
            fullname: "Max Manager".to_string(),
            phone_number: "555-0100".to_string(),
            details: RoleDetails::Manager {
                branch_id: BranchId::new(1),
                hire_date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
                identity_card: "ID-1".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn begin_creation_writes_user_and_outbox_row() {
        let (service, store, outbox) = service();

        let started = service.begin_creation(manager_request("m@x.com")).await.unwrap();

        let user = store.get(started.user_id).await.unwrap().unwrap();
        assert_eq!(user.status, UserStatus::Provisioning);
        assert_eq!(user.role, Role::Manager);

        let rows = outbox.fetch_unpublished(10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].event_type, domain::topics::USER_CREATED);
        assert_eq!(rows[0].aggregate_id, started.user_id.to_string());
        assert_eq!(
            rows[0].payload["saga_id"],
            serde_json::json!(started.saga_id)
        );
        assert_eq!(service.coordinator().pending_count(), 1);
    }

    #[tokio::test]
    async fn duplicate_email_rejected_before_any_saga_state() {
        let (service, _, outbox) = service();
        service.begin_creation(manager_request("m@x.com")).await.unwrap();

        let result = service.begin_creation(manager_request("m@x.com")).await;
        assert!(matches!(result, Err(IdentityError::DuplicateEmail(_))));

        // Exactly the first saga's row; the rejected request wrote none
        // and registered no wait.
        assert_eq!(outbox.row_count().await, 1);
        assert_eq!(service.coordinator().pending_count(), 1);
    }

    #[tokio::test]
    async fn begin_deletion_marks_row_and_appends_event() {
        let (service, store, outbox) = service();
        let started = service.begin_creation(manager_request("m@x.com")).await.unwrap();

        let deletion = service
            .begin_deletion(started.user_id, Role::Manager)
            .await
            .unwrap();

        let user = store.get(started.user_id).await.unwrap().unwrap();
        assert_eq!(user.status, UserStatus::PendingDeletion);
        assert_ne!(deletion.saga_id, started.saga_id);
        assert_eq!(outbox.count_by_status(OutboxStatus::New).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn begin_deletion_checks_role() {
        let (service, _, _) = service();
        let started = service.begin_creation(manager_request("m@x.com")).await.unwrap();

        let result = service.begin_deletion(started.user_id, Role::Staff).await;
        assert!(matches!(result, Err(IdentityError::UserNotFound(_))));
    }

    #[tokio::test]
    async fn begin_deletion_unknown_user() {
        let (service, _, _) = service();
        let result = service.begin_deletion(UserId::new(), Role::Manager).await;
        assert!(matches!(result, Err(IdentityError::UserNotFound(_))));
    }
}
