use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::UserId;
use outbox::{InMemoryOutboxStore, OutboxEvent, OutboxStore};
use tokio::sync::RwLock;

use crate::error::{IdentityError, Result};
use crate::store::IdentityStore;
use crate::user::{IdentityUser, UserStatus};

/// In-memory identity store.
///
/// Shares an [`InMemoryOutboxStore`] with the publisher so the
/// write-user-and-outbox-row operation stays atomic under one lock scope,
/// mirroring the single transaction of the PostgreSQL implementation.
#[derive(Clone)]
pub struct InMemoryIdentityStore {
    users: Arc<RwLock<HashMap<UserId, IdentityUser>>>,
    outbox: InMemoryOutboxStore,
}

impl InMemoryIdentityStore {
    /// Creates a store writing outbox rows into `outbox`.
    pub fn new(outbox: InMemoryOutboxStore) -> Self {
        Self {
            users: Arc::new(RwLock::new(HashMap::new())),
            outbox,
        }
    }

    /// Number of user rows currently present.
    pub async fn user_count(&self) -> usize {
        self.users.read().await.len()
    }
}

#[async_trait]
impl IdentityStore for InMemoryIdentityStore {
    async fn create_user(&self, user: IdentityUser, event: OutboxEvent) -> Result<()> {
        let mut users = self.users.write().await;

        if users.values().any(|u| u.email == user.email) {
            return Err(IdentityError::DuplicateEmail(user.email));
        }

        users.insert(user.id, user);
        // Still under the users lock: a reader can never observe the user
        // without its outbox row.
        self.outbox.insert(event).await?;
        Ok(())
    }

    async fn mark_pending_deletion(
        &self,
        user_id: UserId,
        event: OutboxEvent,
    ) -> Result<IdentityUser> {
        let mut users = self.users.write().await;

        let user = users
            .get_mut(&user_id)
            .ok_or(IdentityError::UserNotFound(user_id))?;
        let before = user.clone();
        user.status = UserStatus::PendingDeletion;

        self.outbox.insert(event).await?;
        Ok(before)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<IdentityUser>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn get(&self, user_id: UserId) -> Result<Option<IdentityUser>> {
        Ok(self.users.read().await.get(&user_id).cloned())
    }

    async fn set_status(&self, user_id: UserId, status: UserStatus) -> Result<bool> {
        let mut users = self.users.write().await;
        match users.get_mut(&user_id) {
            Some(user) => {
                user.status = status;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_user(&self, user_id: UserId) -> Result<bool> {
        Ok(self.users.write().await.remove(&user_id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::Role;
    use outbox::OutboxStatus;

    fn store() -> (InMemoryIdentityStore, InMemoryOutboxStore) {
        let outbox = InMemoryOutboxStore::new();
        (InMemoryIdentityStore::new(outbox.clone()), outbox)
    }

    fn user(email: &str) -> IdentityUser {
        IdentityUser::new(email, "Test User", "555-0100", Role::Manager)
    }

    fn event(user: &IdentityUser) -> OutboxEvent {
        OutboxEvent::new(
            "User",
            user.id.to_string(),
            "user.created.v2",
            serde_json::json!({"user_id": user.id}),
        )
    }

    #[tokio::test]
    async fn create_user_writes_row_and_outbox_together() {
        let (store, outbox) = store();
        let user = user("a@x.com");

        store.create_user(user.clone(), event(&user)).await.unwrap();

        assert_eq!(store.user_count().await, 1);
        assert_eq!(outbox.count_by_status(OutboxStatus::New).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn duplicate_email_rejected_without_outbox_row() {
        let (store, outbox) = store();
        let first = user("a@x.com");
        store.create_user(first.clone(), event(&first)).await.unwrap();

        let second = user("a@x.com");
        let result = store.create_user(second.clone(), event(&second)).await;

        assert!(matches!(result, Err(IdentityError::DuplicateEmail(_))));
        assert_eq!(store.user_count().await, 1);
        // The rejected write left no event behind.
        assert_eq!(outbox.row_count().await, 1);
    }

    #[tokio::test]
    async fn delete_user_is_idempotent() {
        let (store, _) = store();
        let user = user("a@x.com");
        store.create_user(user.clone(), event(&user)).await.unwrap();

        assert!(store.delete_user(user.id).await.unwrap());
        assert!(!store.delete_user(user.id).await.unwrap());
    }

    #[tokio::test]
    async fn mark_pending_deletion_requires_existing_user() {
        let (store, _) = store();
        let missing = user("a@x.com");
        let result = store
            .mark_pending_deletion(missing.id, event(&missing))
            .await;
        assert!(matches!(result, Err(IdentityError::UserNotFound(_))));
    }

    #[tokio::test]
    async fn mark_pending_deletion_updates_status_and_appends_event() {
        let (store, outbox) = store();
        let user = user("a@x.com");
        store.create_user(user.clone(), event(&user)).await.unwrap();

        let before = store
            .mark_pending_deletion(user.id, event(&user))
            .await
            .unwrap();

        assert_eq!(before.status, UserStatus::Provisioning);
        let after = store.get(user.id).await.unwrap().unwrap();
        assert_eq!(after.status, UserStatus::PendingDeletion);
        assert_eq!(outbox.row_count().await, 2);
    }

    #[tokio::test]
    async fn set_status_on_missing_user_reports_false() {
        let (store, _) = store();
        assert!(!store
            .set_status(UserId::new(), UserStatus::Active)
            .await
            .unwrap());
    }
}
