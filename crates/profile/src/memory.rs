//! In-memory implementations of the profile-side stores.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{BranchId, SagaId, UserId};
use domain::{BusinessRoleAssignment, ProfileAggregate};

use crate::branch::{BranchDirectory, BranchLookupError};
use crate::processed::{ProcessedEventStore, ProcessedStoreError};
use crate::store::{ProfileStore, ProfileStoreError};

/// In-memory dedup ledger.
#[derive(Clone, Default)]
pub struct InMemoryProcessedEventStore {
    entries: Arc<RwLock<HashMap<(SagaId, String), DateTime<Utc>>>>,
}

impl InMemoryProcessedEventStore {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded entries.
    pub fn entry_count(&self) -> usize {
        self.entries.read().unwrap().len()
    }
}

#[async_trait]
impl ProcessedEventStore for InMemoryProcessedEventStore {
    async fn record(&self, saga_id: SagaId, topic: &str) -> Result<bool, ProcessedStoreError> {
        let mut entries = self.entries.write().unwrap();
        let key = (saga_id, topic.to_string());
        if entries.contains_key(&key) {
            return Ok(false);
        }
        entries.insert(key, Utc::now());
        Ok(true)
    }

    async fn contains(&self, saga_id: SagaId, topic: &str) -> Result<bool, ProcessedStoreError> {
        Ok(self
            .entries
            .read()
            .unwrap()
            .contains_key(&(saga_id, topic.to_string())))
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, ProcessedStoreError> {
        let mut entries = self.entries.write().unwrap();
        let before = entries.len();
        entries.retain(|_, processed_at| *processed_at >= cutoff);
        Ok((before - entries.len()) as u64)
    }
}

#[derive(Default)]
struct ProfileState {
    profiles: HashMap<UserId, ProfileAggregate>,
    // Kept apart from the profiles to mirror the associations table, so a
    // simulated partial commit can leave orphans behind.
    assignments: HashMap<UserId, Vec<BusinessRoleAssignment>>,
    fail_on_insert: bool,
    fail_on_delete: bool,
    leave_partial_assignments: bool,
}

/// In-memory profile store with the failure toggles the saga tests need.
///
/// `set_fail_on_insert` makes inserts fail as a domain rejection;
/// combined with `set_leave_partial_assignments` the failing insert first
/// commits the staff role assignments, simulating the partial-commit
/// window that the consumer's defensive compensation cleans up.
#[derive(Clone, Default)]
pub struct InMemoryProfileStore {
    state: Arc<RwLock<ProfileState>>,
}

impl InMemoryProfileStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures inserts to fail with a domain rejection.
    pub fn set_fail_on_insert(&self, fail: bool) {
        self.state.write().unwrap().fail_on_insert = fail;
    }

    /// Configures deletes to fail.
    pub fn set_fail_on_delete(&self, fail: bool) {
        self.state.write().unwrap().fail_on_delete = fail;
    }

    /// Makes a failing insert leave its role assignments committed.
    pub fn set_leave_partial_assignments(&self, leave: bool) {
        self.state.write().unwrap().leave_partial_assignments = leave;
    }

    /// Number of stored profiles.
    pub fn profile_count(&self) -> usize {
        self.state.read().unwrap().profiles.len()
    }

    /// Role assignments currently stored for a user, orphaned or not.
    pub fn assignments_for(&self, user_id: UserId) -> Vec<BusinessRoleAssignment> {
        self.state
            .read()
            .unwrap()
            .assignments
            .get(&user_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn insert_profile(&self, profile: ProfileAggregate) -> Result<(), ProfileStoreError> {
        let mut state = self.state.write().unwrap();
        let user_id = profile.user_id();

        if state.profiles.contains_key(&user_id) {
            return Err(ProfileStoreError::AlreadyExists(user_id));
        }

        if state.fail_on_insert {
            if state.leave_partial_assignments
                && let ProfileAggregate::Staff(staff) = &profile
            {
                state
                    .assignments
                    .insert(user_id, staff.role_assignments.clone());
            }
            return Err(ProfileStoreError::Rejected(
                "injected profile store failure".to_string(),
            ));
        }

        if let ProfileAggregate::Staff(staff) = &profile {
            state
                .assignments
                .insert(user_id, staff.role_assignments.clone());
        }
        state.profiles.insert(user_id, profile);
        Ok(())
    }

    async fn delete_profile(&self, user_id: UserId) -> Result<bool, ProfileStoreError> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_delete {
            return Err(ProfileStoreError::Rejected(
                "injected profile delete failure".to_string(),
            ));
        }
        state.assignments.remove(&user_id);
        Ok(state.profiles.remove(&user_id).is_some())
    }

    async fn remove_role_assignments(&self, user_id: UserId) -> Result<u64, ProfileStoreError> {
        let mut state = self.state.write().unwrap();
        Ok(state
            .assignments
            .remove(&user_id)
            .map(|a| a.len() as u64)
            .unwrap_or(0))
    }

    async fn get(&self, user_id: UserId) -> Result<Option<ProfileAggregate>, ProfileStoreError> {
        Ok(self.state.read().unwrap().profiles.get(&user_id).cloned())
    }
}

#[derive(Default)]
struct BranchState {
    branches: HashSet<BranchId>,
    fail_lookup: bool,
}

/// In-memory branch directory.
#[derive(Clone, Default)]
pub struct InMemoryBranchDirectory {
    state: Arc<RwLock<BranchState>>,
}

impl InMemoryBranchDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a directory already containing the given branches.
    pub fn with_branches(branches: impl IntoIterator<Item = i64>) -> Self {
        let directory = Self::new();
        for id in branches {
            directory.add_branch(BranchId::new(id));
        }
        directory
    }

    /// Registers a branch.
    pub fn add_branch(&self, branch_id: BranchId) {
        self.state.write().unwrap().branches.insert(branch_id);
    }

    /// Makes lookups fail as unreachable.
    pub fn set_fail_on_lookup(&self, fail: bool) {
        self.state.write().unwrap().fail_lookup = fail;
    }
}

#[async_trait]
impl BranchDirectory for InMemoryBranchDirectory {
    async fn branch_exists(&self, branch_id: BranchId) -> Result<bool, BranchLookupError> {
        let state = self.state.read().unwrap();
        if state.fail_lookup {
            return Err(BranchLookupError(
                "injected branch directory outage".to_string(),
            ));
        }
        Ok(state.branches.contains(&branch_id))
    }
}
