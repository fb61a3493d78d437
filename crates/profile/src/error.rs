use common::BranchId;
use domain::FailureCode;
use thiserror::Error;

use crate::processed::ProcessedStoreError;
use crate::store::ProfileStoreError;

/// Errors raised while handling a provisioning event.
///
/// Each variant maps to the structured [`FailureCode`] carried by the
/// terminal Failure event.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// The referenced branch does not exist.
    #[error("Branch {0} does not exist")]
    BranchNotFound(BranchId),

    /// The branch directory was unreachable under a fail-closed policy.
    #[error("Branch directory unreachable: {0}")]
    BranchLookup(String),

    /// The profile store rejected the write.
    #[error("Profile store error: {0}")]
    Store(#[from] ProfileStoreError),

    /// The dedup ledger failed.
    #[error("Dedup ledger error: {0}")]
    Dedup(#[from] ProcessedStoreError),

    /// The event payload could not be decoded.
    #[error("Malformed event payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl ProvisionError {
    /// The failure code reported to the identity side.
    pub fn failure_code(&self) -> FailureCode {
        match self {
            ProvisionError::BranchNotFound(_) => FailureCode::BranchNotFound,
            ProvisionError::BranchLookup(_) => FailureCode::BranchLookupFailed,
            ProvisionError::Store(ProfileStoreError::Rejected(_)) => {
                FailureCode::ProfileStoreRejected
            }
            ProvisionError::Malformed(_) => FailureCode::MalformedEvent,
            ProvisionError::Store(_) | ProvisionError::Dedup(_) => FailureCode::Uncategorized,
        }
    }
}
