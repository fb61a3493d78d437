//! Branch-existence precondition for manager and staff provisioning.

use async_trait::async_trait;
use common::BranchId;
use thiserror::Error;

/// The branch directory could not answer the lookup.
#[derive(Debug, Error)]
#[error("Branch lookup failed: {0}")]
pub struct BranchLookupError(pub String);

/// External lookup of branch existence (a collaborator service).
#[async_trait]
pub trait BranchDirectory: Send + Sync {
    /// Returns whether the branch exists. `Err` means the directory
    /// itself could not be reached, which is a different condition from
    /// `Ok(false)` and is governed by [`PreconditionPolicy`].
    async fn branch_exists(&self, branch_id: BranchId) -> Result<bool, BranchLookupError>;
}

/// What to do when the branch directory is unreachable.
///
/// A missing branch always fails the saga; this policy only covers lookup
/// *errors*. It is explicit configuration rather than an accident of error
/// handling, and defaults to failing closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PreconditionPolicy {
    /// Treat an unreachable directory as a saga failure.
    #[default]
    FailClosed,
    /// Log the lookup error and provision anyway.
    FailOpen,
}

impl PreconditionPolicy {
    /// Parses a configuration value (`"fail_closed"` / `"fail_open"`).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "fail_closed" => Some(PreconditionPolicy::FailClosed),
            "fail_open" => Some(PreconditionPolicy::FailOpen),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_fail_closed() {
        assert_eq!(PreconditionPolicy::default(), PreconditionPolicy::FailClosed);
    }

    #[test]
    fn parse_accepts_both_policies() {
        assert_eq!(
            PreconditionPolicy::parse("fail_closed"),
            Some(PreconditionPolicy::FailClosed)
        );
        assert_eq!(
            PreconditionPolicy::parse("fail_open"),
            Some(PreconditionPolicy::FailOpen)
        );
        assert_eq!(PreconditionPolicy::parse("ignore"), None);
    }
}
