//! Logical topic names the saga travels on.
//!
//! Ordering is guaranteed per partition only; events are published under
//! the user id as partition key so one user's events stay ordered.

/// Identity → profile: provision a role-specific profile for a new user.
pub const USER_CREATED: &str = "user.created.v2";

/// Profile → identity: the profile aggregate was created.
pub const PROFILE_COMPLETED: &str = "user.profile.completed";

/// Profile → identity: provisioning failed terminally; compensate.
pub const PROFILE_FAILED: &str = "user.profile.failed";

/// Identity → profile: tear down the profile for a user being deleted.
pub const USER_DELETE_REQUESTED: &str = "user.delete.requested.v1";

/// Profile → identity: the profile was removed.
pub const DELETE_PROFILE_COMPLETED: &str = "user.delete.profile.completed.v1";

/// Profile → identity: profile removal failed; the deletion is rejected.
pub const USER_DELETE_FAILED: &str = "user.delete.failed.v1";
