use chrono::{DateTime, Utc};
use common::UserId;
use domain::Role;

/// Lifecycle status of an identity row.
///
/// ```text
/// Provisioning ──► Active            (profile completed)
/// Provisioning ──► (row deleted)     (profile failed, compensated)
/// Active ──► PendingDeletion ──► (row deleted) | Active  (delete saga)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserStatus {
    /// Written speculatively; the profile side has not confirmed yet.
    Provisioning,
    /// Both writes exist; the user is fully provisioned.
    Active,
    /// A deletion saga is in flight for this user.
    PendingDeletion,
}

impl UserStatus {
    /// Returns the status name as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Provisioning => "PROVISIONING",
            UserStatus::Active => "ACTIVE",
            UserStatus::PendingDeletion => "PENDING_DELETION",
        }
    }

    /// Parses a stored status name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PROVISIONING" => Some(UserStatus::Provisioning),
            "ACTIVE" => Some(UserStatus::Active),
            "PENDING_DELETION" => Some(UserStatus::PendingDeletion),
            _ => None,
        }
    }
}

impl std::fmt::Display for UserStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A row in the identity service's users table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityUser {
    pub id: UserId,
    pub email: String,
    pub fullname: String,
    pub phone_number: String,
    pub role: Role,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
}

impl IdentityUser {
    /// Creates a speculative user row, not yet confirmed by the profile
    /// side.
    pub fn new(
        email: impl Into<String>,
        fullname: impl Into<String>,
        phone_number: impl Into<String>,
        role: Role,
    ) -> Self {
        Self {
            id: UserId::new(),
            email: email.into(),
            fullname: fullname.into(),
            phone_number: phone_number.into(),
            role,
            status: UserStatus::Provisioning,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_users_start_provisioning() {
        let user = IdentityUser::new("a@x.com", "Ada", "555-0100", Role::Staff);
        assert_eq!(user.status, UserStatus::Provisioning);
        assert_eq!(user.role, Role::Staff);
    }

    #[test]
    fn status_parse_roundtrip() {
        for status in [
            UserStatus::Provisioning,
            UserStatus::Active,
            UserStatus::PendingDeletion,
        ] {
            assert_eq!(UserStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(UserStatus::parse("DELETED"), None);
    }
}
