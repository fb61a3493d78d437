//! Closed role vocabulary for provisioning.
//!
//! Roles are a closed set dispatched by exhaustive pattern match; there is
//! deliberately no string-typed role anywhere in the saga.

use serde::{Deserialize, Serialize};

/// The role a provisioned user holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Manager,
    Staff,
    Customer,
}

impl Role {
    /// Returns the role name as used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Manager => "MANAGER",
            Role::Staff => "STAFF",
            Role::Customer => "CUSTOMER",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Employment type for staff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmploymentType {
    #[default]
    FullTime,
    PartTime,
}

/// How a staff member is paid.
///
/// When a creation request does not name a pay type it is derived from the
/// employment type via [`PayType::derived_from`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayType {
    Salaried,
    Hourly,
}

impl PayType {
    /// Default pay type for an employment type: full-time staff are
    /// salaried, part-time staff are paid hourly.
    pub fn derived_from(employment: EmploymentType) -> Self {
        match employment {
            EmploymentType::FullTime => PayType::Salaried,
            EmploymentType::PartTime => PayType::Hourly,
        }
    }
}

/// Proficiency a staff member has in an assigned business role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProficiencyLevel {
    Beginner,
    #[default]
    Intermediate,
    Advanced,
    Expert,
}

impl ProficiencyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProficiencyLevel::Beginner => "BEGINNER",
            ProficiencyLevel::Intermediate => "INTERMEDIATE",
            ProficiencyLevel::Advanced => "ADVANCED",
            ProficiencyLevel::Expert => "EXPERT",
        }
    }
}
