//! Saga events exchanged between the identity and profile services.
//!
//! The creation payload carries a closed, tagged role variant instead of a
//! flat record of nullable fields: each variant holds exactly the fields
//! its role needs, and consumers dispatch by exhaustive match.

use chrono::{DateTime, NaiveDate, Utc};
use common::{BranchId, BusinessRoleId, SagaId, UserId};
use serde::{Deserialize, Serialize};

use crate::money::Money;
use crate::role::{EmploymentType, PayType, ProficiencyLevel, Role};

/// Role-specific payload of a creation event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoleDetails {
    Manager {
        branch_id: BranchId,
        hire_date: NaiveDate,
        identity_card: String,
    },
    Staff {
        branch_id: BranchId,
        identity_card: String,
        hire_date: NaiveDate,
        #[serde(default)]
        employment_type: EmploymentType,
        /// Derived from the employment type when absent.
        #[serde(default)]
        pay_type: Option<PayType>,
        #[serde(default)]
        base_salary: Option<Money>,
        #[serde(default)]
        insurance_salary: Option<Money>,
        #[serde(default)]
        number_of_dependents: Option<u32>,
        #[serde(default)]
        hourly_rate: Option<Money>,
        #[serde(default)]
        overtime_rate: Option<Money>,
        #[serde(default)]
        business_role_ids: Vec<BusinessRoleId>,
        /// Applied to every business-role association.
        #[serde(default)]
        proficiency_level: ProficiencyLevel,
    },
    Customer {
        dob: NaiveDate,
        #[serde(default)]
        avatar_url: Option<String>,
        #[serde(default)]
        bio: Option<String>,
    },
}

impl RoleDetails {
    /// Returns the role this payload belongs to.
    pub fn role(&self) -> Role {
        match self {
            RoleDetails::Manager { .. } => Role::Manager,
            RoleDetails::Staff { .. } => Role::Staff,
            RoleDetails::Customer { .. } => Role::Customer,
        }
    }

    /// The branch the role is attached to, for the roles that have one.
    pub fn branch_id(&self) -> Option<BranchId> {
        match self {
            RoleDetails::Manager { branch_id, .. } | RoleDetails::Staff { branch_id, .. } => {
                Some(*branch_id)
            }
            RoleDetails::Customer { .. } => None,
        }
    }
}

/// Saga-initiating event: a speculative identity row has been committed
/// and the profile service must provision a matching profile.
///
/// Published on [`crate::topics::USER_CREATED`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProvisioningRequested {
    pub saga_id: SagaId,
    pub user_id: UserId,
    pub email: String,
    pub fullname: String,
    pub phone_number: String,
    #[serde(flatten)]
    pub details: RoleDetails,
    pub occurred_at: DateTime<Utc>,
}

impl UserProvisioningRequested {
    pub fn new(
        saga_id: SagaId,
        user_id: UserId,
        email: impl Into<String>,
        fullname: impl Into<String>,
        phone_number: impl Into<String>,
        details: RoleDetails,
    ) -> Self {
        Self {
            saga_id,
            user_id,
            email: email.into(),
            fullname: fullname.into(),
            phone_number: phone_number.into(),
            details,
            occurred_at: Utc::now(),
        }
    }
}

/// Terminal success event, published on [`crate::topics::PROFILE_COMPLETED`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileProvisioningCompleted {
    pub saga_id: SagaId,
    pub user_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

impl ProfileProvisioningCompleted {
    pub fn new(saga_id: SagaId, user_id: UserId) -> Self {
        Self {
            saga_id,
            user_id,
            occurred_at: Utc::now(),
        }
    }
}

/// Terminal failure event, published on [`crate::topics::PROFILE_FAILED`].
///
/// Receipt triggers the compensating delete of the identity row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileProvisioningFailed {
    pub saga_id: SagaId,
    pub user_id: UserId,
    pub code: FailureCode,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

impl ProfileProvisioningFailed {
    pub fn new(saga_id: SagaId, user_id: UserId, code: FailureCode, reason: impl Into<String>) -> Self {
        Self {
            saga_id,
            user_id,
            code,
            reason: reason.into(),
            occurred_at: Utc::now(),
        }
    }
}

/// Saga-initiating event of the deletion saga, published on
/// [`crate::topics::USER_DELETE_REQUESTED`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDeletionRequested {
    pub saga_id: SagaId,
    pub user_id: UserId,
    pub role: Role,
    pub occurred_at: DateTime<Utc>,
}

impl UserDeletionRequested {
    pub fn new(saga_id: SagaId, user_id: UserId, role: Role) -> Self {
        Self {
            saga_id,
            user_id,
            role,
            occurred_at: Utc::now(),
        }
    }
}

/// Deletion success, published on [`crate::topics::DELETE_PROFILE_COMPLETED`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileDeletionCompleted {
    pub saga_id: SagaId,
    pub user_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

impl ProfileDeletionCompleted {
    pub fn new(saga_id: SagaId, user_id: UserId) -> Self {
        Self {
            saga_id,
            user_id,
            occurred_at: Utc::now(),
        }
    }
}

/// Deletion failure, published on [`crate::topics::USER_DELETE_FAILED`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileDeletionFailed {
    pub saga_id: SagaId,
    pub user_id: UserId,
    pub code: FailureCode,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

impl ProfileDeletionFailed {
    pub fn new(saga_id: SagaId, user_id: UserId, code: FailureCode, reason: impl Into<String>) -> Self {
        Self {
            saga_id,
            user_id,
            code,
            reason: reason.into(),
            occurred_at: Utc::now(),
        }
    }
}

/// Structured codes carried by terminal failure events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureCode {
    /// The referenced branch does not exist.
    BranchNotFound,
    /// The branch directory could not be reached and the precondition
    /// policy is fail-closed.
    BranchLookupFailed,
    /// The profile store rejected the aggregate.
    ProfileStoreRejected,
    /// The event payload could not be decoded.
    MalformedEvent,
    /// Anything without a more specific classification.
    Uncategorized,
}

impl FailureCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCode::BranchNotFound => "BRANCH_NOT_FOUND",
            FailureCode::BranchLookupFailed => "BRANCH_LOOKUP_FAILED",
            FailureCode::ProfileStoreRejected => "PROFILE_STORE_REJECTED",
            FailureCode::MalformedEvent => "MALFORMED_EVENT",
            FailureCode::Uncategorized => "UNCATEGORIZED",
        }
    }
}

impl std::fmt::Display for FailureCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn staff_details() -> RoleDetails {
        RoleDetails::Staff {
            branch_id: BranchId::new(1),
            identity_card: "ID-001".to_string(),
            hire_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            employment_type: EmploymentType::FullTime,
            pay_type: None,
            base_salary: Some(Money::from_cents(500_000)),
            insurance_salary: None,
            number_of_dependents: Some(2),
            hourly_rate: None,
            overtime_rate: None,
            business_role_ids: vec![BusinessRoleId::new(7)],
            proficiency_level: ProficiencyLevel::Intermediate,
        }
    }

    #[test]
    fn role_details_tagged_by_role() {
        let json = serde_json::to_value(staff_details()).unwrap();
        assert_eq!(json["role"], "STAFF");
        assert_eq!(json["branch_id"], 1);

        let back: RoleDetails = serde_json::from_value(json).unwrap();
        assert_eq!(back.role(), Role::Staff);
        assert_eq!(back.branch_id(), Some(BranchId::new(1)));
    }

    #[test]
    fn staff_defaults_apply_on_deserialization() {
        let json = serde_json::json!({
            "role": "STAFF",
            "branch_id": 3,
            "identity_card": "ID-9",
            "hire_date": "2025-01-15",
        });

        let details: RoleDetails = serde_json::from_value(json).unwrap();
        let RoleDetails::Staff {
            employment_type,
            pay_type,
            business_role_ids,
            proficiency_level,
            ..
        } = details
        else {
            panic!("expected staff details");
        };

        assert_eq!(employment_type, EmploymentType::FullTime);
        assert_eq!(pay_type, None);
        assert!(business_role_ids.is_empty());
        assert_eq!(proficiency_level, ProficiencyLevel::Intermediate);
    }

    #[test]
    fn creation_event_roundtrip_flattens_details() {
        let event = UserProvisioningRequested::new(
            SagaId::new(),
            UserId::new(),
            "a@x.com",
            "Ada",
            "555-0100",
            staff_details(),
        );

        let json = serde_json::to_value(&event).unwrap();
        // The role payload is flattened into the event body, not nested.
        assert_eq!(json["role"], "STAFF");
        assert_eq!(json["email"], "a@x.com");

        let back: UserProvisioningRequested = serde_json::from_value(json).unwrap();
        assert_eq!(back.saga_id, event.saga_id);
        assert_eq!(back.details.role(), Role::Staff);
    }

    #[test]
    fn customer_details_optional_fields() {
        let details = RoleDetails::Customer {
            dob: NaiveDate::from_ymd_opt(1990, 6, 15).unwrap(),
            avatar_url: None,
            bio: None,
        };
        assert_eq!(details.role(), Role::Customer);
        assert_eq!(details.branch_id(), None);
    }

    #[test]
    fn failure_code_wire_names() {
        assert_eq!(
            serde_json::to_string(&FailureCode::BranchNotFound).unwrap(),
            "\"BRANCH_NOT_FOUND\""
        );
        assert_eq!(FailureCode::Uncategorized.to_string(), "UNCATEGORIZED");
    }
}
