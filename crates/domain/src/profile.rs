//! Profile aggregates built by the provisioning consumer.

use chrono::NaiveDate;
use common::{BranchId, BusinessRoleId, UserId};
use serde::{Deserialize, Serialize};

use crate::events::{RoleDetails, UserProvisioningRequested};
use crate::money::Money;
use crate::role::{EmploymentType, PayType, ProficiencyLevel, Role};

/// A business role assigned to a staff member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessRoleAssignment {
    pub business_role_id: BusinessRoleId,
    pub proficiency: ProficiencyLevel,
}

/// Profile of a branch manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerProfile {
    pub user_id: UserId,
    pub branch_id: BranchId,
    pub hire_date: NaiveDate,
    pub identity_card: String,
}

/// Profile of a staff member, including pay fields and role assignments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffProfile {
    pub user_id: UserId,
    pub branch_id: BranchId,
    pub identity_card: String,
    pub hire_date: NaiveDate,
    pub employment_type: EmploymentType,
    pub pay_type: PayType,
    pub base_salary: Option<Money>,
    pub insurance_salary: Option<Money>,
    pub number_of_dependents: Option<u32>,
    pub hourly_rate: Option<Money>,
    pub overtime_rate: Option<Money>,
    pub role_assignments: Vec<BusinessRoleAssignment>,
}

/// Profile of a customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerProfile {
    pub user_id: UserId,
    pub dob: NaiveDate,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
}

/// The role-specific profile aggregate, persisted with its associations in
/// one local transaction on the profile side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProfileAggregate {
    Manager(ManagerProfile),
    Staff(StaffProfile),
    Customer(CustomerProfile),
}

impl ProfileAggregate {
    /// Builds the aggregate for a creation request, applying the
    /// provisioning defaults: pay type derived from the employment type
    /// when absent, and the event's proficiency level applied to every
    /// business-role association.
    pub fn from_request(event: &UserProvisioningRequested) -> Self {
        match &event.details {
            RoleDetails::Manager {
                branch_id,
                hire_date,
                identity_card,
            } => ProfileAggregate::Manager(ManagerProfile {
                user_id: event.user_id,
                branch_id: *branch_id,
                hire_date: *hire_date,
                identity_card: identity_card.clone(),
            }),
            RoleDetails::Staff {
                branch_id,
                identity_card,
                hire_date,
                employment_type,
                pay_type,
                base_salary,
                insurance_salary,
                number_of_dependents,
                hourly_rate,
                overtime_rate,
                business_role_ids,
                proficiency_level,
            } => ProfileAggregate::Staff(StaffProfile {
                user_id: event.user_id,
                branch_id: *branch_id,
                identity_card: identity_card.clone(),
                hire_date: *hire_date,
                employment_type: *employment_type,
                pay_type: pay_type.unwrap_or_else(|| PayType::derived_from(*employment_type)),
                base_salary: *base_salary,
                insurance_salary: *insurance_salary,
                number_of_dependents: *number_of_dependents,
                hourly_rate: *hourly_rate,
                overtime_rate: *overtime_rate,
                role_assignments: business_role_ids
                    .iter()
                    .map(|id| BusinessRoleAssignment {
                        business_role_id: *id,
                        proficiency: *proficiency_level,
                    })
                    .collect(),
            }),
            RoleDetails::Customer {
                dob,
                avatar_url,
                bio,
            } => ProfileAggregate::Customer(CustomerProfile {
                user_id: event.user_id,
                dob: *dob,
                avatar_url: avatar_url.clone(),
                bio: bio.clone(),
            }),
        }
    }

    /// The user this profile belongs to.
    pub fn user_id(&self) -> UserId {
        match self {
            ProfileAggregate::Manager(p) => p.user_id,
            ProfileAggregate::Staff(p) => p.user_id,
            ProfileAggregate::Customer(p) => p.user_id,
        }
    }

    /// The role of this profile.
    pub fn role(&self) -> Role {
        match self {
            ProfileAggregate::Manager(_) => Role::Manager,
            ProfileAggregate::Staff(_) => Role::Staff,
            ProfileAggregate::Customer(_) => Role::Customer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::SagaId;

    fn staff_event(
        employment_type: EmploymentType,
        pay_type: Option<PayType>,
        business_role_ids: Vec<BusinessRoleId>,
    ) -> UserProvisioningRequested {
        UserProvisioningRequested::new(
            SagaId::new(),
            UserId::new(),
            "s@x.com",
            "Sam",
            "555-0101",
            RoleDetails::Staff {
                branch_id: BranchId::new(1),
                identity_card: "ID-7".to_string(),
                hire_date: NaiveDate::from_ymd_opt(2024, 9, 1).unwrap(),
                employment_type,
                pay_type,
                base_salary: Some(Money::from_cents(400_000)),
                insurance_salary: Some(Money::from_cents(350_000)),
                number_of_dependents: Some(1),
                hourly_rate: None,
                overtime_rate: None,
                business_role_ids,
                proficiency_level: ProficiencyLevel::Advanced,
            },
        )
    }

    #[test]
    fn staff_pay_type_derived_when_absent() {
        let full_time = staff_event(EmploymentType::FullTime, None, vec![]);
        let ProfileAggregate::Staff(profile) = ProfileAggregate::from_request(&full_time) else {
            panic!("expected staff profile");
        };
        assert_eq!(profile.pay_type, PayType::Salaried);

        let part_time = staff_event(EmploymentType::PartTime, None, vec![]);
        let ProfileAggregate::Staff(profile) = ProfileAggregate::from_request(&part_time) else {
            panic!("expected staff profile");
        };
        assert_eq!(profile.pay_type, PayType::Hourly);
    }

    #[test]
    fn staff_explicit_pay_type_wins() {
        let event = staff_event(EmploymentType::FullTime, Some(PayType::Hourly), vec![]);
        let ProfileAggregate::Staff(profile) = ProfileAggregate::from_request(&event) else {
            panic!("expected staff profile");
        };
        assert_eq!(profile.pay_type, PayType::Hourly);
    }

    #[test]
    fn staff_role_assignments_carry_event_proficiency() {
        let event = staff_event(
            EmploymentType::FullTime,
            None,
            vec![BusinessRoleId::new(4), BusinessRoleId::new(9)],
        );
        let ProfileAggregate::Staff(profile) = ProfileAggregate::from_request(&event) else {
            panic!("expected staff profile");
        };

        assert_eq!(profile.role_assignments.len(), 2);
        assert!(
            profile
                .role_assignments
                .iter()
                .all(|a| a.proficiency == ProficiencyLevel::Advanced)
        );
    }

    #[test]
    fn manager_profile_carries_event_user_id() {
        let event = UserProvisioningRequested::new(
            SagaId::new(),
            UserId::new(),
            "m@x.com",
            "Max",
            "555-0102",
            RoleDetails::Manager {
                branch_id: BranchId::new(2),
                hire_date: NaiveDate::from_ymd_opt(2023, 1, 2).unwrap(),
                identity_card: "ID-2".to_string(),
            },
        );

        let aggregate = ProfileAggregate::from_request(&event);
        assert_eq!(aggregate.user_id(), event.user_id);
        assert_eq!(aggregate.role(), Role::Manager);
    }
}
