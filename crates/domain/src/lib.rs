//! Domain layer for the cross-service user-provisioning saga.
//!
//! Creating a "rich" user spans two services: the identity service writes
//! the user row, the profile service writes a role-specific profile
//! aggregate. This crate holds the vocabulary both sides share: the closed
//! role variants, the saga events that travel between the services, the
//! topic names they travel on, and the profile aggregate the consumer
//! builds.

pub mod events;
pub mod money;
pub mod profile;
pub mod role;
pub mod topics;

pub use events::{
    FailureCode, ProfileDeletionCompleted, ProfileDeletionFailed, ProfileProvisioningCompleted,
    ProfileProvisioningFailed, RoleDetails, UserDeletionRequested, UserProvisioningRequested,
};
pub use money::Money;
pub use profile::{
    BusinessRoleAssignment, CustomerProfile, ManagerProfile, ProfileAggregate, StaffProfile,
};
pub use role::{EmploymentType, PayType, ProficiencyLevel, Role};
