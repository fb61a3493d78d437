//! Identifier types shared across the identity and profile services.

mod types;

pub use types::{BranchId, BusinessRoleId, SagaId, UserId};
