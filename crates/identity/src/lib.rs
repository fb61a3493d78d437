//! Identity side of the user-provisioning saga.
//!
//! The identity service performs the speculative first write: the user row
//! and the saga-initiating outbox row commit in one local transaction.
//! A registry of in-process wait handles bridges the asynchronous saga
//! back to the blocked HTTP request, and a terminal-event listener applies
//! the compensating delete when the profile side reports failure.

pub mod coordinator;
pub mod error;
pub mod listener;
pub mod memory;
pub mod postgres;
pub mod service;
pub mod store;
pub mod user;

pub use coordinator::{SagaCoordinator, SagaOutcome, SagaWaitHandle, WaitResult};
pub use error::IdentityError;
pub use listener::{TerminalEventListener, TerminalEventStreams};
pub use memory::InMemoryIdentityStore;
pub use postgres::PostgresIdentityStore;
pub use service::{NewUserRequest, ProvisioningService, StartedSaga};
pub use store::IdentityStore;
pub use user::{IdentityUser, UserStatus};
