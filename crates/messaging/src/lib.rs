//! Broker abstraction for the provisioning saga.
//!
//! The real broker is an external collaborator assumed to provide
//! at-least-once, per-partition-ordered delivery. This crate defines the
//! trait the publisher and consumers program against and an in-memory
//! implementation used for wiring and tests.

pub mod broker;
pub mod memory;

pub use broker::{BrokerError, Message, MessageBroker};
pub use memory::InMemoryBroker;
