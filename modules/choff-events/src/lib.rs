//! Typed conversation events and the append-only event store.
//!
//! Events are immutable facts: a message arrived, the CHOFF state changed,
//! an error occurred. The store is an append-only SQLite log keyed by
//! conversation; corrections are expressed as new events, never updates.

pub mod store;
pub mod types;
pub mod validate;

pub use store::{migrate, EventStore, EventStoreError};
pub use types::{ErrorSeverity, Event, EventBody, EventMetadata, StateExpression, SCHEMA_VERSION};
pub use validate::{validate, ValidationError};
