//! Durable message persistence with a secondary CHOFF tag index.
//!
//! Tags are stored with their original position, so retrieval reproduces
//! the exact declared order including duplicates. Tag rows can never
//! outlive their message.

pub mod store;
pub mod types;

pub use store::{migrate, MessageStore, MessageStoreError};
pub use types::{Message, Speaker};
