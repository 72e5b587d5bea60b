//! Conversation core: composes the message store, the event store, and the
//! in-process event bus into add/delete/query/state-transition operations
//! with event-sourcing semantics.
//!
//! Writes flow one direction: caller -> [`Conversation`] -> message store
//! write, event store append, bus publish. The bus never buffers state, it
//! only notifies.

pub mod bus;
pub mod config;
pub mod conversation;
pub mod error;
pub mod summarize;

pub use bus::{EventBus, EventHandler};
pub use config::{open_stores, Config};
pub use conversation::{
    Conversation, StateMap, StoredMessage, Summary, SummaryStatus, TransitionRecord,
};
pub use error::ConversationError;
pub use summarize::Summarize;
