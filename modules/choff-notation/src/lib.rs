//! CHOFF notation engine: parsers for state, context, and pattern tags.
//!
//! Pure functions, no I/O. Malformed input is always a [`ParseError`],
//! never a panic. The accepted grammars are the wire format for any caller
//! embedding CHOFF tags in message content or system prompts.

pub mod context;
pub mod error;
pub mod pattern;
pub mod state;
pub mod types;

pub use context::parse_context;
pub use error::ParseError;
pub use pattern::parse_pattern;
pub use state::parse_state_expression;
pub use types::{ChoffContext, ChoffPattern, ChoffState, ExpressionType, StateComponent};
