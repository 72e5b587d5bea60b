//! Event types. A tagged union with exhaustive matching at serialization
//! and dispatch sites, so adding a variant is a compile-time-checked change.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use choff_notation::{ChoffState, ExpressionType};

/// Schema version stamped into every event's metadata.
pub const SCHEMA_VERSION: &str = "1.0";

/// Common fields carried by every event. Stamped once at creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetadata {
    pub event_id: Uuid,
    /// Epoch seconds at creation time. Per-conversation ordering is by this
    /// value; no monotonicity is guaranteed across conversations.
    pub timestamp: i64,
    pub conversation_id: String,
    /// Opaque caller-supplied link between causally related events.
    pub correlation_id: Option<String>,
    pub version: String,
}

impl EventMetadata {
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now().timestamp(),
            conversation_id: conversation_id.into(),
            correlation_id: None,
            version: SCHEMA_VERSION.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

/// Wire form of a CHOFF state: a bare type name for basic states, a
/// type-to-value mapping for everything else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateExpression {
    Name(String),
    Components(BTreeMap<String, f64>),
}

/// Variant-specific event fields.
///
/// The serde tag becomes the `event_type` column in the events table; the
/// remaining fields serialize into the `payload` column.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventBody {
    Message {
        content: String,
        #[serde(default)]
        source: Option<String>,
    },
    State {
        state_expression: StateExpression,
        expression_type: String,
        #[serde(default)]
        context: Option<String>,
    },
    Error {
        error_type: String,
        message: String,
        severity: ErrorSeverity,
        #[serde(default)]
        stack_trace: Option<String>,
        #[serde(default)]
        context: Map<String, Value>,
    },
}

impl EventBody {
    /// The `event_type` discriminator as persisted.
    pub fn kind(&self) -> &'static str {
        match self {
            EventBody::Message { .. } => "message",
            EventBody::State { .. } => "state",
            EventBody::Error { .. } => "error",
        }
    }
}

/// An immutable conversation event. Equality is by event id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub metadata: EventMetadata,
    #[serde(flatten)]
    pub body: EventBody,
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.metadata.event_id == other.metadata.event_id
    }
}

impl Eq for Event {}

impl Event {
    pub fn message(
        conversation_id: impl Into<String>,
        content: impl Into<String>,
        source: Option<String>,
    ) -> Self {
        Self {
            metadata: EventMetadata::new(conversation_id),
            body: EventBody::Message {
                content: content.into(),
                source,
            },
        }
    }

    pub fn state(
        conversation_id: impl Into<String>,
        state_expression: StateExpression,
        expression_type: impl Into<String>,
        context: Option<String>,
    ) -> Self {
        Self {
            metadata: EventMetadata::new(conversation_id),
            body: EventBody::State {
                state_expression,
                expression_type: expression_type.into(),
                context,
            },
        }
    }

    pub fn error(
        conversation_id: impl Into<String>,
        error_type: impl Into<String>,
        message: impl Into<String>,
        severity: ErrorSeverity,
    ) -> Self {
        Self {
            metadata: EventMetadata::new(conversation_id),
            body: EventBody::Error {
                error_type: error_type.into(),
                message: message.into(),
                severity,
                stack_trace: None,
                context: Map::new(),
            },
        }
    }

    /// Convert Notation Engine output to the wire/storage form. A basic
    /// state with a single component collapses to the bare type-name form;
    /// every other expression serializes as a type-to-value mapping.
    pub fn state_from_choff(
        state: &ChoffState,
        conversation_id: impl Into<String>,
        context: Option<String>,
    ) -> Self {
        let expression = if state.expression_type == ExpressionType::Basic
            && state.components.len() == 1
        {
            StateExpression::Name(state.components[0].state_type.clone())
        } else {
            StateExpression::Components(
                state
                    .components
                    .iter()
                    .map(|c| (c.state_type.clone(), c.value))
                    .collect(),
            )
        };
        Self::state(
            conversation_id,
            expression,
            state.expression_type.as_str(),
            context,
        )
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.metadata.correlation_id = Some(correlation_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use choff_notation::parse_state_expression;

    #[test]
    fn equality_is_by_event_id() {
        let a = Event::message("conv-1", "hello", None);
        let b = Event::message("conv-1", "hello", None);
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn basic_state_collapses_to_name() {
        let state = parse_state_expression("{state:analytical}").unwrap();
        let event = Event::state_from_choff(&state, "conv-1", None);
        match event.body {
            EventBody::State {
                state_expression,
                expression_type,
                ..
            } => {
                assert_eq!(
                    state_expression,
                    StateExpression::Name("analytical".to_string())
                );
                assert_eq!(expression_type, "basic");
            }
            _ => panic!("expected a state event"),
        }
    }

    #[test]
    fn weighted_state_becomes_a_mapping() {
        let state =
            parse_state_expression("{state:weighted|analytical[0.6]|intuitive[0.4]|}").unwrap();
        let event = Event::state_from_choff(&state, "conv-1", Some("technical".to_string()));
        match event.body {
            EventBody::State {
                state_expression: StateExpression::Components(map),
                expression_type,
                context,
            } => {
                assert_eq!(map.get("analytical"), Some(&0.6));
                assert_eq!(map.get("intuitive"), Some(&0.4));
                assert_eq!(expression_type, "weighted");
                assert_eq!(context.as_deref(), Some("technical"));
            }
            _ => panic!("expected a mapping state event"),
        }
    }

    #[test]
    fn intensity_single_component_stays_a_mapping() {
        let state = parse_state_expression("{state:intensity|focused[1.0]|}").unwrap();
        let event = Event::state_from_choff(&state, "conv-1", None);
        match event.body {
            EventBody::State {
                state_expression, ..
            } => assert!(matches!(state_expression, StateExpression::Components(_))),
            _ => panic!("expected a state event"),
        }
    }

    #[test]
    fn correlation_id_builder() {
        let event = Event::message("conv-1", "hi", None).with_correlation_id("msg-42");
        assert_eq!(event.metadata.correlation_id.as_deref(), Some("msg-42"));
    }

    #[test]
    fn severity_serializes_uppercase() {
        assert_eq!(
            serde_json::to_string(&ErrorSeverity::Warning).unwrap(),
            "\"WARNING\""
        );
    }
}
