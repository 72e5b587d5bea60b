//! Structural event validation, independent of storage. Runs before every
//! append so malformed events are rejected while the log stays clean.

use thiserror::Error;

use crate::types::{Event, EventBody, StateExpression};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("event id is required")]
    MissingEventId,

    #[error("timestamp is required")]
    MissingTimestamp,

    #[error("conversation id is required")]
    MissingConversationId,

    #[error("version is required")]
    MissingVersion,

    #[error("message content is required")]
    EmptyContent,

    #[error("expression type is required")]
    EmptyExpressionType,

    #[error("state component type cannot be empty")]
    EmptyComponentType,

    #[error("state component value out of range: {0}")]
    ComponentValueOutOfRange(f64),

    #[error("error type is required")]
    EmptyErrorType,

    #[error("error message is required")]
    EmptyErrorMessage,
}

/// Check an event's metadata and variant-specific fields.
pub fn validate(event: &Event) -> Result<(), ValidationError> {
    let meta = &event.metadata;
    if meta.event_id.is_nil() {
        return Err(ValidationError::MissingEventId);
    }
    if meta.timestamp <= 0 {
        return Err(ValidationError::MissingTimestamp);
    }
    if meta.conversation_id.is_empty() {
        return Err(ValidationError::MissingConversationId);
    }
    if meta.version.is_empty() {
        return Err(ValidationError::MissingVersion);
    }

    match &event.body {
        EventBody::Message { content, .. } => {
            if content.is_empty() {
                return Err(ValidationError::EmptyContent);
            }
        }
        EventBody::State {
            state_expression,
            expression_type,
            ..
        } => {
            if expression_type.is_empty() {
                return Err(ValidationError::EmptyExpressionType);
            }
            if let StateExpression::Components(components) = state_expression {
                for (state_type, value) in components {
                    if state_type.is_empty() {
                        return Err(ValidationError::EmptyComponentType);
                    }
                    if !(0.0..=1.0).contains(value) {
                        return Err(ValidationError::ComponentValueOutOfRange(*value));
                    }
                }
            }
        }
        EventBody::Error {
            error_type,
            message,
            ..
        } => {
            if error_type.is_empty() {
                return Err(ValidationError::EmptyErrorType);
            }
            if message.is_empty() {
                return Err(ValidationError::EmptyErrorMessage);
            }
        }
    }

    Ok(())
}
