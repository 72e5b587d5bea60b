use thiserror::Error;

/// Why a CHOFF tag failed to parse. Always recoverable and caller-facing.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("empty expression")]
    Empty,

    #[error("state type cannot be empty")]
    EmptyStateType,

    #[error("invalid weight: {0}")]
    InvalidWeight(String),

    #[error("weight must be between 0.0 and 1.0, got {0}")]
    WeightOutOfRange(f64),

    #[error("intensity cannot be negative: {0}")]
    NegativeIntensity(String),

    #[error("no components found in {0} expression")]
    NoComponents(&'static str),

    #[error("weights must sum to 1.0, got {0}")]
    WeightSumMismatch(f64),

    #[error("weights exceed 1.0: {0}")]
    WeightsExceedOne(f64),

    #[error("context type cannot be empty")]
    EmptyContextType,

    #[error("pattern type cannot be empty")]
    EmptyPatternType,

    #[error("flow cannot be empty")]
    EmptyFlow,

    #[error("invalid state expression format: {0}")]
    InvalidStateExpression(String),

    #[error("invalid CHOFF context tag: {0}")]
    InvalidContextTag(String),

    #[error("invalid CHOFF pattern tag: {0}")]
    InvalidPatternTag(String),
}
