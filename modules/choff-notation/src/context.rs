//! Context tag grammar: `[context:TYPE]`.

use regex::Regex;
use std::sync::LazyLock;

use crate::error::ParseError;
use crate::types::ChoffContext;

static CONTEXT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[context:([^\]]+)\]").unwrap());

/// Parse a CHOFF context tag.
pub fn parse_context(expr: &str) -> Result<ChoffContext, ParseError> {
    if expr.is_empty() {
        return Err(ParseError::Empty);
    }

    let caps = CONTEXT_RE
        .captures(expr)
        .ok_or_else(|| ParseError::InvalidContextTag(expr.to_string()))?;

    let context_type = caps[1].trim();
    if context_type.is_empty() {
        return Err(ParseError::EmptyContextType);
    }

    Ok(ChoffContext {
        context_type: context_type.to_string(),
    })
}
