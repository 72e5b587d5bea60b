//! Pattern tag grammar: dynamic `&pattern:TYPE|FLOW|` and static
//! `&status:TYPE|`.

use regex::Regex;
use std::sync::LazyLock;

use crate::error::ParseError;
use crate::types::ChoffPattern;

static PATTERN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^&pattern:([^|]+)\|([^|]+)\|").unwrap());
static STATUS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^&status:([^|]+)\|").unwrap());

/// Parse a CHOFF pattern tag.
pub fn parse_pattern(expr: &str) -> Result<ChoffPattern, ParseError> {
    if expr.is_empty() {
        return Err(ParseError::Empty);
    }

    if let Some(caps) = PATTERN_RE.captures(expr) {
        let pattern_type = caps[1].trim();
        let flow = caps[2].trim();

        if pattern_type.is_empty() {
            return Err(ParseError::EmptyPatternType);
        }
        if flow.is_empty() {
            return Err(ParseError::EmptyFlow);
        }

        return Ok(ChoffPattern {
            pattern_type: pattern_type.to_string(),
            flow: Some(flow.to_string()),
            is_status: false,
        });
    }

    if let Some(caps) = STATUS_RE.captures(expr) {
        let pattern_type = caps[1].trim();
        if pattern_type.is_empty() {
            return Err(ParseError::EmptyPatternType);
        }

        return Ok(ChoffPattern {
            pattern_type: pattern_type.to_string(),
            flow: None,
            is_status: true,
        });
    }

    Err(ParseError::InvalidPatternTag(expr.to_string()))
}
