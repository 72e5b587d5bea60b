//! State expression grammar.
//!
//! Six families, tried in order; the first structural match wins and a
//! semantic failure inside a matched family is an error rather than a
//! fall-through to the next family:
//!
//! 1. `{state:TYPE}`                         basic, weight 1.0
//! 2. `{state:TYPE[W]}`                      basic with explicit weight
//! 3. `{state:intensity|T1[W1]|T2[W2]|...|}` independent intensities
//! 4. `{state:weighted|T1[W1]|...|}`         proportions, must sum to 1.0
//! 5. `{state:weighted:T1|T2[W]|...|}`       shorthand, remainder split evenly
//! 6. `{state:random!T1[W1]!...!}`           distribution, must sum to 1.0

use regex::Regex;
use std::sync::LazyLock;

use crate::error::ParseError;
use crate::types::{ChoffState, ExpressionType, StateComponent};

static BASIC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\{state:([^}\[|:!]+)\}").unwrap());
static BASIC_WEIGHT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\{state:([^}\[|:!]+)\[([-0-9.]+)\]\}").unwrap());
static INTENSITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\{state:intensity\|(.+)\|\}").unwrap());
static WEIGHTED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\{state:weighted\|(.+)\|\}").unwrap());
static SHORTHAND_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\{state:weighted:(.+)\|\}").unwrap());
static RANDOM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\{state:random!(.+)!\}").unwrap());

// Component slots: `type` or `type[weight]`, split on the family delimiter.
static PIPE_COMPONENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([^|\[\]]+)(?:\[([-0-9.]+)\])?").unwrap());
static BANG_COMPONENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([^!\[\]]+)(?:\[([-0-9.]+)\])?").unwrap());

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Parse a CHOFF state expression into its type and components.
pub fn parse_state_expression(expr: &str) -> Result<ChoffState, ParseError> {
    if expr.is_empty() {
        return Err(ParseError::Empty);
    }

    if let Some(caps) = BASIC_RE.captures(expr) {
        let state_type = caps[1].trim();
        if state_type.is_empty() {
            return Err(ParseError::EmptyStateType);
        }
        return Ok(ChoffState {
            expression_type: ExpressionType::Basic,
            components: vec![StateComponent {
                state_type: state_type.to_string(),
                value: 1.0,
            }],
        });
    }

    if let Some(caps) = BASIC_WEIGHT_RE.captures(expr) {
        let state_type = caps[1].trim();
        if state_type.is_empty() {
            return Err(ParseError::EmptyStateType);
        }
        let weight = parse_weight(&caps[2])?;
        return Ok(ChoffState {
            expression_type: ExpressionType::Basic,
            components: vec![StateComponent {
                state_type: state_type.to_string(),
                value: weight,
            }],
        });
    }

    if let Some(caps) = INTENSITY_RE.captures(expr) {
        let components = parse_components(&caps[1], &PIPE_COMPONENT_RE, true)?;
        if components.is_empty() {
            return Err(ParseError::NoComponents("intensity-based"));
        }
        return Ok(ChoffState {
            expression_type: ExpressionType::Intensity,
            components,
        });
    }

    if let Some(caps) = WEIGHTED_RE.captures(expr) {
        let components = parse_components(&caps[1], &PIPE_COMPONENT_RE, false)?;
        if components.is_empty() {
            return Err(ParseError::NoComponents("weighted"));
        }
        check_weight_sum(&components)?;
        return Ok(ChoffState {
            expression_type: ExpressionType::Weighted,
            components,
        });
    }

    if let Some(caps) = SHORTHAND_RE.captures(expr) {
        return parse_weighted_shorthand(&caps[1]);
    }

    if let Some(caps) = RANDOM_RE.captures(expr) {
        let components = parse_components(&caps[1], &BANG_COMPONENT_RE, false)?;
        if components.is_empty() {
            return Err(ParseError::NoComponents("random distribution"));
        }
        check_weight_sum(&components)?;
        return Ok(ChoffState {
            expression_type: ExpressionType::Random,
            components,
        });
    }

    Err(ParseError::InvalidStateExpression(expr.to_string()))
}

/// Scan component slots out of an expression body. Types are trimmed and
/// empty-after-trim slots skipped; a missing weight defaults to 1.0.
fn parse_components(
    body: &str,
    component_re: &Regex,
    reject_negative_explicitly: bool,
) -> Result<Vec<StateComponent>, ParseError> {
    let mut components = Vec::new();
    for caps in component_re.captures_iter(body) {
        let state_type = caps[1].trim();
        if state_type.is_empty() {
            continue;
        }
        let value = match caps.get(2) {
            Some(raw) => {
                if reject_negative_explicitly && raw.as_str().starts_with('-') {
                    return Err(ParseError::NegativeIntensity(raw.as_str().to_string()));
                }
                parse_weight(raw.as_str())?
            }
            None => 1.0,
        };
        components.push(StateComponent {
            state_type: state_type.to_string(),
            value,
        });
    }
    Ok(components)
}

/// The shorthand family: explicitly weighted components keep their weight,
/// the remainder (1.0 minus the explicit sum) is divided evenly across the
/// unweighted ones. Unlike the explicit weighted family there is no
/// sum-to-1.0 requirement when every component carries a weight, only the
/// <= 1.0 guard. Preserved as-is from the observed grammar.
fn parse_weighted_shorthand(body: &str) -> Result<ChoffState, ParseError> {
    let mut weighted = Vec::new();
    let mut unweighted_types = Vec::new();

    for caps in PIPE_COMPONENT_RE.captures_iter(body) {
        let state_type = caps[1].trim();
        if state_type.is_empty() {
            continue;
        }
        match caps.get(2) {
            Some(raw) => weighted.push(StateComponent {
                state_type: state_type.to_string(),
                value: parse_weight(raw.as_str())?,
            }),
            None => unweighted_types.push(state_type.to_string()),
        }
    }

    let explicit_total: f64 = weighted.iter().map(|c| c.value).sum();
    if explicit_total > 1.0 {
        return Err(ParseError::WeightsExceedOne(explicit_total));
    }

    let mut components = Vec::new();
    if !unweighted_types.is_empty() {
        let share = (1.0 - explicit_total) / unweighted_types.len() as f64;
        for state_type in unweighted_types {
            components.push(StateComponent {
                state_type,
                value: share,
            });
        }
    }
    components.extend(weighted);

    if components.is_empty() {
        return Err(ParseError::NoComponents("shorthand weighted"));
    }

    Ok(ChoffState {
        expression_type: ExpressionType::Weighted,
        components,
    })
}

fn parse_weight(raw: &str) -> Result<f64, ParseError> {
    let value: f64 = raw
        .parse()
        .map_err(|_| ParseError::InvalidWeight(raw.to_string()))?;
    if !(0.0..=1.0).contains(&value) {
        return Err(ParseError::WeightOutOfRange(value));
    }
    Ok(value)
}

fn check_weight_sum(components: &[StateComponent]) -> Result<(), ParseError> {
    let total: f64 = components.iter().map(|c| c.value).sum();
    if (total - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(ParseError::WeightSumMismatch(total));
    }
    Ok(())
}
