use std::fmt;

/// Which of the grammar families a state expression came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExpressionType {
    Basic,
    Intensity,
    Weighted,
    Random,
}

impl ExpressionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpressionType::Basic => "basic",
            ExpressionType::Intensity => "intensity",
            ExpressionType::Weighted => "weighted",
            ExpressionType::Random => "random",
        }
    }
}

impl fmt::Display for ExpressionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Individual state component with its weight or intensity.
#[derive(Debug, Clone, PartialEq)]
pub struct StateComponent {
    pub state_type: String,
    pub value: f64,
}

/// A parsed CHOFF state expression.
///
/// Components keep declaration order; the first component is the "primary"
/// one for callers that only care about a single dominant state.
#[derive(Debug, Clone, PartialEq)]
pub struct ChoffState {
    pub expression_type: ExpressionType,
    pub components: Vec<StateComponent>,
}

impl ChoffState {
    /// The first declared state type. Parsing guarantees at least one
    /// component, so this only returns an empty string for a hand-built
    /// componentless value.
    pub fn primary_type(&self) -> &str {
        self.components
            .first()
            .map(|c| c.state_type.as_str())
            .unwrap_or("")
    }

    /// Weight of the first declared component, 1.0 when componentless.
    pub fn primary_weight(&self) -> f64 {
        self.components.first().map(|c| c.value).unwrap_or(1.0)
    }
}

/// Canonical notation form. Weighted output always uses the explicit
/// family, so a shorthand state whose weights do not sum to 1.0 has no
/// re-parsable rendering.
impl fmt::Display for ChoffState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.expression_type {
            ExpressionType::Basic => {
                let c = match self.components.first() {
                    Some(c) => c,
                    None => return write!(f, "{{state:}}"),
                };
                if (c.value - 1.0).abs() < 1e-9 {
                    write!(f, "{{state:{}}}", c.state_type)
                } else {
                    write!(f, "{{state:{}[{}]}}", c.state_type, c.value)
                }
            }
            ExpressionType::Intensity | ExpressionType::Weighted => {
                write!(f, "{{state:{}|", self.expression_type)?;
                for c in &self.components {
                    write!(f, "{}[{}]|", c.state_type, c.value)?;
                }
                write!(f, "}}")
            }
            ExpressionType::Random => {
                write!(f, "{{state:random!")?;
                for c in &self.components {
                    write!(f, "{}[{}]!", c.state_type, c.value)?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// A parsed `[context:TYPE]` tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoffContext {
    pub context_type: String,
}

impl fmt::Display for ChoffContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[context:{}]", self.context_type)
    }
}

/// A parsed pattern tag: `&pattern:TYPE|FLOW|` or `&status:TYPE|`.
///
/// `flow` is `Some` exactly when `is_status` is false.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoffPattern {
    pub pattern_type: String,
    pub flow: Option<String>,
    pub is_status: bool,
}

impl fmt::Display for ChoffPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_status {
            write!(f, "&status:{}|", self.pattern_type)
        } else {
            write!(
                f,
                "&pattern:{}|{}|",
                self.pattern_type,
                self.flow.as_deref().unwrap_or("")
            )
        }
    }
}
