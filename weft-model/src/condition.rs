//! Predicate trees for visibility, enablement, style rules and row rules.
//!
//! Conditions are data; evaluation lives in the runtime, which resolves
//! `field` operands against live store and state values.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One side of a comparison.
///
/// JSON shape: `{"field": "record.done"}` or `{"value": true}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    /// Dotted path resolved against the evaluation context.
    Field(String),
    /// Literal JSON value.
    Value(Value),
}

impl Operand {
    pub fn field(path: impl Into<String>) -> Self {
        Self::Field(path.into())
    }

    pub fn value(value: impl Into<Value>) -> Self {
        Self::Value(value.into())
    }
}

/// A condition tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Condition {
    Equals { left: Operand, right: Operand },
    NotEquals { left: Operand, right: Operand },
    GreaterThan { left: Operand, right: Operand },
    GreaterOrEqual { left: Operand, right: Operand },
    LessThan { left: Operand, right: Operand },
    LessOrEqual { left: Operand, right: Operand },
    /// String containment or array membership of `right` in `left`.
    Contains { left: Operand, right: Operand },
    IsEmpty { operand: Operand },
    IsNotEmpty { operand: Operand },
    And { conditions: Vec<Condition> },
    Or { conditions: Vec<Condition> },
    Not { condition: Box<Condition> },
    Always,
    Never,
}

impl Condition {
    /// `field == value`
    pub fn field_equals(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Equals {
            left: Operand::field(path),
            right: Operand::value(value),
        }
    }

    /// `field != value`
    pub fn field_not_equals(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::NotEquals {
            left: Operand::field(path),
            right: Operand::value(value),
        }
    }

    /// `field > value`
    pub fn field_greater_than(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::GreaterThan {
            left: Operand::field(path),
            right: Operand::value(value),
        }
    }

    /// `field < value`
    pub fn field_less_than(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::LessThan {
            left: Operand::field(path),
            right: Operand::value(value),
        }
    }

    pub fn field_is_empty(path: impl Into<String>) -> Self {
        Self::IsEmpty {
            operand: Operand::field(path),
        }
    }

    pub fn all(conditions: Vec<Condition>) -> Self {
        Self::And { conditions }
    }

    pub fn any(conditions: Vec<Condition>) -> Self {
        Self::Or { conditions }
    }

    pub fn negate(condition: Condition) -> Self {
        Self::Not {
            condition: Box::new(condition),
        }
    }
}
