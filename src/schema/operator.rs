use serde::{Deserialize, Serialize};
use std::fmt;

/// Comparison operators used by condition expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComparisonOperator {
    #[serde(alias = "==", alias = "equals")]
    Equals,
    #[serde(alias = "!=", alias = "not_equals")]
    NotEquals,
    #[serde(alias = "<", alias = "less_than")]
    LessThan,
    #[serde(alias = ">", alias = "greater_than")]
    GreaterThan,
    #[serde(alias = "<=", alias = "less_than_or_equals")]
    LessThanOrEquals,
    #[serde(alias = ">=", alias = "greater_than_or_equals")]
    GreaterThanOrEquals,
    /// The node named by a `Node` variable has finished running. The data
    /// side only fixes the kind.
    #[serde(alias = "completed")]
    Completed,
}

impl ComparisonOperator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Equals => "==",
            Self::NotEquals => "!=",
            Self::LessThan => "<",
            Self::GreaterThan => ">",
            Self::LessThanOrEquals => "<=",
            Self::GreaterThanOrEquals => ">=",
            Self::Completed => "completed",
        }
    }

    /// Operators that read node state rather than comparing two values.
    pub fn is_node_state(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// `Equals` and `NotEquals`: the only operators equality kinds accept.
    pub fn is_equality(&self) -> bool {
        matches!(self, Self::Equals | Self::NotEquals)
    }
}

impl fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Operators for writing a value into a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SetOperator {
    #[serde(alias = "=", alias = "assign")]
    Assign,
    /// Stores the negation of the data value (`!b` or `-n`).
    #[serde(alias = "=!", alias = "negate")]
    Negate,
    #[serde(alias = "+=", alias = "add")]
    Add,
    #[serde(alias = "-=", alias = "subtract")]
    Subtract,
    #[serde(alias = "*=", alias = "multiply")]
    Multiply,
    #[serde(alias = "/=", alias = "divide")]
    Divide,
}

impl SetOperator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Assign => "=",
            Self::Negate => "=!",
            Self::Add => "+=",
            Self::Subtract => "-=",
            Self::Multiply => "*=",
            Self::Divide => "/=",
        }
    }
}

impl fmt::Display for SetOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// How the results of a condition list are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Combinator {
    /// Logical OR over all conditions.
    #[serde(alias = "or", alias = "any_of")]
    AnyOf,
    /// Logical AND over all conditions.
    #[default]
    #[serde(alias = "and", alias = "all_of")]
    AllOf,
}
