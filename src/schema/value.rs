//! Variable values: the closed set of element kinds the engine understands.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The element kind of a [`Value`]. Every variable cell holds exactly one kind
/// for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Integer,
    Float,
    Boolean,
    String,
    Dice,
    Location,
    Node,
    Collection,
}

impl ValueKind {
    /// Lower-case display name, e.g. `"integer"`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::String => "string",
            Self::Dice => "dice",
            Self::Location => "location",
            Self::Node => "node",
            Self::Collection => "collection",
        }
    }

    /// Kinds that support the full set of ordering comparisons.
    pub fn is_ordered(&self) -> bool {
        matches!(self, Self::Integer | Self::Float | Self::Dice)
    }

    /// Kinds that support arithmetic set operators.
    pub fn is_numeric(&self) -> bool {
        self.is_ordered()
    }

    /// The zero value used when a cell of this kind is created without
    /// an explicit initial value.
    pub fn default_value(&self) -> Value {
        match self {
            Self::Integer => Value::Integer(0),
            Self::Float => Value::Float(0.0),
            Self::Boolean => Value::Boolean(false),
            Self::String => Value::String(String::new()),
            Self::Dice => Value::Dice(0),
            Self::Location => Value::Location(String::new()),
            Self::Node => Value::Node(String::new()),
            Self::Collection => Value::Collection(Vec::new()),
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A dynamic value stored in a variable cell or written as a literal
/// in an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    String(String),
    /// Total of the most recent dice roll.
    Dice(i64),
    /// Name of a location in the host's world.
    Location(String),
    /// Name of a node in the same engine.
    Node(String),
    Collection(Vec<String>),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Integer(_) => ValueKind::Integer,
            Self::Float(_) => ValueKind::Float,
            Self::Boolean(_) => ValueKind::Boolean,
            Self::String(_) => ValueKind::String,
            Self::Dice(_) => ValueKind::Dice,
            Self::Location(_) => ValueKind::Location,
            Self::Node(_) => ValueKind::Node,
            Self::Collection(_) => ValueKind::Collection,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(n) | Self::Dice(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(n) | Self::Dice(n) => write!(f, "{}", n),
            Self::Float(x) => write!(f, "{}", x),
            Self::Boolean(b) => write!(f, "{}", b),
            Self::String(s) | Self::Location(s) | Self::Node(s) => f.write_str(s),
            Self::Collection(items) => f.write_str(&items.join(", ")),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        assert_eq!(Value::Integer(3).kind(), ValueKind::Integer);
        assert_eq!(Value::Dice(4).kind(), ValueKind::Dice);
        assert_eq!(Value::Location("pier".into()).kind(), ValueKind::Location);
        assert_eq!(Value::Collection(vec![]).kind(), ValueKind::Collection);
    }

    #[test]
    fn default_value_has_same_kind() {
        let kinds = [
            ValueKind::Integer,
            ValueKind::Float,
            ValueKind::Boolean,
            ValueKind::String,
            ValueKind::Dice,
            ValueKind::Location,
            ValueKind::Node,
            ValueKind::Collection,
        ];
        for kind in kinds {
            assert_eq!(kind.default_value().kind(), kind);
        }
    }

    #[test]
    fn ordered_kinds() {
        assert!(ValueKind::Integer.is_ordered());
        assert!(ValueKind::Float.is_ordered());
        assert!(ValueKind::Dice.is_ordered());
        assert!(!ValueKind::String.is_ordered());
        assert!(!ValueKind::Boolean.is_ordered());
    }

    #[test]
    fn display_values() {
        assert_eq!(Value::Integer(12).to_string(), "12");
        assert_eq!(Value::Boolean(true).to_string(), "true");
        assert_eq!(Value::String("ok".into()).to_string(), "ok");
        assert_eq!(
            Value::Collection(vec!["lamp".into(), "key".into()]).to_string(),
            "lamp, key"
        );
    }

    #[test]
    fn value_ron_round_trip() {
        let v = Value::Collection(vec!["lamp".to_string()]);
        let s = ron::to_string(&v).unwrap();
        let back: Value = ron::from_str(&s).unwrap();
        assert_eq!(back, v);
    }
}
