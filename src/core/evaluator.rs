//! Expression evaluation: comparison and assignment dispatched on the
//! element kind of the values involved.

use thiserror::Error;

use crate::core::node::{NodeStatus, NodeStatuses};
use crate::core::variable::{Variable, VariableError, VariableStore};
use crate::schema::operator::{Combinator, ComparisonOperator, SetOperator};
use crate::schema::order::{ConditionBlock, ConditionExpression, Operand};
use crate::schema::value::{Value, ValueKind};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error(transparent)]
    Variable(#[from] VariableError),
    #[error("no variable is set on the operand")]
    MissingVariable,
    #[error("cannot combine {left} with {right}")]
    TypeMismatch { left: ValueKind, right: ValueKind },
    #[error("{kind} values do not support comparison '{op}'")]
    UnsupportedComparison {
        kind: ValueKind,
        op: ComparisonOperator,
    },
    #[error("{kind} values do not support set operator '{op}'")]
    UnsupportedSet { kind: ValueKind, op: SetOperator },
    #[error("division by zero")]
    DivideByZero,
    #[error("numeric overflow applying '{0}'")]
    Overflow(SetOperator),
    #[error("float result of '{0}' is not a number")]
    NotANumber(SetOperator),
    #[error("no node named '{0}'")]
    UnknownNode(String),
}

/// Compare `lhs op rhs`.
///
/// Ordered kinds (integer, float, dice) accept every operator. All other
/// kinds accept only `Equals` and `NotEquals`. For collections, `Equals`
/// means `lhs` contains every item of `rhs`. `Completed` needs node state
/// and is rejected here; see [`ConditionExpression::evaluate`].
pub fn compare(lhs: &Value, op: ComparisonOperator, rhs: &Value) -> Result<bool, EvalError> {
    let kind = lhs.kind();
    if kind != rhs.kind() {
        return Err(EvalError::TypeMismatch {
            left: kind,
            right: rhs.kind(),
        });
    }
    if op.is_node_state() || (!kind.is_ordered() && !op.is_equality()) {
        return Err(EvalError::UnsupportedComparison { kind, op });
    }

    let result = match (lhs, rhs) {
        (Value::Integer(a), Value::Integer(b)) | (Value::Dice(a), Value::Dice(b)) => {
            compare_ordered(a, op, b)
        }
        (Value::Float(a), Value::Float(b)) => compare_float(*a, op, *b),
        (Value::Boolean(a), Value::Boolean(b)) => compare_equality(a == b, op),
        (Value::String(a), Value::String(b))
        | (Value::Location(a), Value::Location(b))
        | (Value::Node(a), Value::Node(b)) => compare_equality(a == b, op),
        (Value::Collection(a), Value::Collection(b)) => {
            compare_equality(b.iter().all(|item| a.contains(item)), op)
        }
        _ => {
            return Err(EvalError::TypeMismatch {
                left: kind,
                right: rhs.kind(),
            })
        }
    };
    Ok(result)
}

fn compare_ordered<T: PartialOrd>(a: &T, op: ComparisonOperator, b: &T) -> bool {
    match op {
        ComparisonOperator::Equals => a == b,
        ComparisonOperator::NotEquals => a != b,
        ComparisonOperator::LessThan => a < b,
        ComparisonOperator::GreaterThan => a > b,
        ComparisonOperator::LessThanOrEquals => a <= b,
        ComparisonOperator::GreaterThanOrEquals => a >= b,
        ComparisonOperator::Completed => false,
    }
}

/// Floats within `f64::EPSILON` are equal. Identical infinities are equal;
/// NaN equals nothing.
fn compare_float(a: f64, op: ComparisonOperator, b: f64) -> bool {
    let equal = a == b || (a - b).abs() <= f64::EPSILON;
    match op {
        ComparisonOperator::Equals => equal,
        ComparisonOperator::NotEquals => !equal,
        ComparisonOperator::LessThan => a < b && !equal,
        ComparisonOperator::GreaterThan => a > b && !equal,
        ComparisonOperator::LessThanOrEquals => a < b || equal,
        ComparisonOperator::GreaterThanOrEquals => a > b || equal,
        ComparisonOperator::Completed => false,
    }
}

// Only reached with Equals / NotEquals.
fn compare_equality(equal: bool, op: ComparisonOperator) -> bool {
    match op {
        ComparisonOperator::NotEquals => !equal,
        _ => equal,
    }
}

/// Compute the value `lhs op= rhs` would store.
///
/// `Assign` works for every kind. Numeric kinds support arithmetic and
/// `Negate`; booleans support `Negate`; everything else is assign-only.
/// A float variable never stores NaN, and arithmetic on finite floats
/// that overflows to infinity fails with `Overflow`.
pub fn apply(lhs: &Value, op: SetOperator, rhs: &Value) -> Result<Value, EvalError> {
    let kind = lhs.kind();
    if kind != rhs.kind() {
        return Err(EvalError::TypeMismatch {
            left: kind,
            right: rhs.kind(),
        });
    }
    if let Value::Float(x) = rhs {
        if x.is_nan() {
            return Err(EvalError::NotANumber(op));
        }
    }
    let arithmetic = !matches!(op, SetOperator::Assign | SetOperator::Negate);
    if arithmetic && !kind.is_numeric() {
        return Err(EvalError::UnsupportedSet { kind, op });
    }

    match (op, lhs, rhs) {
        (SetOperator::Assign, _, _) => Ok(rhs.clone()),
        (SetOperator::Negate, _, Value::Integer(n)) => n
            .checked_neg()
            .map(Value::Integer)
            .ok_or(EvalError::Overflow(op)),
        (SetOperator::Negate, _, Value::Dice(n)) => n
            .checked_neg()
            .map(Value::Dice)
            .ok_or(EvalError::Overflow(op)),
        (SetOperator::Negate, _, Value::Float(x)) => Ok(Value::Float(-x)),
        (SetOperator::Negate, _, Value::Boolean(b)) => Ok(Value::Boolean(!b)),
        (SetOperator::Negate, _, _) => Err(EvalError::UnsupportedSet { kind, op }),
        (_, Value::Integer(a), Value::Integer(b)) => integer_arithmetic(*a, op, *b).map(Value::Integer),
        (_, Value::Dice(a), Value::Dice(b)) => integer_arithmetic(*a, op, *b).map(Value::Dice),
        (_, Value::Float(a), Value::Float(b)) => float_arithmetic(*a, op, *b).map(Value::Float),
        _ => Err(EvalError::UnsupportedSet { kind, op }),
    }
}

fn integer_arithmetic(a: i64, op: SetOperator, b: i64) -> Result<i64, EvalError> {
    let result = match op {
        SetOperator::Add => a.checked_add(b),
        SetOperator::Subtract => a.checked_sub(b),
        SetOperator::Multiply => a.checked_mul(b),
        SetOperator::Divide if b == 0 => return Err(EvalError::DivideByZero),
        SetOperator::Divide => a.checked_div(b),
        SetOperator::Assign | SetOperator::Negate => Some(b),
    };
    result.ok_or(EvalError::Overflow(op))
}

fn float_arithmetic(a: f64, op: SetOperator, b: f64) -> Result<f64, EvalError> {
    let result = match op {
        SetOperator::Add => a + b,
        SetOperator::Subtract => a - b,
        SetOperator::Multiply => a * b,
        SetOperator::Divide if b == 0.0 => return Err(EvalError::DivideByZero),
        SetOperator::Divide => a / b,
        SetOperator::Assign | SetOperator::Negate => b,
    };
    if result.is_nan() {
        Err(EvalError::NotANumber(op))
    } else if result.is_infinite() && a.is_finite() && b.is_finite() {
        Err(EvalError::Overflow(op))
    } else {
        Ok(result)
    }
}

impl Operand {
    /// The variable being compared or assigned, checked against the
    /// literal's kind.
    pub fn target(&self, store: &VariableStore) -> Result<Variable, EvalError> {
        let reference = self.variable.as_ref().ok_or(EvalError::MissingVariable)?;
        Ok(store.variable(reference, Some(self.literal.kind()))?)
    }

    /// The data side: the source variable's value if one is set, the
    /// literal otherwise.
    pub fn data(&self, store: &VariableStore) -> Result<Value, EvalError> {
        match &self.source {
            Some(source) => Ok(store.variable(source, Some(self.literal.kind()))?.get()),
            None => Ok(self.literal.clone()),
        }
    }

    pub fn evaluate(&self, op: ComparisonOperator, store: &VariableStore) -> Result<bool, EvalError> {
        let target = self.target(store)?;
        let data = self.data(store)?;
        target.evaluate(op, &data)
    }

    pub fn apply(&self, op: SetOperator, store: &VariableStore) -> Result<(), EvalError> {
        let target = self.target(store)?;
        let data = self.data(store)?;
        target.apply(op, &data)
    }

    /// Whether the node named by the target variable is complete.
    pub fn node_completed(&self, store: &VariableStore, nodes: &NodeStatuses) -> Result<bool, EvalError> {
        let target = self.target(store)?;
        match target.get() {
            Value::Node(name) => match nodes.get(&name) {
                Some(status) => Ok(*status == NodeStatus::Complete),
                None => Err(EvalError::UnknownNode(name)),
            },
            other => Err(EvalError::UnsupportedComparison {
                kind: other.kind(),
                op: ComparisonOperator::Completed,
            }),
        }
    }
}

impl ConditionExpression {
    pub fn evaluate(&self, store: &VariableStore, nodes: &NodeStatuses) -> Result<bool, EvalError> {
        if self.op.is_node_state() {
            return self.operand.node_completed(store, nodes);
        }
        self.operand.evaluate(self.op, store)
    }
}

impl ConditionBlock {
    /// Whether every expression names a variable to compare.
    pub fn has_operands(&self) -> bool {
        self.conditions.iter().all(|c| c.operand.variable.is_some())
    }

    /// Combine the expressions with the block's combinator. An empty list
    /// is false. An expression that fails to evaluate counts as false and
    /// is passed to `on_error` with its position.
    pub fn evaluate_with<F>(&self, store: &VariableStore, nodes: &NodeStatuses, mut on_error: F) -> bool
    where
        F: FnMut(usize, EvalError),
    {
        if self.conditions.is_empty() {
            return false;
        }

        let mut results = self
            .conditions
            .iter()
            .enumerate()
            .map(|(i, condition)| match condition.evaluate(store, nodes) {
                Ok(result) => result,
                Err(e) => {
                    on_error(i, e);
                    false
                }
            });

        match self.combinator {
            Combinator::AnyOf => results.any(|r| r),
            Combinator::AllOf => results.all(|r| r),
        }
    }

    /// [`evaluate_with`](Self::evaluate_with), logging failures.
    pub fn evaluate(&self, store: &VariableStore, nodes: &NodeStatuses) -> bool {
        self.evaluate_with(store, nodes, |i, e| {
            tracing::warn!(condition = i, "condition treated as false: {}", e);
        })
    }
}
