//! Orders: the instructions that make up a node's program.

use serde::{Deserialize, Serialize};
use std::cell::{Cell, OnceCell};
use std::fmt;

use super::operator::{Combinator, ComparisonOperator, SetOperator};
use super::value::Value;

/// Visibility of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Scope {
    /// Visible only to orders of the owning engine.
    #[default]
    Private,
    /// Owned by one engine but readable by others.
    Public,
    /// One shared cell per key across every engine using the same
    /// global environment.
    Global,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Private => f.write_str("private"),
            Self::Public => f.write_str("public"),
            Self::Global => f.write_str("global"),
        }
    }
}

/// Names a variable by key and scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VariableRef {
    pub key: String,
    #[serde(default)]
    pub scope: Scope,
}

impl VariableRef {
    pub fn new(key: &str, scope: Scope) -> Self {
        Self {
            key: key.to_string(),
            scope,
        }
    }

    pub fn private(key: &str) -> Self {
        Self::new(key, Scope::Private)
    }

    pub fn public(key: &str) -> Self {
        Self::new(key, Scope::Public)
    }

    pub fn global(key: &str) -> Self {
        Self::new(key, Scope::Global)
    }
}

impl fmt::Display for VariableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.scope, self.key)
    }
}

/// A variable paired with the data it is compared against or assigned from.
///
/// The data side is the current value of `source` when set, and `literal`
/// otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operand {
    #[serde(default)]
    pub variable: Option<VariableRef>,
    pub literal: Value,
    #[serde(default)]
    pub source: Option<VariableRef>,
}

impl Operand {
    pub fn new(variable: VariableRef, literal: impl Into<Value>) -> Self {
        Self {
            variable: Some(variable),
            literal: literal.into(),
            source: None,
        }
    }

    /// Take the data value from another variable instead of the literal.
    /// The literal is kept as the declared data kind.
    pub fn with_source(mut self, source: VariableRef) -> Self {
        self.source = Some(source);
        self
    }
}

/// One comparison in a condition list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionExpression {
    pub operand: Operand,
    pub op: ComparisonOperator,
}

impl ConditionExpression {
    pub fn new(variable: VariableRef, op: ComparisonOperator, literal: impl Into<Value>) -> Self {
        Self {
            operand: Operand::new(variable, literal),
            op,
        }
    }
}

/// The condition list carried by `If`, `ElseIf` and `While` orders.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConditionBlock {
    #[serde(default)]
    pub combinator: Combinator,
    #[serde(default)]
    pub conditions: Vec<ConditionExpression>,
}

impl ConditionBlock {
    pub fn all_of(conditions: Vec<ConditionExpression>) -> Self {
        Self {
            combinator: Combinator::AllOf,
            conditions,
        }
    }

    pub fn any_of(conditions: Vec<ConditionExpression>) -> Self {
        Self {
            combinator: Combinator::AnyOf,
            conditions,
        }
    }
}

/// A deferred continuation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Wait {
    /// Continue after this many host ticks.
    Frames(u32),
    /// Continue after this much host time has elapsed.
    Seconds(f32),
}

/// What the calling node does after a `Call` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CallMode {
    /// Stop the calling node, then start the target.
    #[default]
    Stop,
    /// Keep executing the calling node; the target starts afterwards.
    Continue,
}

/// The instruction an order executes when the node reaches it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Instruction {
    If(ConditionBlock),
    ElseIf(ConditionBlock),
    While(ConditionBlock),
    Else,
    End,
    Break,
    Comment(String),
    Label(String),
    Jump(String),
    SetVariable {
        operand: Operand,
        op: SetOperator,
    },
    ResetVariable(VariableRef),
    RollDice {
        variable: VariableRef,
        count: u32,
        sides: u32,
    },
    Say {
        #[serde(default)]
        speaker: Option<String>,
        text: String,
    },
    Wait(Wait),
    Call {
        node: String,
        #[serde(default)]
        mode: CallMode,
    },
    /// A host-provided order resolved by name at execution time.
    Command {
        name: String,
        #[serde(default)]
        args: Vec<Value>,
    },
    Stop,
}

/// Fieldless discriminant of an [`Instruction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderTag {
    If,
    ElseIf,
    While,
    Else,
    End,
    Break,
    Comment,
    Label,
    Jump,
    SetVariable,
    ResetVariable,
    RollDice,
    Say,
    Wait,
    Call,
    Command,
    Stop,
}

impl OrderTag {
    pub fn is_condition(&self) -> bool {
        matches!(self, Self::If | Self::ElseIf | Self::While)
    }

    pub fn is_looping(&self) -> bool {
        matches!(self, Self::While)
    }

    /// Orders that never become the "previous active order" and are
    /// skipped when scanning for branch partners.
    pub fn is_passive(&self) -> bool {
        matches!(self, Self::Comment | Self::Label)
    }
}

impl Instruction {
    pub fn tag(&self) -> OrderTag {
        match self {
            Self::If(_) => OrderTag::If,
            Self::ElseIf(_) => OrderTag::ElseIf,
            Self::While(_) => OrderTag::While,
            Self::Else => OrderTag::Else,
            Self::End => OrderTag::End,
            Self::Break => OrderTag::Break,
            Self::Comment(_) => OrderTag::Comment,
            Self::Label(_) => OrderTag::Label,
            Self::Jump(_) => OrderTag::Jump,
            Self::SetVariable { .. } => OrderTag::SetVariable,
            Self::ResetVariable(_) => OrderTag::ResetVariable,
            Self::RollDice { .. } => OrderTag::RollDice,
            Self::Say { .. } => OrderTag::Say,
            Self::Wait(_) => OrderTag::Wait,
            Self::Call { .. } => OrderTag::Call,
            Self::Command { .. } => OrderTag::Command,
            Self::Stop => OrderTag::Stop,
        }
    }

    /// The condition list of a condition-kind instruction.
    pub fn condition(&self) -> Option<&ConditionBlock> {
        match self {
            Self::If(block) | Self::ElseIf(block) | Self::While(block) => Some(block),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum WaitTimer {
    Frames(u32),
    Seconds(f32),
}

/// Per-order execution state. Never serialized.
#[derive(Debug, Clone, Default)]
pub(crate) struct OrderRuntime {
    /// Memoised index of this order's matching `End`.
    pub(crate) matching_end: OnceCell<Option<usize>>,
    /// Set on an `End` while its loop is armed.
    pub(crate) loop_back: Cell<Option<usize>>,
    /// Remaining time of an in-flight `Wait`.
    pub(crate) timer: Cell<Option<WaitTimer>>,
}

fn default_enabled() -> bool {
    true
}

/// One instruction in a node's program.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    #[serde(default)]
    pub indent: usize,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub instruction: Instruction,
    #[serde(skip)]
    pub(crate) index: usize,
    #[serde(skip)]
    pub(crate) runtime: OrderRuntime,
}

impl Order {
    pub fn new(instruction: Instruction) -> Self {
        Self {
            indent: 0,
            enabled: true,
            instruction,
            index: 0,
            runtime: OrderRuntime::default(),
        }
    }

    /// An order at the given indent level.
    pub fn at(indent: usize, instruction: Instruction) -> Self {
        Self {
            indent,
            ..Self::new(instruction)
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Position of this order in its program.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn tag(&self) -> OrderTag {
        self.instruction.tag()
    }

    pub fn is_looping(&self) -> bool {
        self.tag().is_looping()
    }

    pub fn is_else_if(&self) -> bool {
        self.tag() == OrderTag::ElseIf
    }

    /// Whether this `End` is currently armed to jump back to a loop head.
    pub fn loop_back(&self) -> Option<usize> {
        self.runtime.loop_back.get()
    }
}
