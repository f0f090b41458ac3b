//! Node executor: runs one node's program as an iterative loop over
//! order indices.

use rand::rngs::StdRng;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

use crate::core::actions::{self, CommandRegistry};
use crate::core::control_flow;
use crate::core::diagnostics::{Diagnostics, Severity};
use crate::core::program::Program;
use crate::core::variable::VariableStore;
use crate::schema::order::{Instruction, Order, OrderTag, WaitTimer};

/// What the executor does after an order has been entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Enter the next order.
    Continue,
    /// Enter the order at this index.
    JumpTo(usize),
    /// Halt the node.
    Stop,
    /// Park the node until a tick or the host resumes it.
    Suspend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NodeStatus {
    #[default]
    Idle,
    Executing,
    Waiting,
    Complete,
}

/// Status of every node of an engine, by name. Conditions read it to ask
/// whether another node has finished.
pub type NodeStatuses = FxHashMap<String, NodeStatus>;

/// The last non-passive order a node entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveOrder {
    pub index: usize,
    pub indent: usize,
    pub tag: OrderTag,
}

impl ActiveOrder {
    pub fn of(order: &Order) -> Self {
        Self {
            index: order.index(),
            indent: order.indent,
            tag: order.tag(),
        }
    }
}

/// Output produced for the host while nodes run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Directive {
    Say {
        node: String,
        speaker: Option<String>,
        text: String,
    },
    NodeCompleted(String),
}

/// Everything an order may touch while it is entered.
pub struct ExecContext<'a> {
    /// Name of the node being run.
    pub node: &'a str,
    pub variables: &'a VariableStore,
    /// Other nodes' statuses as of the start of this run.
    pub nodes: &'a NodeStatuses,
    pub diagnostics: &'a mut Diagnostics,
    pub output: &'a mut Vec<Directive>,
    pub rng: &'a mut StdRng,
    pub(crate) calls: &'a mut VecDeque<String>,
    pub(crate) max_steps: usize,
}

/// A named program plus its execution pointer.
#[derive(Debug, Clone)]
pub struct Node {
    name: String,
    program: Program,
    status: NodeStatus,
    current: Option<usize>,
    previous_active: Option<ActiveOrder>,
}

impl Node {
    pub fn new(name: &str, program: Program) -> Self {
        Self {
            name: name.to_string(),
            program,
            status: NodeStatus::Idle,
            current: None,
            previous_active: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Mutable access to the program. Mutations re-index the program and
    /// drop memoised links.
    pub fn program_mut(&mut self) -> &mut Program {
        &mut self.program
    }

    pub fn status(&self) -> NodeStatus {
        self.status
    }

    pub fn is_complete(&self) -> bool {
        self.status == NodeStatus::Complete
    }

    /// Index of the order the node last entered.
    pub fn current(&self) -> Option<usize> {
        self.current
    }

    pub fn previous_active(&self) -> Option<ActiveOrder> {
        self.previous_active
    }

    /// Start from the first order. Returns `false` without doing anything
    /// if the node is already running or waiting.
    pub fn execute(&mut self, ctx: &mut ExecContext<'_>, commands: &mut CommandRegistry) -> bool {
        if matches!(self.status, NodeStatus::Executing | NodeStatus::Waiting) {
            ctx.diagnostics.structural(
                Severity::Warning,
                &self.name,
                self.current,
                "node is already running",
            );
            return false;
        }

        tracing::debug!(node = %self.name, "executing node");
        self.program.clear_runtime_state();
        self.current = None;
        self.previous_active = None;
        self.continue_at(Some(0), ctx, commands);
        true
    }

    /// Move the pointer to `index`, or one past the current order, and run
    /// until the node stops, suspends or runs off the end.
    pub fn continue_at(
        &mut self,
        index: Option<usize>,
        ctx: &mut ExecContext<'_>,
        commands: &mut CommandRegistry,
    ) -> NodeStatus {
        let mut next = match index {
            Some(i) => i,
            None => self.current.map_or(0, |c| c + 1),
        };
        self.status = NodeStatus::Executing;
        let mut steps = 0usize;

        loop {
            let Some(order) = self.program.get(next) else {
                self.finish(ctx);
                return self.status;
            };
            if !order.enabled {
                next += 1;
                continue;
            }

            steps += 1;
            if steps > ctx.max_steps {
                ctx.diagnostics.structural(
                    Severity::Error,
                    &self.name,
                    Some(next),
                    format!("entered more than {} orders in one run; node stopped", ctx.max_steps),
                );
                self.stop(ctx);
                return self.status;
            }

            self.current = Some(next);
            let step = enter_order(
                &self.program,
                order,
                self.previous_active.as_ref(),
                ctx,
                commands,
            );
            if !order.tag().is_passive() {
                self.previous_active = Some(ActiveOrder::of(order));
            }

            match step {
                Step::Continue => next += 1,
                Step::JumpTo(target) => next = target,
                Step::Stop => {
                    self.stop(ctx);
                    return self.status;
                }
                Step::Suspend => {
                    self.status = NodeStatus::Waiting;
                    return self.status;
                }
            }
        }
    }

    /// Halt immediately and mark the node complete. Nothing is rolled back.
    pub fn stop(&mut self, ctx: &mut ExecContext<'_>) {
        self.program.clear_runtime_state();
        self.finish(ctx);
    }

    fn finish(&mut self, ctx: &mut ExecContext<'_>) {
        let was_running = matches!(self.status, NodeStatus::Executing | NodeStatus::Waiting);
        self.status = NodeStatus::Complete;
        if was_running {
            tracing::debug!(node = %self.name, "node complete");
            ctx.output.push(Directive::NodeCompleted(self.name.clone()));
        }
    }

    /// Advance the timer of a pending `Wait`; resume once it has elapsed.
    pub fn tick(
        &mut self,
        elapsed: Duration,
        ctx: &mut ExecContext<'_>,
        commands: &mut CommandRegistry,
    ) -> NodeStatus {
        if self.status != NodeStatus::Waiting {
            return self.status;
        }
        let Some(order) = self.current.and_then(|i| self.program.get(i)) else {
            return self.status;
        };

        let remaining = match order.runtime.timer.get() {
            Some(WaitTimer::Frames(n)) if n > 1 => Some(WaitTimer::Frames(n - 1)),
            Some(WaitTimer::Seconds(s)) if s > elapsed.as_secs_f32() => {
                Some(WaitTimer::Seconds(s - elapsed.as_secs_f32()))
            }
            Some(_) => None,
            // Suspended by a host command; only the host resumes it.
            None => return self.status,
        };
        order.runtime.timer.set(remaining);

        if remaining.is_none() {
            return self.continue_at(None, ctx, commands);
        }
        self.status
    }
}

/// Dispatch one order by instruction kind.
fn enter_order(
    program: &Program,
    order: &Order,
    previous: Option<&ActiveOrder>,
    ctx: &mut ExecContext<'_>,
    commands: &mut CommandRegistry,
) -> Step {
    let index = order.index();
    match &order.instruction {
        Instruction::If(_) | Instruction::ElseIf(_) | Instruction::While(_) => {
            control_flow::enter_condition(program, order, previous, ctx)
        }
        Instruction::Else => control_flow::enter_else(program, index, ctx),
        Instruction::End => control_flow::enter_end(order),
        Instruction::Break => control_flow::enter_break(program, index, ctx),
        Instruction::Jump(label) => control_flow::enter_jump(program, index, label, ctx),
        Instruction::Comment(_) | Instruction::Label(_) => Step::Continue,
        Instruction::SetVariable { operand, op } => actions::set_variable(index, operand, *op, ctx),
        Instruction::ResetVariable(reference) => actions::reset_variable(index, reference, ctx),
        Instruction::RollDice {
            variable,
            count,
            sides,
        } => actions::roll_dice(index, variable, *count, *sides, ctx),
        Instruction::Say { speaker, text } => actions::say(index, speaker.as_deref(), text, ctx),
        Instruction::Wait(wait) => actions::wait(order, *wait),
        Instruction::Call { node, mode } => actions::call(node, *mode, ctx),
        Instruction::Command { name, args } => actions::command(index, name, args, ctx, commands),
        Instruction::Stop => Step::Stop,
    }
}
