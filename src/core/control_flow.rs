//! Control flow: entry behaviour of `If`, `ElseIf`, `While`, `Else`,
//! `End`, `Break` and `Jump` orders.
//!
//! Blocks are scoped by indent: an order's partners are the orders at the
//! same indent that follow it, and a lower indent closes the scope.

use crate::core::diagnostics::Severity;
use crate::core::node::{ActiveOrder, ExecContext, Step};
use crate::core::program::{Branch, Program};
use crate::schema::order::Order;

/// Enter an `If`, `ElseIf` or `While` order.
pub fn enter_condition(
    program: &Program,
    order: &Order,
    previous: Option<&ActiveOrder>,
    ctx: &mut ExecContext<'_>,
) -> Step {
    let index = order.index();
    let Some(block) = order.instruction.condition() else {
        return Step::Continue;
    };

    // 1. Every expression must name a variable
    if !block.has_operands() {
        ctx.diagnostics.configuration(
            ctx.node,
            Some(index),
            format!("{:?} has a condition with no variable", order.tag()),
        );
        return Step::Continue;
    }

    // 2. Loops arm their End to jump back here
    if order.is_looping() {
        match program.find_matching_end(index) {
            Some(end) => program.arm_loop(end, index),
            None => {
                ctx.diagnostics.structural(
                    Severity::Error,
                    ctx.node,
                    Some(index),
                    "While has no matching End",
                );
                return Step::Continue;
            }
        }
    }

    // 3. An ElseIf is only evaluated straight after a sibling condition
    if order.is_else_if() && !follows_condition(order, previous) {
        let body_finished = previous.is_some_and(|p| p.indent > order.indent);
        if !body_finished {
            ctx.diagnostics.structural(
                Severity::Warning,
                ctx.node,
                Some(index),
                "ElseIf does not follow an If or ElseIf",
            );
        }
        return move_past_end(program, index, ctx);
    }

    // 4. Evaluate
    let node = ctx.node;
    let diagnostics = &mut *ctx.diagnostics;
    let passed = block.evaluate_with(ctx.variables, ctx.nodes, |i, e| {
        diagnostics.configuration(node, Some(index), format!("condition {}: {}", i, e));
    });

    // 5. True: enter the body
    if passed {
        return Step::Continue;
    }

    // 6. False: leave the loop, or find the next branch
    if order.is_looping() {
        return move_past_end(program, index, ctx);
    }
    match program.next_branch(index) {
        Some(Branch::Exit(exit)) => jump_past(program, exit),
        Some(Branch::ElseIf(next)) => Step::JumpTo(next),
        None => {
            ctx.diagnostics.structural(
                Severity::Error,
                ctx.node,
                Some(index),
                "no Else, ElseIf or End follows this condition",
            );
            Step::Stop
        }
    }
}

/// Reaching an `Else` means a branch body has finished.
pub fn enter_else(program: &Program, index: usize, ctx: &mut ExecContext<'_>) -> Step {
    match program.find_matching_end(index) {
        Some(end) => Step::JumpTo(end + 1),
        None => {
            ctx.diagnostics.structural(
                Severity::Error,
                ctx.node,
                Some(index),
                "Else has no matching End",
            );
            Step::Stop
        }
    }
}

pub fn enter_end(order: &Order) -> Step {
    match order.loop_back() {
        Some(head) => Step::JumpTo(head),
        None => Step::Continue,
    }
}

/// Leave the innermost enclosing loop.
pub fn enter_break(program: &Program, index: usize, ctx: &mut ExecContext<'_>) -> Step {
    let end = program
        .find_enclosing_loop(index)
        .and_then(|head| program.find_matching_end(head));
    match end {
        Some(end) => {
            program.disarm_loop(end);
            Step::JumpTo(end + 1)
        }
        None => {
            ctx.diagnostics.structural(
                Severity::Warning,
                ctx.node,
                Some(index),
                "Break is not inside a While",
            );
            Step::Continue
        }
    }
}

pub fn enter_jump(program: &Program, index: usize, label: &str, ctx: &mut ExecContext<'_>) -> Step {
    match program.find_label(label) {
        Some(target) => Step::JumpTo(target),
        None => {
            ctx.diagnostics.configuration(
                ctx.node,
                Some(index),
                format!("no label named '{}'", label),
            );
            Step::Continue
        }
    }
}

/// Whether the previous active order is a non-looping condition at the
/// same indent as `order`.
fn follows_condition(order: &Order, previous: Option<&ActiveOrder>) -> bool {
    previous.is_some_and(|p| {
        p.tag.is_condition() && !p.tag.is_looping() && p.indent == order.indent
    })
}

/// Disarm this block's End and continue after it; stop if there is none.
fn move_past_end(program: &Program, index: usize, ctx: &mut ExecContext<'_>) -> Step {
    match program.find_matching_end(index) {
        Some(end) => {
            program.disarm_loop(end);
            jump_past(program, end)
        }
        None => {
            ctx.diagnostics.structural(
                Severity::Error,
                ctx.node,
                Some(index),
                "block has no matching End; node stopped",
            );
            Step::Stop
        }
    }
}

fn jump_past(program: &Program, index: usize) -> Step {
    if index + 1 >= program.len() {
        Step::Stop
    } else {
        Step::JumpTo(index + 1)
    }
}
