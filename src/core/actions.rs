//! Order actions: the non-control-flow orders, plus the host command
//! seam.

use rand::Rng;
use rustc_hash::FxHashMap;

use crate::core::node::{Directive, ExecContext, Step};
use crate::core::template::TextTemplate;
use crate::schema::operator::SetOperator;
use crate::schema::order::{CallMode, Operand, Order, VariableRef, Wait, WaitTimer};
use crate::schema::value::{Value, ValueKind};

/// A host-provided order. Entered like any built-in order and tells the
/// executor how to proceed.
///
/// A handler that returns [`Step::Suspend`] parks the node; the host
/// resumes it later with `continue_at`.
pub trait CommandHandler {
    fn on_enter(&mut self, args: &[Value], ctx: &mut ExecContext<'_>) -> Step;
}

/// Registered command handlers, by command name.
pub type CommandRegistry = FxHashMap<String, Box<dyn CommandHandler>>;

pub fn set_variable(
    index: usize,
    operand: &Operand,
    op: SetOperator,
    ctx: &mut ExecContext<'_>,
) -> Step {
    if let Err(e) = operand.apply(op, ctx.variables) {
        ctx.diagnostics
            .configuration(ctx.node, Some(index), format!("set variable failed: {}", e));
    }
    Step::Continue
}

pub fn reset_variable(index: usize, reference: &VariableRef, ctx: &mut ExecContext<'_>) -> Step {
    match ctx.variables.variable(reference, None) {
        Ok(variable) => variable.reset(),
        Err(e) => ctx
            .diagnostics
            .configuration(ctx.node, Some(index), format!("reset failed: {}", e)),
    }
    Step::Continue
}

/// Roll `count` dice with `sides` faces and store the total.
pub fn roll_dice(
    index: usize,
    reference: &VariableRef,
    count: u32,
    sides: u32,
    ctx: &mut ExecContext<'_>,
) -> Step {
    if count == 0 || sides == 0 {
        ctx.diagnostics.configuration(
            ctx.node,
            Some(index),
            format!("cannot roll {}d{}", count, sides),
        );
        return Step::Continue;
    }

    let total: i64 = (0..count)
        .map(|_| i64::from(ctx.rng.gen_range(1..=sides)))
        .sum();

    // An undeclared global is created as a dice variable.
    let variable = ctx
        .variables
        .variable(reference, None)
        .or_else(|_| ctx.variables.variable(reference, Some(ValueKind::Dice)));
    let result = variable.map_err(|e| e.to_string()).and_then(|v| {
        let value = match v.kind() {
            ValueKind::Dice => Value::Dice(total),
            ValueKind::Integer => Value::Integer(total),
            other => return Err(format!("cannot store a dice roll in a {} variable", other)),
        };
        v.set(value).map_err(|e| e.to_string())
    });

    match result {
        Ok(()) => tracing::debug!(node = ctx.node, variable = %reference, total, "rolled dice"),
        Err(message) => ctx
            .diagnostics
            .configuration(ctx.node, Some(index), format!("roll failed: {}", message)),
    }
    Step::Continue
}

pub fn say(index: usize, speaker: Option<&str>, text: &str, ctx: &mut ExecContext<'_>) -> Step {
    let template = match TextTemplate::parse(text) {
        Ok(template) => template,
        Err(e) => {
            ctx.diagnostics
                .configuration(ctx.node, Some(index), e.to_string());
            return Step::Continue;
        }
    };

    let (text, missing) = template.render(ctx.variables);
    for key in missing {
        ctx.diagnostics.configuration(
            ctx.node,
            Some(index),
            format!("text refers to unknown variable '{}'", key),
        );
    }
    ctx.output.push(Directive::Say {
        node: ctx.node.to_string(),
        speaker: speaker.map(str::to_string),
        text,
    });
    Step::Continue
}

/// Arm the order's timer and suspend. A zero-length wait continues.
pub fn wait(order: &Order, wait: Wait) -> Step {
    let timer = match wait {
        Wait::Frames(0) => None,
        Wait::Frames(n) => Some(WaitTimer::Frames(n)),
        Wait::Seconds(s) if s <= 0.0 => None,
        Wait::Seconds(s) => Some(WaitTimer::Seconds(s)),
    };
    match timer {
        Some(timer) => {
            order.runtime.timer.set(Some(timer));
            Step::Suspend
        }
        None => Step::Continue,
    }
}

/// Queue `target` to start once the current run returns.
pub fn call(target: &str, mode: CallMode, ctx: &mut ExecContext<'_>) -> Step {
    tracing::debug!(node = ctx.node, callee = target, ?mode, "queued call");
    ctx.calls.push_back(target.to_string());
    match mode {
        CallMode::Stop => Step::Stop,
        CallMode::Continue => Step::Continue,
    }
}

pub fn command(
    index: usize,
    name: &str,
    args: &[Value],
    ctx: &mut ExecContext<'_>,
    commands: &mut CommandRegistry,
) -> Step {
    match commands.get_mut(name) {
        Some(handler) => handler.on_enter(args, ctx),
        None => {
            ctx.diagnostics.host(
                ctx.node,
                Some(index),
                format!("no handler registered for command '{}'", name),
            );
            Step::Continue
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::diagnostics::{DiagnosticKind, Diagnostics};
    use crate::core::node::NodeStatuses;
    use crate::core::variable::{GlobalEnvironment, VariableStore};
    use crate::schema::order::{Instruction, Scope};
    use crate::schema::story::VariableDecl;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::VecDeque;

    struct Fixture {
        variables: VariableStore,
        diagnostics: Diagnostics,
        output: Vec<Directive>,
        rng: StdRng,
        calls: VecDeque<String>,
        nodes: NodeStatuses,
    }

    impl Fixture {
        fn new(decls: &[VariableDecl]) -> Self {
            let mut variables = VariableStore::new(GlobalEnvironment::new());
            for decl in decls {
                variables.declare(decl);
            }
            Self {
                variables,
                diagnostics: Diagnostics::default(),
                output: Vec::new(),
                rng: StdRng::seed_from_u64(42),
                calls: VecDeque::new(),
                nodes: NodeStatuses::default(),
            }
        }

        fn ctx(&mut self) -> ExecContext<'_> {
            ExecContext {
                node: "actions",
                variables: &self.variables,
                nodes: &self.nodes,
                diagnostics: &mut self.diagnostics,
                output: &mut self.output,
                rng: &mut self.rng,
                calls: &mut self.calls,
                max_steps: 100,
            }
        }
    }

    struct Counter {
        hits: i64,
    }

    impl CommandHandler for Counter {
        fn on_enter(&mut self, args: &[Value], ctx: &mut ExecContext<'_>) -> Step {
            self.hits += args.iter().filter_map(Value::as_i64).sum::<i64>();
            ctx.output.push(Directive::Say {
                node: ctx.node.to_string(),
                speaker: None,
                text: format!("hits={}", self.hits),
            });
            Step::Continue
        }
    }

    #[test]
    fn roll_dice_stays_in_range() {
        let mut f = Fixture::new(&[VariableDecl::new("roll", Scope::Private, Value::Dice(0))]);
        for _ in 0..50 {
            roll_dice(0, &VariableRef::private("roll"), 2, 6, &mut f.ctx());
            let Value::Dice(total) = f.variables.get("roll", Scope::Private).unwrap() else {
                panic!("roll should stay a dice value");
            };
            assert!((2..=12).contains(&total));
        }
        assert!(f.diagnostics.is_empty());
    }

    #[test]
    fn roll_dice_creates_undeclared_global() {
        let mut f = Fixture::new(&[]);
        roll_dice(0, &VariableRef::global("luck"), 1, 20, &mut f.ctx());
        let value = f.variables.get("luck", Scope::Global).unwrap();
        assert_eq!(value.kind(), ValueKind::Dice);
    }

    #[test]
    fn roll_dice_rejects_zero_sides() {
        let mut f = Fixture::new(&[VariableDecl::new("roll", Scope::Private, Value::Dice(0))]);
        roll_dice(3, &VariableRef::private("roll"), 1, 0, &mut f.ctx());
        assert!(f.diagnostics.contains(DiagnosticKind::Configuration));
    }

    #[test]
    fn roll_dice_rejects_text_variable() {
        let mut f = Fixture::new(&[VariableDecl::new("name", Scope::Private, "Ada")]);
        roll_dice(0, &VariableRef::private("name"), 1, 6, &mut f.ctx());
        assert!(f.diagnostics.contains(DiagnosticKind::Configuration));
    }

    #[test]
    fn same_seed_same_rolls() {
        let decl = [VariableDecl::new("roll", Scope::Private, Value::Dice(0))];
        let mut a = Fixture::new(&decl);
        let mut b = Fixture::new(&decl);
        for _ in 0..5 {
            roll_dice(0, &VariableRef::private("roll"), 3, 8, &mut a.ctx());
            roll_dice(0, &VariableRef::private("roll"), 3, 8, &mut b.ctx());
            assert_eq!(
                a.variables.get("roll", Scope::Private).unwrap(),
                b.variables.get("roll", Scope::Private).unwrap()
            );
        }
    }

    #[test]
    fn say_interpolates_and_reports_missing() {
        let mut f = Fixture::new(&[VariableDecl::new("gold", Scope::Private, 12i64)]);
        say(0, Some("Mira"), "{gold} coins for {nobody}", &mut f.ctx());
        assert_eq!(
            f.output,
            vec![Directive::Say {
                node: "actions".into(),
                speaker: Some("Mira".into()),
                text: "12 coins for {nobody}".into(),
            }]
        );
        assert!(f.diagnostics.contains(DiagnosticKind::Configuration));
    }

    #[test]
    fn zero_wait_continues() {
        let order = Order::new(Instruction::Wait(Wait::Frames(0)));
        assert_eq!(wait(&order, Wait::Frames(0)), Step::Continue);
        assert_eq!(wait(&order, Wait::Seconds(0.0)), Step::Continue);
        assert_eq!(wait(&order, Wait::Frames(3)), Step::Suspend);
        assert_eq!(order.runtime.timer.get(), Some(WaitTimer::Frames(3)));
    }

    #[test]
    fn call_queues_target() {
        let mut f = Fixture::new(&[]);
        assert_eq!(call("cellar", CallMode::Continue, &mut f.ctx()), Step::Continue);
        assert_eq!(call("attic", CallMode::Stop, &mut f.ctx()), Step::Stop);
        assert_eq!(f.calls, VecDeque::from(vec!["cellar".to_string(), "attic".to_string()]));
    }

    #[test]
    fn command_dispatches_to_handler() {
        let mut f = Fixture::new(&[]);
        let mut commands = CommandRegistry::default();
        commands.insert("count".to_string(), Box::new(Counter { hits: 0 }));

        let args = [Value::Integer(2), Value::Integer(3)];
        let step = command(0, "count", &args, &mut f.ctx(), &mut commands);
        assert_eq!(step, Step::Continue);
        assert!(matches!(&f.output[0], Directive::Say { text, .. } if text == "hits=5"));
    }

    #[test]
    fn unknown_command_is_host_error() {
        let mut f = Fixture::new(&[]);
        let mut commands = CommandRegistry::default();
        let step = command(1, "shake_camera", &[], &mut f.ctx(), &mut commands);
        assert_eq!(step, Step::Continue);
        assert!(f.diagnostics.contains(DiagnosticKind::Host));
    }

    #[test]
    fn set_variable_type_error_is_reported() {
        let mut f = Fixture::new(&[VariableDecl::new("name", Scope::Private, "Ada")]);
        let operand = Operand::new(VariableRef::private("name"), 1i64);
        set_variable(0, &operand, SetOperator::Add, &mut f.ctx());
        assert!(f.diagnostics.contains(DiagnosticKind::Configuration));
        assert_eq!(
            f.variables.get("name", Scope::Private).unwrap(),
            Value::String("Ada".into())
        );
    }
}
