//! Programs: the ordered order list of a node, with the indent-based
//! scans that pair control-flow orders with their partners.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::schema::order::{Instruction, Order, OrderRuntime, OrderTag};

/// Where a false condition sends execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    /// An `Else` or `End` at the same indent; execution resumes after it.
    Exit(usize),
    /// An `ElseIf` at the same indent, to be evaluated next.
    ElseIf(usize),
}

/// A structural problem found by [`Program::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructuralIssue {
    MissingEnd { index: usize, tag: OrderTag },
    OrphanedElse { index: usize },
    OrphanedElseIf { index: usize },
    UnmatchedEnd { index: usize },
    IndentJump { index: usize, from: usize, to: usize },
    UnknownLabel { index: usize, label: String },
    DuplicateLabel { index: usize, label: String },
    BreakOutsideLoop { index: usize },
}

impl StructuralIssue {
    pub fn index(&self) -> usize {
        match self {
            Self::MissingEnd { index, .. }
            | Self::OrphanedElse { index }
            | Self::OrphanedElseIf { index }
            | Self::UnmatchedEnd { index }
            | Self::IndentJump { index, .. }
            | Self::UnknownLabel { index, .. }
            | Self::DuplicateLabel { index, .. }
            | Self::BreakOutsideLoop { index } => *index,
        }
    }
}

impl fmt::Display for StructuralIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingEnd { index, tag } => {
                write!(f, "order {}: {:?} has no matching End", index, tag)
            }
            Self::OrphanedElse { index } => {
                write!(f, "order {}: Else does not follow an If or ElseIf", index)
            }
            Self::OrphanedElseIf { index } => {
                write!(f, "order {}: ElseIf does not follow an If or ElseIf", index)
            }
            Self::UnmatchedEnd { index } => {
                write!(f, "order {}: End does not close a block", index)
            }
            Self::IndentJump { index, from, to } => {
                write!(f, "order {}: indent jumps from {} to {}", index, from, to)
            }
            Self::UnknownLabel { index, label } => {
                write!(f, "order {}: Jump to unknown label '{}'", index, label)
            }
            Self::DuplicateLabel { index, label } => {
                write!(f, "order {}: label '{}' is defined more than once", index, label)
            }
            Self::BreakOutsideLoop { index } => {
                write!(f, "order {}: Break is not inside a While", index)
            }
        }
    }
}

/// An ordered, 0-indexed list of orders.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Order>", into = "Vec<Order>")]
pub struct Program {
    orders: Vec<Order>,
}

impl From<Vec<Order>> for Program {
    fn from(orders: Vec<Order>) -> Self {
        let mut program = Self { orders };
        program.reindex();
        program
    }
}

impl From<Program> for Vec<Order> {
    fn from(program: Program) -> Self {
        program.orders
    }
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Order> {
        self.orders.get(index)
    }

    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    pub fn iter(&self) -> impl Iterator<Item = &Order> {
        self.orders.iter()
    }

    pub fn push(&mut self, order: Order) {
        self.orders.push(order);
        self.reindex();
    }

    /// Insert at `index`, shifting later orders. An index past the end
    /// appends.
    pub fn insert(&mut self, index: usize, order: Order) {
        let index = index.min(self.orders.len());
        self.orders.insert(index, order);
        self.reindex();
    }

    pub fn remove(&mut self, index: usize) -> Option<Order> {
        if index >= self.orders.len() {
            return None;
        }
        let order = self.orders.remove(index);
        self.reindex();
        Some(order)
    }

    /// Renumber orders and drop all memoised links, loop arming and timers.
    fn reindex(&mut self) {
        for (i, order) in self.orders.iter_mut().enumerate() {
            order.index = i;
            order.runtime = OrderRuntime::default();
        }
    }

    /// The first enabled `End` after `from` at the same indent, or `None` if
    /// an order at a lower indent comes first. Memoised on the order at
    /// `from`.
    pub fn find_matching_end(&self, from: usize) -> Option<usize> {
        let order = self.orders.get(from)?;
        *order
            .runtime
            .matching_end
            .get_or_init(|| self.scan_matching_end(from))
    }

    fn scan_matching_end(&self, from: usize) -> Option<usize> {
        let indent = self.orders[from].indent;
        for order in self.orders[from + 1..].iter().filter(|o| o.enabled) {
            if order.indent < indent {
                return None;
            }
            if order.indent == indent && order.tag() == OrderTag::End {
                return Some(order.index);
            }
        }
        None
    }

    /// The next `Else`, `End` or `ElseIf` after `from` at the same indent,
    /// skipping disabled, comment and label orders.
    pub fn next_branch(&self, from: usize) -> Option<Branch> {
        let indent = self.orders.get(from)?.indent;
        self.orders[from + 1..]
            .iter()
            .filter(|o| o.enabled && !o.tag().is_passive() && o.indent == indent)
            .find_map(|o| match o.tag() {
                OrderTag::Else | OrderTag::End => Some(Branch::Exit(o.index)),
                OrderTag::ElseIf => Some(Branch::ElseIf(o.index)),
                _ => None,
            })
    }

    /// The innermost `While` whose body contains `from`.
    pub fn find_enclosing_loop(&self, from: usize) -> Option<usize> {
        let mut indent = self.orders.get(from)?.indent;
        for order in self.orders[..from].iter().rev() {
            if !order.enabled || order.indent >= indent {
                continue;
            }
            if order.is_looping() {
                if let Some(end) = self.find_matching_end(order.index) {
                    if end > from {
                        return Some(order.index);
                    }
                }
            }
            indent = order.indent;
        }
        None
    }

    /// Index of the first enabled label with this name.
    pub fn find_label(&self, name: &str) -> Option<usize> {
        self.orders
            .iter()
            .find(|o| o.enabled && matches!(&o.instruction, Instruction::Label(l) if l == name))
            .map(|o| o.index)
    }

    /// Disarm every loop and cancel every pending wait. Memoised links are
    /// kept.
    pub(crate) fn clear_runtime_state(&self) {
        for order in &self.orders {
            order.runtime.loop_back.set(None);
            order.runtime.timer.set(None);
        }
    }

    pub(crate) fn arm_loop(&self, end: usize, loop_back: usize) {
        if let Some(order) = self.orders.get(end) {
            order.runtime.loop_back.set(Some(loop_back));
        }
    }

    pub(crate) fn disarm_loop(&self, end: usize) {
        if let Some(order) = self.orders.get(end) {
            order.runtime.loop_back.set(None);
        }
    }

    /// The nearest enabled, non-passive order before `index` at the same
    /// indent, stopping at the first order with a lower indent.
    fn previous_sibling(&self, index: usize) -> Option<&Order> {
        let indent = self.orders[index].indent;
        for order in self.orders[..index].iter().rev() {
            if !order.enabled || order.tag().is_passive() || order.indent > indent {
                continue;
            }
            if order.indent < indent {
                return None;
            }
            return Some(order);
        }
        None
    }

    /// Report structural problems without executing anything.
    pub fn validate(&self) -> Vec<StructuralIssue> {
        let mut issues = Vec::new();
        let mut labels = FxHashSet::default();
        let mut previous_indent = 0usize;

        for order in self.orders.iter().filter(|o| o.enabled) {
            let index = order.index;

            if order.indent > previous_indent + 1 {
                issues.push(StructuralIssue::IndentJump {
                    index,
                    from: previous_indent,
                    to: order.indent,
                });
            }
            if !order.tag().is_passive() {
                previous_indent = order.indent;
            }

            let opens_chain = |o: &Order| matches!(o.tag(), OrderTag::If | OrderTag::ElseIf);
            match &order.instruction {
                Instruction::If(_) | Instruction::While(_) => {
                    if self.find_matching_end(index).is_none() {
                        issues.push(StructuralIssue::MissingEnd {
                            index,
                            tag: order.tag(),
                        });
                    }
                }
                Instruction::ElseIf(_) | Instruction::Else => {
                    if !self.previous_sibling(index).is_some_and(opens_chain) {
                        issues.push(if order.is_else_if() {
                            StructuralIssue::OrphanedElseIf { index }
                        } else {
                            StructuralIssue::OrphanedElse { index }
                        });
                    }
                    if self.find_matching_end(index).is_none() {
                        issues.push(StructuralIssue::MissingEnd {
                            index,
                            tag: order.tag(),
                        });
                    }
                }
                Instruction::End => {
                    let closes = self.previous_sibling(index).is_some_and(|o| {
                        matches!(
                            o.tag(),
                            OrderTag::If | OrderTag::ElseIf | OrderTag::Else | OrderTag::While
                        )
                    });
                    if !closes {
                        issues.push(StructuralIssue::UnmatchedEnd { index });
                    }
                }
                Instruction::Break => {
                    if self.find_enclosing_loop(index).is_none() {
                        issues.push(StructuralIssue::BreakOutsideLoop { index });
                    }
                }
                Instruction::Jump(label) => {
                    if self.find_label(label).is_none() {
                        issues.push(StructuralIssue::UnknownLabel {
                            index,
                            label: label.clone(),
                        });
                    }
                }
                Instruction::Label(label) => {
                    if !labels.insert(label.as_str()) {
                        issues.push(StructuralIssue::DuplicateLabel {
                            index,
                            label: label.clone(),
                        });
                    }
                }
                _ => {}
            }
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::order::ConditionBlock;

    fn cond() -> ConditionBlock {
        ConditionBlock::default()
    }

    fn say(text: &str) -> Instruction {
        Instruction::Say {
            speaker: None,
            text: text.to_string(),
        }
    }

    fn if_else_program() -> Program {
        Program::from(vec![
            Order::at(0, Instruction::If(cond())),
            Order::at(1, say("a")),
            Order::at(0, Instruction::ElseIf(cond())),
            Order::at(1, say("b")),
            Order::at(0, Instruction::Else),
            Order::at(1, say("c")),
            Order::at(0, Instruction::End),
            Order::at(0, say("after")),
        ])
    }

    #[test]
    fn from_vec_assigns_indices() {
        let program = if_else_program();
        for (i, order) in program.iter().enumerate() {
            assert_eq!(order.index(), i);
        }
    }

    #[test]
    fn matching_end_at_same_indent() {
        let program = if_else_program();
        assert_eq!(program.find_matching_end(0), Some(6));
        assert_eq!(program.find_matching_end(2), Some(6));
        assert_eq!(program.find_matching_end(4), Some(6));
    }

    #[test]
    fn lower_indent_means_no_end() {
        let program = Program::from(vec![
            Order::at(0, Instruction::If(cond())),
            Order::at(1, Instruction::While(cond())),
            Order::at(2, say("body")),
            Order::at(0, Instruction::End),
        ]);
        assert_eq!(program.find_matching_end(1), None);
        assert_eq!(program.find_matching_end(0), Some(3));
    }

    #[test]
    fn disabled_end_is_ignored() {
        let program = Program::from(vec![
            Order::at(0, Instruction::If(cond())),
            Order::at(0, Instruction::End).disabled(),
            Order::at(0, Instruction::End),
        ]);
        assert_eq!(program.find_matching_end(0), Some(2));
    }

    #[test]
    fn insert_invalidates_memoised_end() {
        let mut program = if_else_program();
        assert_eq!(program.find_matching_end(0), Some(6));
        program.insert(1, Order::at(1, say("new")));
        assert_eq!(program.find_matching_end(0), Some(7));
        assert_eq!(program.get(7).unwrap().tag(), OrderTag::End);
    }

    #[test]
    fn remove_reindexes() {
        let mut program = if_else_program();
        let removed = program.remove(1).unwrap();
        assert_eq!(removed.tag(), OrderTag::Say);
        assert_eq!(program.len(), 7);
        assert_eq!(program.find_matching_end(0), Some(5));
        assert!(program.remove(99).is_none());
    }

    #[test]
    fn next_branch_skips_comments_and_nested_orders() {
        let program = Program::from(vec![
            Order::at(0, Instruction::If(cond())),
            Order::at(1, Instruction::If(cond())),
            Order::at(1, Instruction::End),
            Order::at(0, Instruction::Comment("note".into())),
            Order::at(0, Instruction::ElseIf(cond())),
            Order::at(0, Instruction::End),
        ]);
        assert_eq!(program.next_branch(0), Some(Branch::ElseIf(4)));
        assert_eq!(program.next_branch(4), Some(Branch::Exit(5)));
        assert_eq!(program.next_branch(5), None);
    }

    #[test]
    fn enclosing_loop_found_through_nested_if() {
        let program = Program::from(vec![
            Order::at(0, Instruction::While(cond())),
            Order::at(1, Instruction::If(cond())),
            Order::at(2, Instruction::Break),
            Order::at(1, Instruction::End),
            Order::at(0, Instruction::End),
        ]);
        assert_eq!(program.find_enclosing_loop(2), Some(0));
        assert_eq!(program.find_enclosing_loop(0), None);
    }

    #[test]
    fn loop_arming() {
        let program = Program::from(vec![
            Order::at(0, Instruction::While(cond())),
            Order::at(0, Instruction::End),
        ]);
        program.arm_loop(1, 0);
        assert_eq!(program.get(1).unwrap().loop_back(), Some(0));
        program.disarm_loop(1);
        assert_eq!(program.get(1).unwrap().loop_back(), None);
    }

    #[test]
    fn find_label() {
        let program = Program::from(vec![
            Order::new(Instruction::Label("top".into())),
            Order::new(Instruction::Jump("top".into())),
        ]);
        assert_eq!(program.find_label("top"), Some(0));
        assert_eq!(program.find_label("bottom"), None);
    }

    #[test]
    fn valid_program_has_no_issues() {
        assert!(if_else_program().validate().is_empty());
    }

    #[test]
    fn validate_reports_structural_issues() {
        let program = Program::from(vec![
            Order::at(0, Instruction::While(cond())),
            Order::at(1, say("body")),
            Order::at(0, Instruction::ElseIf(cond())),
            Order::at(0, Instruction::Break),
            Order::at(0, Instruction::Jump("nowhere".into())),
            Order::at(2, say("deep")),
        ]);
        let issues = program.validate();
        assert!(issues.contains(&StructuralIssue::MissingEnd {
            index: 0,
            tag: OrderTag::While
        }));
        assert!(issues.contains(&StructuralIssue::OrphanedElseIf { index: 2 }));
        assert!(issues.contains(&StructuralIssue::BreakOutsideLoop { index: 3 }));
        assert!(issues.contains(&StructuralIssue::UnknownLabel {
            index: 4,
            label: "nowhere".into()
        }));
        assert!(issues.contains(&StructuralIssue::IndentJump {
            index: 5,
            from: 0,
            to: 2
        }));
    }

    #[test]
    fn validate_reports_unmatched_end_and_duplicate_label() {
        let program = Program::from(vec![
            Order::new(Instruction::Label("x".into())),
            Order::new(say("a")),
            Order::new(Instruction::End),
            Order::new(Instruction::Label("x".into())),
        ]);
        let issues = program.validate();
        assert!(issues.contains(&StructuralIssue::UnmatchedEnd { index: 2 }));
        assert!(issues.contains(&StructuralIssue::DuplicateLabel {
            index: 3,
            label: "x".into()
        }));
    }

    #[test]
    fn program_ron_round_trip_restores_indices() {
        let program = if_else_program();
        let text = ron::to_string(&program).unwrap();
        let back: Program = ron::from_str(&text).unwrap();
        assert_eq!(back.len(), program.len());
        assert_eq!(back.get(6).unwrap().index(), 6);
        assert_eq!(back.find_matching_end(0), Some(6));
    }
}
