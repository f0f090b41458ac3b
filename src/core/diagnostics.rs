//! Diagnostics: the sink for recoverable errors raised while orders run.
//!
//! Every report is emitted as a `tracing` event and, up to a configured
//! limit, kept in memory so hosts and tests can inspect what went wrong.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Which part of the error taxonomy a diagnostic belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticKind {
    /// Missing operands, type mismatches, unsupported operators.
    Configuration,
    /// Missing `End`s, orphaned `ElseIf`s, runaway loops.
    Structural,
    /// Something the host was expected to provide is unavailable.
    Host,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub severity: Severity,
    pub node: String,
    pub order: Option<usize>,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        match self.order {
            Some(index) => write!(f, "{} [{}#{}]: {}", level, self.node, index, self.message),
            None => write!(f, "{} [{}]: {}", level, self.node, self.message),
        }
    }
}

const DEFAULT_LIMIT: usize = 256;

/// Bounded log of diagnostics, oldest entries dropped first.
#[derive(Debug, Clone)]
pub struct Diagnostics {
    entries: VecDeque<Diagnostic>,
    limit: usize,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::with_limit(DEFAULT_LIMIT)
    }
}

impl Diagnostics {
    /// A sink keeping at most `limit` entries. A limit of zero only
    /// forwards to `tracing`.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            limit,
        }
    }

    pub fn report(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Warning => tracing::warn!(
                node = %diagnostic.node,
                order = ?diagnostic.order,
                kind = ?diagnostic.kind,
                "{}",
                diagnostic.message
            ),
            Severity::Error => tracing::error!(
                node = %diagnostic.node,
                order = ?diagnostic.order,
                kind = ?diagnostic.kind,
                "{}",
                diagnostic.message
            ),
        }

        if self.limit == 0 {
            return;
        }
        while self.entries.len() >= self.limit {
            self.entries.pop_front();
        }
        self.entries.push_back(diagnostic);
    }

    fn push(
        &mut self,
        kind: DiagnosticKind,
        severity: Severity,
        node: &str,
        order: Option<usize>,
        message: String,
    ) {
        self.report(Diagnostic {
            kind,
            severity,
            node: node.to_string(),
            order,
            message,
        });
    }

    pub fn configuration(&mut self, node: &str, order: Option<usize>, message: impl Into<String>) {
        self.push(
            DiagnosticKind::Configuration,
            Severity::Error,
            node,
            order,
            message.into(),
        );
    }

    pub fn structural(
        &mut self,
        severity: Severity,
        node: &str,
        order: Option<usize>,
        message: impl Into<String>,
    ) {
        self.push(DiagnosticKind::Structural, severity, node, order, message.into());
    }

    pub fn host(&mut self, node: &str, order: Option<usize>, message: impl Into<String>) {
        self.push(DiagnosticKind::Host, Severity::Error, node, order, message.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether any recorded diagnostic has the given kind.
    pub fn contains(&self, kind: DiagnosticKind) -> bool {
        self.entries.iter().any(|d| d.kind == kind)
    }

    /// Drain all recorded diagnostics.
    pub fn take(&mut self) -> Vec<Diagnostic> {
        self.entries.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_reports() {
        let mut diags = Diagnostics::default();
        diags.configuration("intro", Some(3), "missing operand");
        diags.structural(Severity::Warning, "intro", None, "no End");

        assert_eq!(diags.len(), 2);
        assert!(diags.contains(DiagnosticKind::Configuration));
        assert!(diags.contains(DiagnosticKind::Structural));
        assert!(!diags.contains(DiagnosticKind::Host));
    }

    #[test]
    fn limit_drops_oldest() {
        let mut diags = Diagnostics::with_limit(2);
        diags.host("a", None, "first");
        diags.host("a", None, "second");
        diags.host("a", None, "third");

        let messages: Vec<_> = diags.iter().map(|d| d.message.as_str()).collect();
        assert_eq!(messages, vec!["second", "third"]);
    }

    #[test]
    fn zero_limit_keeps_nothing() {
        let mut diags = Diagnostics::with_limit(0);
        diags.host("a", None, "dropped");
        assert!(diags.is_empty());
    }

    #[test]
    fn take_drains() {
        let mut diags = Diagnostics::default();
        diags.configuration("a", Some(0), "x");
        let taken = diags.take();
        assert_eq!(taken.len(), 1);
        assert!(diags.is_empty());
    }

    #[test]
    fn display_includes_location() {
        let d = Diagnostic {
            kind: DiagnosticKind::Structural,
            severity: Severity::Error,
            node: "cellar".to_string(),
            order: Some(4),
            message: "While has no matching End".to_string(),
        };
        assert_eq!(d.to_string(), "error [cellar#4]: While has no matching End");
    }
}
