//! Per-run diagnostics context.
//!
//! Every recoverable problem met while loading facts or building the graph is
//! recorded here and emitted as a `tracing` event. One `Diagnostics` value
//! belongs to one partitioning run, so concurrent runs never share records.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Classification of a recorded problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Call-graph symbol with no binary facts; fallback weight applied.
    UnresolvedSymbol,
    /// Type descriptor rejected by the type cost evaluator.
    MalformedType,
    /// Function body references a global that has no facts.
    UnknownGlobal,
    /// A module's facts file could not be found.
    MissingFacts,
    /// Unresolved symbol removed under the remove policy.
    RemovedSymbol,
}

impl DiagnosticKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DiagnosticKind::UnresolvedSymbol => "unresolved_symbol",
            DiagnosticKind::MalformedType => "malformed_type",
            DiagnosticKind::UnknownGlobal => "unknown_global",
            DiagnosticKind::MissingFacts => "missing_facts",
            DiagnosticKind::RemovedSymbol => "removed_symbol",
        }
    }
}

/// One recorded problem, always naming the offending symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub symbol: String,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct Diagnostics {
    records: Mutex<Vec<Diagnostic>>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a warning and emit it through `tracing`.
    pub fn warn(&self, kind: DiagnosticKind, symbol: impl Into<String>, message: impl Into<String>) {
        let diagnostic = Diagnostic { kind, symbol: symbol.into(), message: message.into() };
        tracing::warn!(
            kind = diagnostic.kind.as_str(),
            symbol = %diagnostic.symbol,
            "{}",
            diagnostic.message
        );
        self.records.lock().push(diagnostic);
    }

    pub fn records(&self) -> Vec<Diagnostic> {
        self.records.lock().clone()
    }

    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.records.lock().iter().filter(|d| d.kind == kind).count()
    }

    pub fn has(&self, kind: DiagnosticKind, symbol: &str) -> bool {
        self.records.lock().iter().any(|d| d.kind == kind && d.symbol == symbol)
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Consume the context, returning records sorted by kind and symbol.
    ///
    /// Workers record in completion order; sorting keeps manifests stable.
    pub fn into_sorted(self) -> Vec<Diagnostic> {
        let mut records = self.records.into_inner();
        records.sort_by(|a, b| {
            a.kind
                .as_str()
                .cmp(b.kind.as_str())
                .then_with(|| a.symbol.cmp(&b.symbol))
                .then_with(|| a.message.cmp(&b.message))
        });
        records
    }
}
