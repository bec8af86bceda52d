//! Core data model for the weighted call graph.
//!
//! Nodes are functions or global variables, keyed by `(kind, name)` so a
//! function and a global that share a stripped symbol name never collapse
//! into one vertex. Edges are directed calls or data references; each
//! `(from, to)` pair owns exactly one edge whose frequency accumulates.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Prefix the call-graph emitter puts in front of every node name.
pub const NODE_NAME_PREFIX: &str = "Node_";

/// Code size assigned to call-graph symbols that have no binary facts.
pub const UNRESOLVED_CODE_SIZE: u64 = 8;

/// Strip the emitter prefix from a call-graph node name.
///
/// Applied once, by the DOT reader; every other layer takes names as given.
pub fn canonical_name(raw: &str) -> &str {
    raw.strip_prefix(NODE_NAME_PREFIX).unwrap_or(raw)
}

/// What a node stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Function,
    GlobalVariable,
}

impl NodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Function => "function",
            NodeKind::GlobalVariable => "global_variable",
        }
    }
}

/// Compound node identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeKey {
    pub kind: NodeKind,
    pub name: String,
}

impl NodeKey {
    /// Key for a function. `name` must already be canonical.
    pub fn function(name: impl AsRef<str>) -> Self {
        Self { kind: NodeKind::Function, name: name.as_ref().to_string() }
    }

    /// Key for a global variable.
    pub fn global(name: impl AsRef<str>) -> Self {
        Self { kind: NodeKind::GlobalVariable, name: name.as_ref().to_string() }
    }

    pub fn is_function(&self) -> bool {
        self.kind == NodeKind::Function
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            NodeKind::Function => write!(f, "{}", self.name),
            NodeKind::GlobalVariable => write!(f, "@{}", self.name),
        }
    }
}

/// A vertex of the weighted call graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub key: NodeKey,
    /// Bytes of compiled code (functions) or the type cost of the global.
    pub code_size: u64,
    /// Manual tuning bias; zero unless set explicitly.
    #[serde(default)]
    pub perturbation: i64,
    /// True when `code_size` is the unresolved-symbol fallback.
    #[serde(default)]
    pub unresolved: bool,
}

impl Node {
    pub fn new(key: NodeKey, code_size: u64) -> Self {
        Self { key, code_size, perturbation: 0, unresolved: false }
    }

    /// Node for a symbol that appears structurally but has no binary facts.
    pub fn unresolved(key: NodeKey) -> Self {
        Self { key, code_size: UNRESOLVED_CODE_SIZE, perturbation: 0, unresolved: true }
    }

    /// `code_size + perturbation`, never below zero.
    pub fn weight(&self) -> u64 {
        apply_bias(self.code_size, self.perturbation)
    }
}

/// Kind of relation an edge records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Call,
    DataReference,
}

/// A directed edge of the weighted call graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub from: NodeKey,
    pub to: NodeKey,
    pub kind: EdgeKind,
    /// Accumulated call/reference count.
    pub frequency: u64,
    /// Marshalling cost, resolved once when the edge is created.
    pub param_size: u64,
    #[serde(default)]
    pub perturbation: i64,
}

impl Edge {
    pub fn new(from: NodeKey, to: NodeKey, kind: EdgeKind, frequency: u64, param_size: u64) -> Self {
        Self { from, to, kind, frequency: frequency.max(1), param_size, perturbation: 0 }
    }

    /// Absorb another structural occurrence of the same `(from, to)` pair.
    pub fn absorb(&mut self, frequency: u64) {
        self.frequency = self.frequency.saturating_add(frequency);
    }

    /// `frequency + param_size + perturbation`, never below `frequency`.
    pub fn weight(&self) -> u64 {
        let cost = apply_bias(self.param_size, self.perturbation);
        self.frequency.saturating_add(cost)
    }
}

fn apply_bias(base: u64, bias: i64) -> u64 {
    if bias >= 0 {
        base.saturating_add(bias.unsigned_abs())
    } else {
        base.saturating_sub(bias.unsigned_abs())
    }
}

/// One caller/callee observation taken from a module's structural call graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuralEdge {
    pub caller: String,
    pub callee: String,
    /// Contribution of this observation to the merged edge's frequency.
    pub frequency: u64,
}

impl StructuralEdge {
    pub fn new(caller: impl AsRef<str>, callee: impl AsRef<str>, frequency: u64) -> Self {
        Self {
            caller: caller.as_ref().to_string(),
            callee: callee.as_ref().to_string(),
            frequency,
        }
    }
}
