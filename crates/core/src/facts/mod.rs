//! Module facts: the per-symbol binary facts supplied by the module analyzer.
//!
//! This module defines:
//! - `ModuleFactStore`: the lookup interface the call graph builder consumes.
//! - `ModuleFacts`: an in-memory store that also knows how to merge the facts
//!   of several modules without depending on merge order.
//! - Readers for the decompiler's artifacts (`dot`, `module`) and the
//!   per-object artifact layout (`layout`, `loader`).

pub mod dot;
pub mod layout;
pub mod loader;
pub mod module;

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use thiserror::Error;

pub use dot::{parse_call_graph_dot, CallGraphDot, FrequencyMode};
pub use layout::{discover_objects, ModuleLayout};
pub use loader::{load_module, sha256_hex, ArtifactFingerprint, LoadedModule};
pub use module::{FunctionFact, GlobalFact, ParamFact};

/// Errors raised while reading collaborator artifacts.
#[derive(Debug, Error)]
pub enum FactsError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid facts JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid address `{value}` for function {function}")]
    BadAddress { function: String, value: String },

    #[error("Call graph syntax error at line {line}: {message}")]
    Dot { line: usize, message: String },

    #[error("In {path}: {source}")]
    Artifact {
        path: PathBuf,
        #[source]
        source: Box<FactsError>,
    },
}

/// Lookup interface over the facts of one or more modules.
///
/// Names are canonical symbol names (no call-graph emitter prefix).
pub trait ModuleFactStore: Send + Sync {
    fn function(&self, name: &str) -> Option<&FunctionFact>;

    fn global(&self, name: &str) -> Option<&GlobalFact>;

    /// Functions whose bodies reference at least one global, sorted by name.
    fn referencing_functions(&self) -> Vec<&str>;

    /// Referenced globals of `function` with how many times each is referenced.
    fn global_references(&self, function: &str) -> Vec<(&str, u64)>;
}

/// In-memory fact store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleFacts {
    functions: BTreeMap<String, FunctionFact>,
    globals: BTreeMap<String, GlobalFact>,
    references: BTreeMap<String, BTreeMap<String, u64>>,
    constants: BTreeSet<String>,
}

impl ModuleFacts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a `<obj>.config.json` document.
    pub fn from_json_str(body: &str) -> Result<Self, FactsError> {
        let (functions, globals) = module::parse_module_json(body)?;
        let mut facts = Self::new();
        for f in functions {
            facts.add_function(f);
        }
        for g in globals {
            facts.add_global(g);
        }
        Ok(facts)
    }

    /// Apply a `<obj>.refs.json` sidecar: reference multisets and constness.
    pub fn apply_references_json(&mut self, body: &str) -> Result<(), FactsError> {
        let (references, constants) = module::parse_references_json(body)?;
        for (function, globals) in references {
            for global in globals {
                self.add_reference(&function, &global, 1);
            }
        }
        for name in constants {
            self.mark_constant(&name);
        }
        Ok(())
    }

    /// Mark a global read-only. Applies to facts merged before or after.
    pub fn mark_constant(&mut self, global: &str) {
        let name = global.to_string();
        match self.globals.get_mut(&name) {
            Some(fact) => fact.constant = true,
            None => tracing::debug!(global = %name, "constness recorded ahead of global facts"),
        }
        self.constants.insert(name);
    }

    /// Insert a function fact, reconciling with any existing fact of the same name.
    pub fn add_function(&mut self, fact: FunctionFact) {
        match self.functions.remove(&fact.name) {
            Some(existing) => {
                let kept = preferred_function(existing, fact);
                self.functions.insert(kept.name.clone(), kept);
            }
            None => {
                self.functions.insert(fact.name.clone(), fact);
            }
        }
    }

    /// Insert a global fact, reconciling with any existing fact of the same name.
    pub fn add_global(&mut self, mut fact: GlobalFact) {
        if self.constants.contains(&fact.name) {
            fact.constant = true;
        }
        match self.globals.remove(&fact.name) {
            Some(existing) => {
                let constant = existing.constant || fact.constant;
                let mut kept = existing.min(fact);
                kept.constant = constant;
                self.globals.insert(kept.name.clone(), kept);
            }
            None => {
                self.globals.insert(fact.name.clone(), fact);
            }
        }
    }

    /// Record `count` references from `function` to `global`.
    pub fn add_reference(&mut self, function: &str, global: &str, count: u64) {
        if count == 0 {
            return;
        }
        let slot = self
            .references
            .entry(function.to_string())
            .or_default()
            .entry(global.to_string())
            .or_insert(0);
        *slot = slot.saturating_add(count);
    }

    /// Fold another module's facts into this store.
    ///
    /// The result does not depend on the order modules are merged in:
    /// conflicting definitions are reconciled by a total order and reference
    /// counts add up.
    pub fn merge(&mut self, other: ModuleFacts) {
        for (_, f) in other.functions {
            self.add_function(f);
        }
        for (_, g) in other.globals {
            self.add_global(g);
        }
        for (function, globals) in other.references {
            for (global, count) in globals {
                self.add_reference(&function, &global, count);
            }
        }
        for name in other.constants {
            self.mark_constant(&name);
        }
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    pub fn global_count(&self) -> usize {
        self.globals.len()
    }

    pub fn functions(&self) -> impl Iterator<Item = &FunctionFact> {
        self.functions.values()
    }

    pub fn globals(&self) -> impl Iterator<Item = &GlobalFact> {
        self.globals.values()
    }
}

/// Larger code size wins; equal sizes fall back to the smaller record.
fn preferred_function(a: FunctionFact, b: FunctionFact) -> FunctionFact {
    match a.code_size().cmp(&b.code_size()) {
        std::cmp::Ordering::Greater => a,
        std::cmp::Ordering::Less => b,
        std::cmp::Ordering::Equal => a.min(b),
    }
}

impl ModuleFactStore for ModuleFacts {
    fn function(&self, name: &str) -> Option<&FunctionFact> {
        self.functions.get(name)
    }

    fn global(&self, name: &str) -> Option<&GlobalFact> {
        self.globals.get(name)
    }

    fn referencing_functions(&self) -> Vec<&str> {
        self.references
            .iter()
            .filter(|(_, globals)| !globals.is_empty())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    fn global_references(&self, function: &str) -> Vec<(&str, u64)> {
        self.references
            .get(function)
            .map(|globals| globals.iter().map(|(g, n)| (g.as_str(), *n)).collect())
            .unwrap_or_default()
    }
}
