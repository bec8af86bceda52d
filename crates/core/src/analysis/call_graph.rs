//! Weighted call graph construction.
//!
//! Structural call edges and module facts are fused into one directed graph of
//! functions and global variables. Node weights model code size; edge weights
//! model how much communication an edge would cost if it crossed a
//! compartment boundary.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analysis::type_cost::{TypeCostError, TypeCostEvaluator};
use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::facts::{ModuleFactStore, ModuleFacts};
use crate::model::{Edge, EdgeKind, Node, NodeKey, NodeKind, StructuralEdge, UNRESOLVED_CODE_SIZE};
use crate::services::partition::PartitionGraph;

/// Cost of one pointer level when the plan does not override it.
pub const DEFAULT_POINTER_UNIT_COST: u64 = 5;

/// Multiplier applied to a read-only global's weight on its reference edges.
pub const CONSTANT_GLOBAL_MULTIPLIER: u64 = 2;

/// What to do when a type descriptor cannot be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedTypePolicy {
    /// Use a zero cost and record a `MalformedType` warning.
    #[default]
    ZeroCost,
    /// Fail the build.
    Abort,
}

/// What to do with call-graph symbols that have no binary facts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedPolicy {
    /// Keep the node with the fallback code size.
    #[default]
    Fallback,
    /// Drop the node and every structural edge touching it.
    Remove,
}

/// Manual tuning of the cost model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Perturbations {
    pub nodes: BTreeMap<NodeKey, i64>,
    pub edges: BTreeMap<(NodeKey, NodeKey), i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOptions {
    pub pointer_unit_cost: u64,
    pub malformed_type_policy: MalformedTypePolicy,
    pub unresolved_policy: UnresolvedPolicy,
    pub perturbations: Perturbations,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            pointer_unit_cost: DEFAULT_POINTER_UNIT_COST,
            malformed_type_policy: MalformedTypePolicy::default(),
            unresolved_policy: UnresolvedPolicy::default(),
            perturbations: Perturbations::default(),
        }
    }
}

impl BuildOptions {
    pub fn with_pointer_unit_cost(mut self, cost: u64) -> Self {
        self.pointer_unit_cost = cost;
        self
    }
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Malformed type for {symbol}: {source}")]
    MalformedType {
        symbol: String,
        #[source]
        source: TypeCostError,
    },
}

/// Everything one module contributes to the merged graph.
#[derive(Debug, Clone, Default)]
pub struct ModuleInput {
    pub name: String,
    /// Nodes declared in the module's call graph, including isolated ones.
    pub nodes: Vec<String>,
    pub edges: Vec<StructuralEdge>,
    pub facts: ModuleFacts,
}

/// The finished, read-only weighted graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WeightedCallGraph {
    nodes: BTreeMap<NodeKey, Node>,
    edges: BTreeMap<(NodeKey, NodeKey), Edge>,
}

impl WeightedCallGraph {
    pub fn node(&self, key: &NodeKey) -> Option<&Node> {
        self.nodes.get(key)
    }

    pub fn edge(&self, from: &NodeKey, to: &NodeKey) -> Option<&Edge> {
        self.edges.get(&(from.clone(), to.clone()))
    }

    pub fn contains(&self, key: &NodeKey) -> bool {
        self.nodes.contains_key(key)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    pub fn node_keys(&self) -> impl Iterator<Item = &NodeKey> {
        self.nodes.keys()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn total_node_weight(&self) -> u64 {
        self.nodes.values().map(Node::weight).sum()
    }

    /// Copy the finalized weights onto the partitioner's input graph.
    pub fn partition_input(&self) -> PartitionGraph {
        PartitionGraph::from_call_graph(self)
    }

    /// Serializable snapshot of nodes and edges with their weights.
    pub fn report(&self) -> GraphReport {
        GraphReport {
            nodes: self
                .nodes
                .values()
                .map(|n| NodeReport {
                    name: n.key.name.clone(),
                    kind: n.key.kind,
                    code_size: n.code_size,
                    perturbation: n.perturbation,
                    weight: n.weight(),
                    unresolved: n.unresolved,
                })
                .collect(),
            edges: self
                .edges
                .values()
                .map(|e| EdgeReport {
                    from: e.from.to_string(),
                    to: e.to.to_string(),
                    kind: e.kind,
                    frequency: e.frequency,
                    param_size: e.param_size,
                    perturbation: e.perturbation,
                    weight: e.weight(),
                })
                .collect(),
            total_node_weight: self.total_node_weight(),
        }
    }

    /// Insert `key` unless present; a new node starts with `code_size`.
    fn ensure_node(&mut self, key: NodeKey, code_size: u64) -> &mut Node {
        self.nodes.entry(key.clone()).or_insert_with(|| Node::new(key, code_size))
    }

    /// Record one more observation of `from -> to`.
    ///
    /// A new edge takes `param_size` from `resolve`; an existing one only
    /// accumulates `frequency`, so `resolve` runs at most once per pair.
    fn observe_edge<E>(
        &mut self,
        from: &NodeKey,
        to: &NodeKey,
        kind: EdgeKind,
        frequency: u64,
        resolve: impl FnOnce(&Self) -> Result<u64, E>,
    ) -> Result<(), E> {
        let pair = (from.clone(), to.clone());
        if let Some(edge) = self.edges.get_mut(&pair) {
            edge.absorb(frequency);
            return Ok(());
        }
        let param_size = resolve(self)?;
        self.edges.insert(pair, Edge::new(from.clone(), to.clone(), kind, frequency, param_size));
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeReport {
    pub name: String,
    pub kind: NodeKind,
    pub code_size: u64,
    pub perturbation: i64,
    pub weight: u64,
    pub unresolved: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeReport {
    pub from: String,
    pub to: String,
    pub kind: EdgeKind,
    pub frequency: u64,
    pub param_size: u64,
    pub perturbation: i64,
    pub weight: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphReport {
    pub nodes: Vec<NodeReport>,
    pub edges: Vec<EdgeReport>,
    pub total_node_weight: u64,
}

/// Type costing with the configured malformed-type policy applied.
struct CostModel<'a> {
    evaluator: TypeCostEvaluator,
    policy: MalformedTypePolicy,
    diagnostics: &'a Diagnostics,
}

impl CostModel<'_> {
    fn cost(&self, symbol: &str, descriptor: &str) -> Result<u64, BuildError> {
        match self.evaluator.cost(descriptor) {
            Ok(cost) => Ok(cost),
            Err(source) => match self.policy {
                MalformedTypePolicy::Abort => {
                    Err(BuildError::MalformedType { symbol: symbol.to_string(), source })
                }
                MalformedTypePolicy::ZeroCost => {
                    self.diagnostics.warn(
                        DiagnosticKind::MalformedType,
                        symbol,
                        format!("{source}; using zero cost"),
                    );
                    Ok(0)
                }
            },
        }
    }
}

/// Build the weighted graph for a sequence of structural edges.
///
/// All names are canonical. `declared` lists call-graph nodes that may have
/// no edges. Repeated `(caller, callee)` pairs accumulate frequency;
/// everything else about an edge is resolved on first sight.
pub fn build_weighted_graph(
    declared: &[String],
    structural: &[StructuralEdge],
    facts: &dyn ModuleFactStore,
    options: &BuildOptions,
    diagnostics: &Diagnostics,
) -> Result<WeightedCallGraph, BuildError> {
    let costs = CostModel {
        evaluator: TypeCostEvaluator::new(options.pointer_unit_cost),
        policy: options.malformed_type_policy,
        diagnostics,
    };
    let mut graph = WeightedCallGraph::default();

    // 1. Function nodes with code sizes or the unresolved fallback.
    let mut names: BTreeSet<&str> = declared.iter().map(String::as_str).collect();
    for e in structural {
        names.insert(e.caller.as_str());
        names.insert(e.callee.as_str());
    }
    let mut removed: BTreeSet<&str> = BTreeSet::new();
    for name in names {
        let key = NodeKey::function(name);
        match facts.function(name) {
            Some(fact) => {
                graph.ensure_node(key, fact.code_size());
            }
            None => match options.unresolved_policy {
                UnresolvedPolicy::Fallback => {
                    diagnostics.warn(
                        DiagnosticKind::UnresolvedSymbol,
                        name,
                        format!(
                            "Call graph function {name} has no binary facts; using fallback code size {UNRESOLVED_CODE_SIZE}"
                        ),
                    );
                    graph.nodes.insert(key.clone(), Node::unresolved(key));
                }
                UnresolvedPolicy::Remove => {
                    diagnostics.warn(
                        DiagnosticKind::RemovedSymbol,
                        name,
                        format!("Call graph function {name} has no binary facts; removing it"),
                    );
                    removed.insert(name);
                }
            },
        }
    }
    apply_node_perturbations(&mut graph, options);

    // 2. Call edges; parameter cost resolved once per callee.
    let mut param_costs: BTreeMap<&str, u64> = BTreeMap::new();
    for e in structural {
        if removed.contains(e.caller.as_str()) || removed.contains(e.callee.as_str()) {
            continue;
        }
        let from = NodeKey::function(&e.caller);
        let to = NodeKey::function(&e.callee);
        graph.observe_edge(&from, &to, EdgeKind::Call, e.frequency, |_| {
            if let Some(cost) = param_costs.get(e.callee.as_str()) {
                return Ok(*cost);
            }
            let cost = parameter_cost(&costs, facts, &e.callee)?;
            param_costs.insert(e.callee.as_str(), cost);
            Ok::<u64, BuildError>(cost)
        })?;
    }

    // 3. Data references from function bodies to globals.
    for function in facts.referencing_functions() {
        let from = NodeKey::function(function);
        if !graph.contains(&from) {
            tracing::debug!(function, "skipping global references of function outside the call graph");
            continue;
        }
        for (global, count) in facts.global_references(function) {
            let Some(fact) = facts.global(global) else {
                diagnostics.warn(
                    DiagnosticKind::UnknownGlobal,
                    global,
                    format!("{function} references {global}, which has no global facts"),
                );
                continue;
            };
            let to = NodeKey::global(global);
            if !graph.contains(&to) {
                let size = costs.cost(global, &fact.ty)?;
                let node = graph.ensure_node(to.clone(), size);
                if let Some(bias) = options.perturbations.nodes.get(&to) {
                    node.perturbation = *bias;
                }
            }
            let multiplier = if fact.constant { CONSTANT_GLOBAL_MULTIPLIER } else { 1 };
            graph.observe_edge(&from, &to, EdgeKind::DataReference, 1, |g| {
                let weight = g.node(&to).map(Node::weight).unwrap_or(0);
                Ok::<u64, BuildError>(weight.saturating_mul(multiplier))
            })?;
            if count > 1 {
                graph.observe_edge(&from, &to, EdgeKind::DataReference, count - 1, |_| {
                    Ok::<u64, BuildError>(0)
                })?;
            }
        }
    }

    for ((from, to), bias) in &options.perturbations.edges {
        match graph.edges.get_mut(&(from.clone(), to.clone())) {
            Some(edge) => edge.perturbation = *bias,
            None => tracing::debug!(%from, %to, "perturbation for an edge that is not in the graph"),
        }
    }

    tracing::info!(
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        total_weight = graph.total_node_weight(),
        "weighted call graph built"
    );
    Ok(graph)
}

fn apply_node_perturbations(graph: &mut WeightedCallGraph, options: &BuildOptions) {
    for (key, bias) in &options.perturbations.nodes {
        if let Some(node) = graph.nodes.get_mut(key) {
            node.perturbation = *bias;
        }
    }
}

fn parameter_cost(
    costs: &CostModel<'_>,
    facts: &dyn ModuleFactStore,
    callee: &str,
) -> Result<u64, BuildError> {
    let Some(function) = facts.function(callee) else {
        return Ok(0);
    };
    let mut total = 0u64;
    for param in &function.parameters {
        let symbol = format!("{callee}:{}", param.name);
        total = total.saturating_add(costs.cost(&symbol, &param.ty)?);
    }
    Ok(total)
}

/// Order-independent accumulator over many modules.
///
/// Modules may be merged in any order (or from several workers behind one
/// lock); `finish` always produces the same graph.
#[derive(Debug, Clone, Default)]
pub struct CallGraphBuilder {
    options: BuildOptions,
    nodes: BTreeSet<String>,
    edges: BTreeMap<(String, String), u64>,
    facts: ModuleFacts,
    modules: BTreeSet<String>,
}

impl CallGraphBuilder {
    pub fn new(options: BuildOptions) -> Self {
        Self { options, ..Self::default() }
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    pub fn facts(&self) -> &ModuleFacts {
        &self.facts
    }

    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    pub fn add_node(&mut self, name: impl AsRef<str>) {
        self.nodes.insert(name.as_ref().to_string());
    }

    pub fn add_structural_edge(&mut self, edge: StructuralEdge) {
        let slot = self.edges.entry((edge.caller, edge.callee)).or_insert(0);
        *slot = slot.saturating_add(edge.frequency);
    }

    pub fn merge_module(&mut self, input: ModuleInput) {
        tracing::debug!(module = %input.name, edges = input.edges.len(), "merging module");
        self.modules.insert(input.name);
        for node in input.nodes {
            self.add_node(node);
        }
        for edge in input.edges {
            self.add_structural_edge(edge);
        }
        self.facts.merge(input.facts);
    }

    pub fn set_node_perturbation(&mut self, key: NodeKey, bias: i64) {
        self.options.perturbations.nodes.insert(key, bias);
    }

    pub fn set_edge_perturbation(&mut self, from: NodeKey, to: NodeKey, bias: i64) {
        self.options.perturbations.edges.insert((from, to), bias);
    }

    /// Resolve weights and produce the finished graph.
    pub fn finish(&self, diagnostics: &Diagnostics) -> Result<WeightedCallGraph, BuildError> {
        let declared: Vec<String> = self.nodes.iter().cloned().collect();
        let structural: Vec<StructuralEdge> = self
            .edges
            .iter()
            .map(|((caller, callee), frequency)| StructuralEdge {
                caller: caller.clone(),
                callee: callee.clone(),
                frequency: *frequency,
            })
            .collect();
        build_weighted_graph(&declared, &structural, &self.facts, &self.options, diagnostics)
    }
}
