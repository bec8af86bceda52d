//! Partitioner contract: the graph an oracle sees, its result, and the
//! registry and timeout wrapper the pipeline drives it through.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analysis::call_graph::WeightedCallGraph;
use crate::model::NodeKey;
use crate::services::oracles::{AutoOracle, ExactOracle, GreedyOracle};

/// Allowed overshoot of a part's weight over `total / k` when none is configured.
pub const DEFAULT_IMBALANCE: f64 = 0.30;

#[derive(Debug, Error)]
pub enum PartitionError {
    #[error("Invalid partition count {k} for a graph with {nodes} nodes")]
    InvalidPartitionCount { k: usize, nodes: usize },

    #[error("Cannot partition an empty graph")]
    EmptyGraph,

    #[error("Partitioner did not finish within {timeout:?}")]
    PartitionTimeout { timeout: Duration },

    #[error("Partitioner returned an invalid assignment: {0}")]
    InvalidAssignment(String),

    #[error("Unknown partitioner `{name}` (available: {})", available.join(", "))]
    UnknownOracle { name: String, available: Vec<String> },

    #[error("Partitioner `{oracle}` cannot handle {nodes} nodes (limit {limit})")]
    TooLarge { oracle: &'static str, nodes: usize, limit: usize },

    #[error("Partitioner failed: {0}")]
    OracleFailed(String),
}

/// A vertex as the partitioner sees it: identity plus an integer weight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionVertex {
    pub key: NodeKey,
    pub weight: u64,
}

/// Undirected, integer-weighted input graph for partitioners.
///
/// Vertex `i` is the `i`-th node key in sorted order. Antiparallel call edges
/// fold into one undirected edge carrying the sum of their weights; self-loops
/// are dropped because they can never be cut.
#[derive(Debug, Clone, Default)]
pub struct PartitionGraph {
    graph: UnGraph<PartitionVertex, u64>,
    index: BTreeMap<NodeKey, NodeIndex>,
}

impl PartitionGraph {
    pub fn from_call_graph(call_graph: &WeightedCallGraph) -> Self {
        let vertices = call_graph.nodes().map(|n| (n.key.clone(), n.weight()));
        let edges = call_graph.edges().map(|e| (e.from.clone(), e.to.clone(), e.weight()));
        Self::from_parts(vertices, edges)
    }

    /// Build directly from weighted vertices and edges; edges naming unknown
    /// vertices are ignored.
    pub fn from_parts(
        vertices: impl IntoIterator<Item = (NodeKey, u64)>,
        edges: impl IntoIterator<Item = (NodeKey, NodeKey, u64)>,
    ) -> Self {
        let mut sorted: Vec<(NodeKey, u64)> = vertices.into_iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));
        sorted.dedup_by(|a, b| a.0 == b.0);

        let mut graph = UnGraph::<PartitionVertex, u64>::with_capacity(sorted.len(), 0);
        let mut index = BTreeMap::new();
        for (key, weight) in sorted {
            let idx = graph.add_node(PartitionVertex { key: key.clone(), weight });
            index.insert(key, idx);
        }

        for (from, to, weight) in edges {
            let (Some(&a), Some(&b)) = (index.get(&from), index.get(&to)) else {
                continue;
            };
            if a == b {
                continue;
            }
            match graph.find_edge(a, b) {
                Some(existing) => graph[existing] = graph[existing].saturating_add(weight),
                None => {
                    graph.add_edge(a, b, weight);
                }
            }
        }

        Self { graph, index }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn total_weight(&self) -> u64 {
        self.graph.node_weights().map(|v| v.weight).sum()
    }

    pub fn key(&self, vertex: usize) -> &NodeKey {
        &self.graph[NodeIndex::new(vertex)].key
    }

    pub fn weight(&self, vertex: usize) -> u64 {
        self.graph[NodeIndex::new(vertex)].weight
    }

    pub fn index_of(&self, key: &NodeKey) -> Option<usize> {
        self.index.get(key).map(|idx| idx.index())
    }

    pub fn keys(&self) -> impl Iterator<Item = &NodeKey> {
        self.index.keys()
    }

    /// Neighbours of `vertex` with the weight of the connecting edge.
    pub fn neighbors(&self, vertex: usize) -> impl Iterator<Item = (usize, u64)> + '_ {
        let a = NodeIndex::new(vertex);
        self.graph.edges(a).map(move |e| {
            let other = if e.source() == a { e.target() } else { e.source() };
            (other.index(), *e.weight())
        })
    }

    /// Undirected edges as `(a, b, weight)` vertex triples.
    pub fn edge_list(&self) -> Vec<(usize, usize, u64)> {
        self.graph
            .edge_references()
            .map(|e| (e.source().index(), e.target().index(), *e.weight()))
            .collect()
    }

    /// Sum of edge weights whose endpoints carry different labels.
    pub fn cut_cost(&self, labels: &[usize]) -> u64 {
        self.graph
            .edge_references()
            .filter(|e| labels[e.source().index()] != labels[e.target().index()])
            .map(|e| *e.weight())
            .sum()
    }

    /// Largest admissible part weight for `k` parts under `imbalance`.
    pub fn balance_limit(&self, k: usize, imbalance: f64) -> u64 {
        let ideal = self.total_weight() as f64 / k.max(1) as f64;
        (ideal * (1.0 + imbalance.max(0.0))).ceil() as u64
    }

    /// Turn a per-vertex label vector into a [`Partitioning`].
    pub fn to_partitioning(&self, labels: &[usize], k: usize) -> Partitioning {
        let mut parts = vec![BTreeSet::new(); k];
        for (vertex, &label) in labels.iter().enumerate() {
            if let Some(part) = parts.get_mut(label) {
                part.insert(self.key(vertex).clone());
            }
        }
        Partitioning { total_cut_cost: self.cut_cost(labels), parts }
    }
}

/// Result of a partitioning request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partitioning {
    pub total_cut_cost: u64,
    pub parts: Vec<BTreeSet<NodeKey>>,
}

impl Partitioning {
    pub fn k(&self) -> usize {
        self.parts.len()
    }

    /// Node -> partition index.
    pub fn assignment(&self) -> BTreeMap<NodeKey, usize> {
        self.parts
            .iter()
            .enumerate()
            .flat_map(|(i, part)| part.iter().map(move |key| (key.clone(), i)))
            .collect()
    }

    pub fn part_of(&self, key: &NodeKey) -> Option<usize> {
        self.parts.iter().position(|part| part.contains(key))
    }
}

/// A balanced min-cut graph partitioner.
pub trait PartitionOracle: Send + Sync {
    fn name(&self) -> &'static str;

    /// Split `graph` into exactly `k` non-overlapping parts covering every vertex.
    fn partition(&self, graph: &PartitionGraph, k: usize) -> Result<Partitioning, PartitionError>;
}

/// Reject requests no partitioner can satisfy.
pub fn check_preconditions(graph: &PartitionGraph, k: usize) -> Result<(), PartitionError> {
    if graph.is_empty() {
        return Err(PartitionError::EmptyGraph);
    }
    if k == 0 || k > graph.node_count() {
        return Err(PartitionError::InvalidPartitionCount { k, nodes: graph.node_count() });
    }
    Ok(())
}

/// Check that `result` is `k` disjoint sets whose union is the vertex set.
pub fn validate_partitioning(
    graph: &PartitionGraph,
    k: usize,
    result: &Partitioning,
) -> Result<(), PartitionError> {
    if result.parts.len() != k {
        return Err(PartitionError::InvalidAssignment(format!(
            "expected {k} parts, got {}",
            result.parts.len()
        )));
    }
    let mut seen: BTreeSet<&NodeKey> = BTreeSet::new();
    for (i, part) in result.parts.iter().enumerate() {
        for key in part {
            if graph.index_of(key).is_none() {
                return Err(PartitionError::InvalidAssignment(format!(
                    "part {i} contains unknown node {key}"
                )));
            }
            if !seen.insert(key) {
                return Err(PartitionError::InvalidAssignment(format!(
                    "node {key} is assigned to more than one part"
                )));
            }
        }
    }
    if seen.len() != graph.node_count() {
        let missing = graph.keys().find(|k| !seen.contains(k));
        return Err(PartitionError::InvalidAssignment(match missing {
            Some(key) => format!("node {key} is not assigned to any part"),
            None => "assignment does not cover the graph".to_string(),
        }));
    }
    Ok(())
}

/// Run `oracle` and validate its answer, giving up after `timeout`.
///
/// The oracle has no cancellation; on timeout its thread is left to finish
/// and its result is discarded.
pub fn partition_with_timeout(
    oracle: Arc<dyn PartitionOracle>,
    graph: Arc<PartitionGraph>,
    k: usize,
    timeout: Option<Duration>,
) -> Result<Partitioning, PartitionError> {
    check_preconditions(&graph, k)?;

    let result = match timeout {
        None => oracle.partition(&graph, k)?,
        Some(timeout) => {
            let (tx, rx) = mpsc::channel();
            let worker_graph = Arc::clone(&graph);
            thread::Builder::new()
                .name(format!("oracle-{}", oracle.name()))
                .spawn(move || {
                    let _ = tx.send(oracle.partition(&worker_graph, k));
                })
                .map_err(|e| PartitionError::OracleFailed(format!("failed to spawn: {e}")))?;

            match rx.recv_timeout(timeout) {
                Ok(result) => result?,
                Err(RecvTimeoutError::Timeout) => {
                    return Err(PartitionError::PartitionTimeout { timeout })
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(PartitionError::OracleFailed(
                        "partitioner thread exited without a result".to_string(),
                    ))
                }
            }
        }
    };

    validate_partitioning(&graph, k, &result)?;
    Ok(result)
}

/// Registry of partitioners; callers select by name.
#[derive(Default)]
pub struct OracleRegistry {
    oracles: HashMap<String, Arc<dyn PartitionOracle>>,
}

impl OracleRegistry {
    pub fn new() -> Self {
        Self { oracles: HashMap::new() }
    }

    pub fn register<O: PartitionOracle + 'static>(&mut self, oracle: O) -> &mut Self {
        self.oracles.insert(oracle.name().to_string(), Arc::new(oracle));
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn PartitionOracle>> {
        self.oracles.get(name).cloned()
    }

    /// Look up `name`, reporting the available names on failure.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn PartitionOracle>, PartitionError> {
        self.get(name).ok_or_else(|| PartitionError::UnknownOracle {
            name: name.to_string(),
            available: self.names(),
        })
    }

    /// Return a sorted list of registered names for error messages/help.
    pub fn names(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.oracles.keys().cloned().collect();
        keys.sort();
        keys
    }
}

/// Registry populated with the built-in partitioners.
pub fn default_oracle_registry(imbalance: f64) -> OracleRegistry {
    let mut registry = OracleRegistry::new();
    registry
        .register(ExactOracle::new(imbalance))
        .register(GreedyOracle::new(imbalance))
        .register(AutoOracle::new(imbalance));
    registry
}
