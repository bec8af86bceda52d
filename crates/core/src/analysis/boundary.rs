//! Compartment gates from a partition assignment.
//!
//! A node is an entry point of its compartment when at least one edge from a
//! different compartment lands on it. Only the receiving side needs a gate, so
//! a node with outgoing cross edges alone stays internal.

use std::collections::{BTreeMap, BTreeSet};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::analysis::call_graph::WeightedCallGraph;
use crate::model::{EdgeKind, NodeKey};
use crate::services::partition::Partitioning;

/// Partition index used for nodes the assignment does not mention.
pub const UNASSIGNED: i64 = -1;

fn part_of(assignment: &BTreeMap<NodeKey, usize>, key: &NodeKey) -> i64 {
    assignment.get(key).map_or(UNASSIGNED, |&p| p as i64)
}

/// Entry-point flag for every node of `graph`.
pub fn entrypoints(
    graph: &WeightedCallGraph,
    assignment: &BTreeMap<NodeKey, usize>,
) -> BTreeMap<NodeKey, bool> {
    let mut flags: BTreeMap<NodeKey, bool> =
        graph.node_keys().map(|key| (key.clone(), false)).collect();
    for edge in graph.edges() {
        if part_of(assignment, &edge.from) != part_of(assignment, &edge.to) {
            if let Some(flag) = flags.get_mut(&edge.to) {
                *flag = true;
            }
        }
    }
    flags
}

/// Sum of the weights of edges whose endpoints sit in different partitions.
pub fn cut_cost(graph: &WeightedCallGraph, assignment: &BTreeMap<NodeKey, usize>) -> u64 {
    graph
        .edges()
        .filter(|e| part_of(assignment, &e.from) != part_of(assignment, &e.to))
        .map(|e| e.weight())
        .sum()
}

/// An edge that crosses a compartment boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CutEdge {
    pub from: NodeKey,
    pub to: NodeKey,
    pub kind: EdgeKind,
    pub from_partition: i64,
    pub to_partition: i64,
    pub weight: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompartmentManifest {
    pub index: usize,
    /// Nodes receiving cross-compartment edges; each needs a gate.
    pub entry_points: Vec<NodeKey>,
    pub internal: Vec<NodeKey>,
    pub weight: u64,
}

impl CompartmentManifest {
    pub fn node_count(&self) -> usize {
        self.entry_points.len() + self.internal.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionManifest {
    pub partitions: Vec<CompartmentManifest>,
    pub total_cut_cost: u64,
    pub cut_edges: Vec<CutEdge>,
}

impl PartitionManifest {
    pub fn entry_points(&self) -> BTreeSet<&NodeKey> {
        self.partitions.iter().flat_map(|p| p.entry_points.iter()).collect()
    }
}

/// Read-only queries over a finished graph and one assignment.
///
/// Both are borrowed immutably, so queries for different partitions can run
/// concurrently.
#[derive(Debug, Clone)]
pub struct BoundaryAnalyzer<'a> {
    graph: &'a WeightedCallGraph,
    assignment: BTreeMap<NodeKey, usize>,
}

impl<'a> BoundaryAnalyzer<'a> {
    pub fn new(graph: &'a WeightedCallGraph, assignment: BTreeMap<NodeKey, usize>) -> Self {
        Self { graph, assignment }
    }

    pub fn from_partitioning(graph: &'a WeightedCallGraph, partitioning: &Partitioning) -> Self {
        Self::new(graph, partitioning.assignment())
    }

    pub fn assignment(&self) -> &BTreeMap<NodeKey, usize> {
        &self.assignment
    }

    pub fn entrypoints(&self) -> BTreeMap<NodeKey, bool> {
        entrypoints(self.graph, &self.assignment)
    }

    pub fn cut_cost(&self) -> u64 {
        cut_cost(self.graph, &self.assignment)
    }

    /// Split the nodes of `partition` into (entry points, internal), both sorted.
    pub fn entrypoints_for_partition(&self, partition: usize) -> (Vec<NodeKey>, Vec<NodeKey>) {
        let target = partition as i64;
        let mut gated: BTreeSet<&NodeKey> = BTreeSet::new();
        for edge in self.graph.edges() {
            if part_of(&self.assignment, &edge.to) == target
                && part_of(&self.assignment, &edge.from) != target
            {
                gated.insert(&edge.to);
            }
        }

        let mut entry_points = Vec::new();
        let mut internal = Vec::new();
        for key in self.graph.node_keys() {
            if part_of(&self.assignment, key) != target {
                continue;
            }
            if gated.contains(key) {
                entry_points.push(key.clone());
            } else {
                internal.push(key.clone());
            }
        }
        (entry_points, internal)
    }

    pub fn cut_edges(&self) -> Vec<CutEdge> {
        self.graph
            .edges()
            .filter_map(|e| {
                let from_partition = part_of(&self.assignment, &e.from);
                let to_partition = part_of(&self.assignment, &e.to);
                (from_partition != to_partition).then(|| CutEdge {
                    from: e.from.clone(),
                    to: e.to.clone(),
                    kind: e.kind,
                    from_partition,
                    to_partition,
                    weight: e.weight(),
                })
            })
            .collect()
    }

    /// Gate manifest for partitions `0..k`, computed per partition in parallel.
    pub fn manifest(&self, k: usize) -> PartitionManifest {
        let partitions: Vec<CompartmentManifest> = (0..k)
            .into_par_iter()
            .map(|index| {
                let (entry_points, internal) = self.entrypoints_for_partition(index);
                let weight = entry_points
                    .iter()
                    .chain(internal.iter())
                    .filter_map(|key| self.graph.node(key))
                    .map(|node| node.weight())
                    .sum();
                CompartmentManifest { index, entry_points, internal, weight }
            })
            .collect();

        let cut_edges = self.cut_edges();
        let total_cut_cost = cut_edges.iter().map(|e| e.weight).sum();
        PartitionManifest { partitions, total_cut_cost, cut_edges }
    }
}
