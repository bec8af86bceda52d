//! Exhaustive partitioner for small graphs.

use crate::services::partition::{
    check_preconditions, PartitionError, PartitionGraph, PartitionOracle, Partitioning,
};

/// Largest graph the exhaustive search accepts.
pub const MAX_EXACT_VERTICES: usize = 12;

/// Exhaustive balanced min-cut search over canonical labellings.
///
/// Labellings are enumerated as restricted growth strings (vertex 0 is in
/// part 0, each later vertex joins an existing part or opens the next one),
/// so every set partition is visited once and the first optimum found is the
/// lexicographically smallest. Among balanced assignments the lowest cut wins,
/// then the lightest heaviest part. When no assignment meets the balance limit
/// the least imbalanced one is returned.
#[derive(Debug, Clone)]
pub struct ExactOracle {
    imbalance: f64,
}

impl ExactOracle {
    pub fn new(imbalance: f64) -> Self {
        Self { imbalance }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Score {
    cut: u64,
    heaviest: u64,
}

struct Search<'a> {
    graph: &'a PartitionGraph,
    k: usize,
    limit: u64,
    /// Neighbours with a smaller index, so the cut grows as vertices are placed.
    earlier: Vec<Vec<(usize, u64)>>,
    labels: Vec<usize>,
    weights: Vec<u64>,
    balanced: Option<(Score, Vec<usize>)>,
    /// Best by (heaviest, cut) regardless of the limit.
    fallback: Option<((u64, u64), Vec<usize>)>,
}

impl Search<'_> {
    fn run(&mut self, vertex: usize, used: usize, cut: u64) {
        let n = self.graph.node_count();
        if let Some((best, _)) = &self.balanced {
            if cut > best.cut {
                return;
            }
        }
        // Every remaining part needs at least one of the remaining vertices.
        if self.k - used > n - vertex {
            return;
        }
        if vertex == n {
            self.record(cut);
            return;
        }

        let weight = self.graph.weight(vertex);
        let open = (used + 1).min(self.k);
        for label in 0..open {
            let added: u64 = self.earlier[vertex]
                .iter()
                .filter(|(other, _)| self.labels[*other] != label)
                .map(|(_, w)| *w)
                .sum();
            self.labels[vertex] = label;
            self.weights[label] += weight;
            self.run(vertex + 1, used.max(label + 1), cut + added);
            self.weights[label] -= weight;
        }
    }

    fn record(&mut self, cut: u64) {
        let heaviest = self.weights.iter().copied().max().unwrap_or(0);
        if heaviest <= self.limit {
            let score = Score { cut, heaviest };
            if self.balanced.as_ref().map_or(true, |(best, _)| score < *best) {
                self.balanced = Some((score, self.labels.clone()));
            }
        } else if self.balanced.is_none() {
            let score = (heaviest, cut);
            if self.fallback.as_ref().map_or(true, |(best, _)| score < *best) {
                self.fallback = Some((score, self.labels.clone()));
            }
        }
    }
}

impl PartitionOracle for ExactOracle {
    fn name(&self) -> &'static str {
        "exact"
    }

    fn partition(&self, graph: &PartitionGraph, k: usize) -> Result<Partitioning, PartitionError> {
        check_preconditions(graph, k)?;
        let n = graph.node_count();
        if n > MAX_EXACT_VERTICES {
            return Err(PartitionError::TooLarge {
                oracle: self.name(),
                nodes: n,
                limit: MAX_EXACT_VERTICES,
            });
        }

        let mut earlier = vec![Vec::new(); n];
        for (a, b, w) in graph.edge_list() {
            let (lo, hi) = if a < b { (a, b) } else { (b, a) };
            earlier[hi].push((lo, w));
        }

        let mut search = Search {
            graph,
            k,
            limit: graph.balance_limit(k, self.imbalance),
            earlier,
            labels: vec![0; n],
            weights: vec![0; k],
            balanced: None,
            fallback: None,
        };
        search.run(0, 0, 0);

        let labels = match (search.balanced, search.fallback) {
            (Some((_, labels)), _) => labels,
            (None, Some((_, labels))) => labels,
            (None, None) => {
                return Err(PartitionError::OracleFailed(format!(
                    "no assignment of {n} nodes into {k} parts"
                )))
            }
        };
        Ok(graph.to_partitioning(&labels, k))
    }
}
