//! Region-growing partitioner with single-vertex refinement.

use std::collections::BTreeSet;

use crate::services::partition::{
    check_preconditions, PartitionError, PartitionGraph, PartitionOracle, Partitioning,
};

const MAX_REFINE_PASSES: usize = 16;

/// Heuristic partitioner for graphs too large for exhaustive search.
///
/// Parts are grown one at a time from the heaviest unassigned vertex, always
/// absorbing the unassigned vertex most strongly connected to the part, until
/// the part reaches `total / k`. The last part takes the remainder. A
/// refinement phase then moves single vertices to the neighbouring part with
/// the largest positive gain as long as the move keeps the source non-empty
/// and the target within the balance limit, and finally overweight parts shed
/// their cheapest-to-move vertices.
#[derive(Debug, Clone)]
pub struct GreedyOracle {
    imbalance: f64,
}

impl GreedyOracle {
    pub fn new(imbalance: f64) -> Self {
        Self { imbalance }
    }
}

struct State<'a> {
    graph: &'a PartitionGraph,
    k: usize,
    labels: Vec<usize>,
    weights: Vec<u64>,
    sizes: Vec<usize>,
}

impl State<'_> {
    /// Edge weight from `vertex` into each part.
    fn connectivity(&self, vertex: usize) -> Vec<u64> {
        let mut conn = vec![0u64; self.k];
        for (other, w) in self.graph.neighbors(vertex) {
            conn[self.labels[other]] += w;
        }
        conn
    }

    fn move_vertex(&mut self, vertex: usize, to: usize) {
        let from = self.labels[vertex];
        let weight = self.graph.weight(vertex);
        self.weights[from] -= weight;
        self.sizes[from] -= 1;
        self.weights[to] += weight;
        self.sizes[to] += 1;
        self.labels[vertex] = to;
    }

    fn heaviest(&self) -> u64 {
        self.weights.iter().copied().max().unwrap_or(0)
    }
}

fn grow(graph: &PartitionGraph, k: usize) -> Vec<usize> {
    let n = graph.node_count();
    let target = graph.total_weight().div_ceil(k as u64);
    let mut labels = vec![usize::MAX; n];
    let mut unassigned: BTreeSet<usize> = (0..n).collect();

    for part in 0..k.saturating_sub(1) {
        // Leave one vertex for each part still to be grown.
        let reserve = k - part - 1;
        let mut weight = 0u64;
        let mut gain = vec![0u64; n];

        while unassigned.len() > reserve && (weight < target || weight == 0) {
            let next = unassigned
                .iter()
                .copied()
                .filter(|&v| weight == 0 || gain[v] > 0)
                .max_by(|&a, &b| {
                    gain[a]
                        .cmp(&gain[b])
                        .then(graph.weight(a).cmp(&graph.weight(b)))
                        .then(b.cmp(&a))
                });
            // Disconnected from the part: reseed with the heaviest remaining vertex.
            let next = match next {
                Some(v) => v,
                None => match unassigned.iter().copied().max_by(|&a, &b| {
                    graph.weight(a).cmp(&graph.weight(b)).then(b.cmp(&a))
                }) {
                    Some(v) => v,
                    None => break,
                },
            };
            if weight > 0 && weight + graph.weight(next) > target && gain[next] == 0 {
                break;
            }

            unassigned.remove(&next);
            labels[next] = part;
            weight += graph.weight(next);
            for (other, w) in graph.neighbors(next) {
                gain[other] += w;
            }
        }
    }

    for v in unassigned {
        labels[v] = k - 1;
    }
    labels
}

impl PartitionOracle for GreedyOracle {
    fn name(&self) -> &'static str {
        "greedy"
    }

    fn partition(&self, graph: &PartitionGraph, k: usize) -> Result<Partitioning, PartitionError> {
        check_preconditions(graph, k)?;
        let n = graph.node_count();
        let limit = graph.balance_limit(k, self.imbalance);

        let labels = grow(graph, k);
        let mut state = State { graph, k, labels, weights: vec![0; k], sizes: vec![0; k] };
        for v in 0..n {
            state.weights[state.labels[v]] += graph.weight(v);
            state.sizes[state.labels[v]] += 1;
        }

        for _ in 0..MAX_REFINE_PASSES {
            let mut moved = false;
            for v in 0..n {
                let from = state.labels[v];
                if state.sizes[from] <= 1 {
                    continue;
                }
                let conn = state.connectivity(v);
                let weight = graph.weight(v);
                let best = (0..k)
                    .filter(|&to| to != from && conn[to] > conn[from])
                    .filter(|&to| state.weights[to] + weight <= limit)
                    .max_by(|&a, &b| conn[a].cmp(&conn[b]).then(b.cmp(&a)));
                if let Some(to) = best {
                    state.move_vertex(v, to);
                    moved = true;
                }
            }
            if !moved {
                break;
            }
        }

        // Shed weight from overweight parts while it lowers the heaviest part.
        for _ in 0..n * k {
            let Some(heavy) = (0..k).find(|&p| state.weights[p] > limit) else {
                break;
            };
            if state.sizes[heavy] <= 1 {
                break;
            }
            let current = state.heaviest();
            let mut best: Option<(u64, usize, usize)> = None;
            for v in (0..n).filter(|&v| state.labels[v] == heavy) {
                let conn = state.connectivity(v);
                let weight = graph.weight(v);
                for to in (0..k).filter(|&to| to != heavy) {
                    if state.weights[to] + weight >= current {
                        continue;
                    }
                    let penalty = conn[heavy].saturating_sub(conn[to]);
                    if best.map_or(true, |(p, _, _)| penalty < p) {
                        best = Some((penalty, v, to));
                    }
                }
            }
            match best {
                Some((_, v, to)) => state.move_vertex(v, to),
                None => break,
            }
        }

        Ok(graph.to_partitioning(&state.labels, k))
    }
}
