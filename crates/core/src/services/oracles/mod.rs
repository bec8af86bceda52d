//! Built-in partitioners.

pub mod exact;
pub mod greedy;

pub use exact::{ExactOracle, MAX_EXACT_VERTICES};
pub use greedy::GreedyOracle;

use crate::services::partition::{PartitionError, PartitionGraph, PartitionOracle, Partitioning};

/// Exhaustive search for small graphs, the greedy heuristic otherwise.
#[derive(Debug, Clone)]
pub struct AutoOracle {
    exact: ExactOracle,
    greedy: GreedyOracle,
}

impl AutoOracle {
    pub fn new(imbalance: f64) -> Self {
        Self { exact: ExactOracle::new(imbalance), greedy: GreedyOracle::new(imbalance) }
    }
}

impl PartitionOracle for AutoOracle {
    fn name(&self) -> &'static str {
        "auto"
    }

    fn partition(&self, graph: &PartitionGraph, k: usize) -> Result<Partitioning, PartitionError> {
        if graph.node_count() <= MAX_EXACT_VERTICES {
            self.exact.partition(graph, k)
        } else {
            self.greedy.partition(graph, k)
        }
    }
}
