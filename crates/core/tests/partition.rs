use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use boxcut_core::analysis::{build_weighted_graph, BuildOptions};
use boxcut_core::diagnostics::Diagnostics;
use boxcut_core::facts::{FunctionFact, ModuleFacts};
use boxcut_core::model::{NodeKey, StructuralEdge};
use boxcut_core::services::oracles::{AutoOracle, ExactOracle, GreedyOracle};
use boxcut_core::services::partition::{
    default_oracle_registry, partition_with_timeout, validate_partitioning, PartitionError,
    PartitionGraph, PartitionOracle, Partitioning, DEFAULT_IMBALANCE,
};

fn key(name: &str) -> NodeKey {
    NodeKey::function(name)
}

fn graph(vertices: &[(&str, u64)], edges: &[(&str, &str, u64)]) -> PartitionGraph {
    PartitionGraph::from_parts(
        vertices.iter().map(|(n, w)| (key(n), *w)),
        edges.iter().map(|(a, b, w)| (key(a), key(b), *w)),
    )
}

fn two_clusters() -> PartitionGraph {
    graph(
        &[("a1", 10), ("a2", 12), ("a3", 9), ("b1", 11), ("b2", 10), ("b3", 8)],
        &[
            ("a1", "a2", 9),
            ("a2", "a3", 7),
            ("a1", "a3", 5),
            ("b1", "b2", 8),
            ("b2", "b3", 9),
            ("b1", "b3", 6),
            ("a3", "b1", 1),
        ],
    )
}

fn chain(n: usize) -> PartitionGraph {
    let names: Vec<String> = (0..n).map(|i| format!("f{i:02}")).collect();
    let vertices: Vec<(&str, u64)> = names.iter().map(|n| (n.as_str(), 10)).collect();
    let edges: Vec<(&str, &str, u64)> =
        names.windows(2).map(|w| (w[0].as_str(), w[1].as_str(), 3)).collect();
    graph(&vertices, &edges)
}

fn oracles() -> Vec<Box<dyn PartitionOracle>> {
    vec![
        Box::new(ExactOracle::new(DEFAULT_IMBALANCE)),
        Box::new(GreedyOracle::new(DEFAULT_IMBALANCE)),
        Box::new(AutoOracle::new(DEFAULT_IMBALANCE)),
    ]
}

fn assert_valid(g: &PartitionGraph, k: usize, result: &Partitioning) {
    validate_partitioning(g, k, result).expect("valid partitioning");
    assert!(result.parts.iter().all(|p| !p.is_empty()), "empty part in {result:?}");
    let labels: Vec<usize> = (0..g.node_count())
        .map(|v| result.part_of(g.key(v)).expect("assigned"))
        .collect();
    assert_eq!(result.total_cut_cost, g.cut_cost(&labels));
}

#[test]
fn every_oracle_returns_k_disjoint_covering_parts() {
    let g = two_clusters();
    for oracle in oracles() {
        for k in 1..=g.node_count() {
            let result = oracle.partition(&g, k).expect("partition");
            assert_eq!(result.k(), k, "{} k={k}", oracle.name());
            assert_valid(&g, k, &result);
        }
    }
}

#[test]
fn greedy_handles_graphs_beyond_exhaustive_search() {
    let g = chain(40);
    let oracle = GreedyOracle::new(DEFAULT_IMBALANCE);
    for k in [1, 2, 3, 7, 40] {
        let result = oracle.partition(&g, k).expect("partition");
        assert_valid(&g, k, &result);
    }

    let halves = oracle.partition(&g, 2).expect("partition");
    let limit = g.balance_limit(2, DEFAULT_IMBALANCE);
    let weights: Vec<u64> = halves.parts.iter().map(|p| p.len() as u64 * 10).collect();
    assert!(weights.iter().all(|w| *w <= limit), "{weights:?} over {limit}");
}

#[test]
fn exact_oracle_finds_the_minimum_balanced_cut() {
    let g = two_clusters();
    let result = ExactOracle::new(DEFAULT_IMBALANCE).partition(&g, 2).expect("partition");

    assert_eq!(result.total_cut_cost, 1);
    let a: BTreeSet<NodeKey> = ["a1", "a2", "a3"].iter().map(|n| key(n)).collect();
    let b: BTreeSet<NodeKey> = ["b1", "b2", "b3"].iter().map(|n| key(n)).collect();
    assert_eq!(result.parts, vec![a, b]);
}

#[test]
fn greedy_oracle_separates_weakly_linked_clusters() {
    let g = two_clusters();
    let result = GreedyOracle::new(DEFAULT_IMBALANCE).partition(&g, 2).expect("partition");
    assert_eq!(result.total_cut_cost, 1);
}

#[test]
fn exact_oracle_falls_back_to_least_imbalanced_assignment() {
    let g = graph(&[("a", 100), ("b", 1), ("c", 1)], &[]);
    let result = ExactOracle::new(DEFAULT_IMBALANCE).partition(&g, 2).expect("partition");

    assert_valid(&g, 2, &result);
    let heavy = result.part_of(&key("a")).expect("a assigned");
    assert_eq!(result.parts[heavy].len(), 1);
}

#[test]
fn exact_oracle_refuses_large_graphs() {
    let g = chain(13);
    let err = ExactOracle::new(DEFAULT_IMBALANCE).partition(&g, 2).expect_err("too large");
    assert!(matches!(err, PartitionError::TooLarge { nodes: 13, .. }));
    // `auto` switches to the heuristic instead.
    let result = AutoOracle::new(DEFAULT_IMBALANCE).partition(&g, 2).expect("auto");
    assert_valid(&g, 2, &result);
}

#[test]
fn invalid_partition_counts_are_rejected() {
    let g = two_clusters();
    for oracle in oracles() {
        assert!(matches!(
            oracle.partition(&g, 0),
            Err(PartitionError::InvalidPartitionCount { k: 0, .. })
        ));
        assert!(matches!(
            oracle.partition(&g, 7),
            Err(PartitionError::InvalidPartitionCount { k: 7, nodes: 6 })
        ));
    }
}

#[test]
fn empty_graph_is_rejected() {
    let empty = PartitionGraph::default();
    for oracle in oracles() {
        assert!(matches!(oracle.partition(&empty, 1), Err(PartitionError::EmptyGraph)));
    }
    let oracle: Arc<dyn PartitionOracle> = Arc::new(GreedyOracle::new(DEFAULT_IMBALANCE));
    let err = partition_with_timeout(oracle, Arc::new(empty), 1, None).expect_err("empty");
    assert!(matches!(err, PartitionError::EmptyGraph));
}

struct SlowOracle;

impl PartitionOracle for SlowOracle {
    fn name(&self) -> &'static str {
        "slow"
    }

    fn partition(&self, graph: &PartitionGraph, k: usize) -> Result<Partitioning, PartitionError> {
        thread::sleep(Duration::from_secs(2));
        GreedyOracle::new(DEFAULT_IMBALANCE).partition(graph, k)
    }
}

#[test]
fn slow_oracle_times_out() {
    let err = partition_with_timeout(
        Arc::new(SlowOracle),
        Arc::new(two_clusters()),
        2,
        Some(Duration::from_millis(50)),
    )
    .expect_err("timeout");
    assert!(matches!(err, PartitionError::PartitionTimeout { .. }));
}

#[test]
fn fast_oracle_finishes_within_timeout() {
    let result = partition_with_timeout(
        Arc::new(ExactOracle::new(DEFAULT_IMBALANCE)),
        Arc::new(two_clusters()),
        3,
        Some(Duration::from_secs(30)),
    )
    .expect("partition");
    assert_eq!(result.k(), 3);
}

struct LazyOracle;

impl PartitionOracle for LazyOracle {
    fn name(&self) -> &'static str {
        "lazy"
    }

    fn partition(&self, graph: &PartitionGraph, _k: usize) -> Result<Partitioning, PartitionError> {
        Ok(Partitioning { total_cut_cost: 0, parts: vec![graph.keys().cloned().collect()] })
    }
}

#[test]
fn contract_violations_surface_as_invalid_assignment() {
    let err = partition_with_timeout(Arc::new(LazyOracle), Arc::new(two_clusters()), 2, None)
        .expect_err("wrong part count");
    assert!(matches!(err, PartitionError::InvalidAssignment(_)));

    let g = two_clusters();
    let mut overlapping = GreedyOracle::new(DEFAULT_IMBALANCE).partition(&g, 2).expect("ok");
    overlapping.parts[1].insert(key("a1"));
    assert!(matches!(
        validate_partitioning(&g, 2, &overlapping),
        Err(PartitionError::InvalidAssignment(_))
    ));

    let mut missing = GreedyOracle::new(DEFAULT_IMBALANCE).partition(&g, 2).expect("ok");
    missing.parts[0].clear();
    assert!(validate_partitioning(&g, 2, &missing).is_err());
}

#[test]
fn registry_resolves_builtin_oracles_by_name() {
    let registry = default_oracle_registry(DEFAULT_IMBALANCE);
    assert_eq!(registry.names(), vec!["auto", "exact", "greedy"]);
    assert_eq!(registry.resolve("exact").map(|o| o.name()).ok(), Some("exact"));

    match registry.resolve("metis") {
        Err(PartitionError::UnknownOracle { name, available }) => {
            assert_eq!(name, "metis");
            assert_eq!(available.len(), 3);
        }
        _ => panic!("expected UnknownOracle"),
    }
}

#[test]
fn partition_input_folds_antiparallel_edges_and_drops_self_loops() {
    let mut facts = ModuleFacts::new();
    facts.add_function(FunctionFact::sized("a", 10));
    facts.add_function(FunctionFact::sized("b", 20));
    let edges = vec![
        StructuralEdge::new("a", "b", 3),
        StructuralEdge::new("b", "a", 4),
        StructuralEdge::new("a", "a", 9),
    ];
    let call_graph =
        build_weighted_graph(&[], &edges, &facts, &BuildOptions::default(), &Diagnostics::new())
            .expect("build");
    assert_eq!(call_graph.edge_count(), 3);

    let input = call_graph.partition_input();
    assert_eq!(input.node_count(), 2);
    assert_eq!(input.total_weight(), 30);
    assert_eq!(input.edge_list(), vec![(0, 1, 7)]);
    assert_eq!(input.index_of(&key("b")), Some(1));
}
