use boxcut_core::analysis::{
    build_weighted_graph, BuildError, BuildOptions, CallGraphBuilder, MalformedTypePolicy,
    ModuleInput, UnresolvedPolicy,
};
use boxcut_core::diagnostics::{DiagnosticKind, Diagnostics};
use boxcut_core::facts::{
    parse_call_graph_dot, FrequencyMode, FunctionFact, GlobalFact, ModuleFacts, ParamFact,
};
use boxcut_core::model::{EdgeKind, NodeKey, StructuralEdge, UNRESOLVED_CODE_SIZE};

fn options(unit: u64) -> BuildOptions {
    BuildOptions::default().with_pointer_unit_cost(unit)
}

fn facts_with(functions: &[(&str, u64)]) -> ModuleFacts {
    let mut facts = ModuleFacts::new();
    for (name, size) in functions {
        facts.add_function(FunctionFact::sized(*name, *size));
    }
    facts
}

#[test]
fn repeated_structural_edge_sums_frequency_and_keeps_param_size() {
    let mut facts = facts_with(&[("A", 10)]);
    facts.add_function(
        FunctionFact::sized("B", 20).with_parameters(vec![ParamFact::new("x", "i32*")]),
    );
    let edges = vec![StructuralEdge::new("A", "B", 2), StructuralEdge::new("A", "B", 3)];
    let diagnostics = Diagnostics::new();

    let graph = build_weighted_graph(&[], &edges, &facts, &options(4), &diagnostics).expect("build");

    let edge = graph.edge(&NodeKey::function("A"), &NodeKey::function("B")).expect("edge");
    assert_eq!(edge.kind, EdgeKind::Call);
    assert_eq!(edge.frequency, 5);
    assert_eq!(edge.param_size, 16);
    assert_eq!(edge.weight(), 21);
    assert_eq!(graph.edge_count(), 1);
    assert!(diagnostics.is_empty());
}

#[test]
fn node_weights_come_from_code_size() {
    let facts = facts_with(&[("A", 100), ("B", 50)]);
    let edges = vec![StructuralEdge::new("A", "B", 1)];
    let graph =
        build_weighted_graph(&[], &edges, &facts, &options(4), &Diagnostics::new()).expect("build");

    assert_eq!(graph.node(&NodeKey::function("A")).map(|n| n.weight()), Some(100));
    assert_eq!(graph.node(&NodeKey::function("B")).map(|n| n.weight()), Some(50));
    assert_eq!(graph.total_node_weight(), 150);
}

#[test]
fn repeated_global_references_accumulate_frequency() {
    let mut facts = facts_with(&[("A", 10), ("B", 10)]);
    facts.add_global(GlobalFact::new("g", "i32"));
    for _ in 0..3 {
        facts.add_reference("A", "g", 1);
    }
    let edges = vec![StructuralEdge::new("A", "B", 1)];

    let graph =
        build_weighted_graph(&[], &edges, &facts, &options(4), &Diagnostics::new()).expect("build");

    let global = NodeKey::global("g");
    assert_eq!(graph.node(&global).map(|n| n.code_size), Some(4));
    let edge = graph.edge(&NodeKey::function("A"), &global).expect("reference edge");
    assert_eq!(edge.kind, EdgeKind::DataReference);
    assert_eq!(edge.frequency, 3);
    assert_eq!(edge.param_size, 4);
    assert_eq!(edge.weight(), 7);
}

#[test]
fn constant_globals_double_reference_cost() {
    let mut facts = facts_with(&[("A", 10), ("B", 10)]);
    facts.add_global(GlobalFact::new("table", "[4 x i32]").constant(true));
    facts.add_global(GlobalFact::new("state", "[4 x i32]"));
    facts.add_reference("A", "table", 1);
    facts.add_reference("B", "state", 1);
    let edges = vec![StructuralEdge::new("A", "B", 1)];

    let graph =
        build_weighted_graph(&[], &edges, &facts, &options(4), &Diagnostics::new()).expect("build");

    let table = graph.edge(&NodeKey::function("A"), &NodeKey::global("table")).expect("table");
    let state = graph.edge(&NodeKey::function("B"), &NodeKey::global("state")).expect("state");
    assert_eq!(table.param_size, 32);
    assert_eq!(state.param_size, 16);
}

#[test]
fn constness_recorded_before_the_global_fact_still_applies() {
    let mut facts = facts_with(&[("A", 10)]);
    facts.mark_constant("table");
    facts.add_global(GlobalFact::new("table", "i64"));
    facts.add_reference("A", "table", 1);

    let graph = build_weighted_graph(
        &["A".to_string()],
        &[],
        &facts,
        &options(4),
        &Diagnostics::new(),
    )
    .expect("build");

    let edge = graph.edge(&NodeKey::function("A"), &NodeKey::global("table")).expect("edge");
    assert_eq!(edge.param_size, 16);
}

#[test]
fn unresolved_symbol_gets_fallback_size_and_warning() {
    let facts = facts_with(&[("A", 100)]);
    let edges = vec![StructuralEdge::new("A", "E", 1)];
    let diagnostics = Diagnostics::new();

    let graph = build_weighted_graph(&[], &edges, &facts, &options(4), &diagnostics).expect("build");

    let e = graph.node(&NodeKey::function("E")).expect("E kept");
    assert_eq!(e.code_size, UNRESOLVED_CODE_SIZE);
    assert_eq!(e.code_size, 8);
    assert!(e.unresolved);
    assert!(diagnostics.has(DiagnosticKind::UnresolvedSymbol, "E"));
    assert_eq!(diagnostics.count(DiagnosticKind::UnresolvedSymbol), 1);
    // Callee without facts contributes no parameter cost.
    let edge = graph.edge(&NodeKey::function("A"), &NodeKey::function("E")).expect("edge");
    assert_eq!(edge.param_size, 0);
}

#[test]
fn remove_policy_drops_unresolved_symbols_and_their_edges() {
    let facts = facts_with(&[("A", 100), ("B", 10)]);
    let edges = vec![StructuralEdge::new("A", "E", 1), StructuralEdge::new("A", "B", 1)];
    let diagnostics = Diagnostics::new();
    let mut opts = options(4);
    opts.unresolved_policy = UnresolvedPolicy::Remove;

    let graph = build_weighted_graph(&[], &edges, &facts, &opts, &diagnostics).expect("build");

    assert!(!graph.contains(&NodeKey::function("E")));
    assert_eq!(graph.edge_count(), 1);
    assert!(diagnostics.has(DiagnosticKind::RemovedSymbol, "E"));
}

#[test]
fn unknown_global_reference_is_recorded_and_skipped() {
    let mut facts = facts_with(&[("A", 10)]);
    facts.add_reference("A", "ghost", 2);
    let diagnostics = Diagnostics::new();

    let graph = build_weighted_graph(&["A".to_string()], &[], &facts, &options(4), &diagnostics)
        .expect("build");

    assert!(!graph.contains(&NodeKey::global("ghost")));
    assert_eq!(graph.edge_count(), 0);
    assert!(diagnostics.has(DiagnosticKind::UnknownGlobal, "ghost"));
}

#[test]
fn references_from_functions_outside_the_graph_are_ignored() {
    let mut facts = facts_with(&[("A", 10), ("helper", 10)]);
    facts.add_global(GlobalFact::new("g", "i32"));
    facts.add_reference("helper", "g", 1);

    let graph = build_weighted_graph(
        &["A".to_string()],
        &[],
        &facts,
        &options(4),
        &Diagnostics::new(),
    )
    .expect("build");

    assert_eq!(graph.node_count(), 1);
    assert!(!graph.contains(&NodeKey::global("g")));
}

#[test]
fn function_and_global_with_same_name_stay_distinct() {
    let mut facts = facts_with(&[("main", 40), ("counter", 20)]);
    facts.add_global(GlobalFact::new("counter", "i64"));
    facts.add_reference("main", "counter", 1);
    let edges = vec![StructuralEdge::new("main", "counter", 1)];

    let graph =
        build_weighted_graph(&[], &edges, &facts, &options(4), &Diagnostics::new()).expect("build");

    assert_eq!(graph.node_count(), 3);
    assert_eq!(graph.node(&NodeKey::function("counter")).map(|n| n.code_size), Some(20));
    assert_eq!(graph.node(&NodeKey::global("counter")).map(|n| n.code_size), Some(8));
    assert!(graph.edge(&NodeKey::function("main"), &NodeKey::function("counter")).is_some());
    assert!(graph.edge(&NodeKey::function("main"), &NodeKey::global("counter")).is_some());
}

#[test]
fn malformed_parameter_type_costs_zero_by_default() {
    let mut facts = facts_with(&[("A", 10)]);
    facts.add_function(
        FunctionFact::sized("B", 10).with_parameters(vec![
            ParamFact::new("x", "i32 $"),
            ParamFact::new("y", "i64"),
        ]),
    );
    let edges = vec![StructuralEdge::new("A", "B", 1)];
    let diagnostics = Diagnostics::new();

    let graph = build_weighted_graph(&[], &edges, &facts, &options(4), &diagnostics).expect("build");

    let edge = graph.edge(&NodeKey::function("A"), &NodeKey::function("B")).expect("edge");
    assert_eq!(edge.param_size, 8);
    assert!(diagnostics.has(DiagnosticKind::MalformedType, "B:x"));
}

#[test]
fn overly_nested_parameter_type_is_recoverable() {
    let deep = format!("{}i8{}", "[2 x ".repeat(5_000), "]".repeat(5_000));
    let mut facts = facts_with(&[("A", 10)]);
    facts.add_function(
        FunctionFact::sized("B", 10)
            .with_parameters(vec![ParamFact::new("x", deep), ParamFact::new("y", "i32")]),
    );
    let edges = vec![StructuralEdge::new("A", "B", 1)];
    let diagnostics = Diagnostics::new();

    let graph = build_weighted_graph(&[], &edges, &facts, &options(4), &diagnostics).expect("build");

    let edge = graph.edge(&NodeKey::function("A"), &NodeKey::function("B")).expect("edge");
    assert_eq!(edge.param_size, 4);
    assert!(diagnostics.has(DiagnosticKind::MalformedType, "B:x"));
}

#[test]
fn malformed_parameter_type_aborts_under_strict_policy() {
    let mut facts = facts_with(&[("A", 10)]);
    facts.add_function(
        FunctionFact::sized("B", 10).with_parameters(vec![ParamFact::new("x", "[4 i32]")]),
    );
    let edges = vec![StructuralEdge::new("A", "B", 1)];
    let mut opts = options(4);
    opts.malformed_type_policy = MalformedTypePolicy::Abort;

    let err = build_weighted_graph(&[], &edges, &facts, &opts, &Diagnostics::new())
        .expect_err("strict policy aborts");
    let BuildError::MalformedType { symbol, .. } = err;
    assert_eq!(symbol, "B:x");
}

#[test]
fn perturbations_never_push_weights_below_their_floor() {
    let facts = facts_with(&[("A", 10), ("B", 20)]);
    let edges = vec![StructuralEdge::new("A", "B", 3)];
    let mut builder = CallGraphBuilder::new(options(4));
    for e in edges {
        builder.add_structural_edge(e);
    }
    builder.merge_module(ModuleInput { name: "m".into(), facts, ..ModuleInput::default() });
    builder.set_node_perturbation(NodeKey::function("A"), -50);
    builder.set_node_perturbation(NodeKey::function("B"), 5);
    builder.set_edge_perturbation(NodeKey::function("A"), NodeKey::function("B"), -100);

    let graph = builder.finish(&Diagnostics::new()).expect("build");

    assert_eq!(graph.node(&NodeKey::function("A")).map(|n| n.weight()), Some(0));
    assert_eq!(graph.node(&NodeKey::function("B")).map(|n| n.weight()), Some(25));
    let edge = graph.edge(&NodeKey::function("A"), &NodeKey::function("B")).expect("edge");
    assert_eq!(edge.weight(), edge.frequency);
    assert_eq!(edge.weight(), 3);
}

fn module(name: &str, edges: &[(&str, &str, u64)], functions: &[(&str, u64)]) -> ModuleInput {
    let mut facts = facts_with(functions);
    facts.add_global(GlobalFact::new("shared", "[8 x i8]"));
    facts.add_reference(functions[0].0, "shared", 1);
    ModuleInput {
        name: name.to_string(),
        nodes: Vec::new(),
        edges: edges.iter().map(|(a, b, f)| StructuralEdge::new(a, b, *f)).collect(),
        facts,
    }
}

#[test]
fn merge_order_does_not_change_the_graph() {
    let modules = vec![
        module("a.o", &[("main", "parse", 1), ("main", "log", 2)], &[("main", 64), ("parse", 120)]),
        module("b.o", &[("parse", "log", 1), ("main", "log", 1)], &[("parse", 96), ("log", 32)]),
        module("c.o", &[("log", "write", 4)], &[("log", 40), ("write", 16)]),
    ];

    let build = |order: &[usize]| {
        let mut builder = CallGraphBuilder::new(options(4));
        for &i in order {
            builder.merge_module(modules[i].clone());
        }
        builder.finish(&Diagnostics::new()).expect("build")
    };

    let forward = build(&[0, 1, 2]);
    let backward = build(&[2, 1, 0]);
    let shuffled = build(&[1, 2, 0]);
    assert_eq!(forward, backward);
    assert_eq!(forward, shuffled);

    // Larger definition wins regardless of order.
    assert_eq!(forward.node(&NodeKey::function("parse")).map(|n| n.code_size), Some(120));
    assert_eq!(forward.node(&NodeKey::function("log")).map(|n| n.code_size), Some(40));
    let main_log = forward.edge(&NodeKey::function("main"), &NodeKey::function("log"));
    assert_eq!(main_log.map(|e| e.frequency), Some(3));
    // Each module's first function references `shared` once.
    let shared = forward.edge(&NodeKey::function("main"), &NodeKey::global("shared"));
    assert_eq!(shared.map(|e| e.frequency), Some(1));
}

#[test]
fn declared_nodes_without_edges_are_kept() {
    let facts = facts_with(&[("lonely", 12)]);
    let graph = build_weighted_graph(
        &["lonely".to_string()],
        &[],
        &facts,
        &options(4),
        &Diagnostics::new(),
    )
    .expect("build");

    assert!(graph.contains(&NodeKey::function("lonely")));
}

#[test]
fn report_lists_nodes_and_edges_with_weights() {
    let facts = facts_with(&[("A", 10), ("B", 20)]);
    let edges = vec![StructuralEdge::new("A", "B", 2)];
    let graph =
        build_weighted_graph(&[], &edges, &facts, &options(4), &Diagnostics::new()).expect("build");

    let report = graph.report();
    assert_eq!(report.nodes.len(), 2);
    assert_eq!(report.edges.len(), 1);
    assert_eq!(report.edges[0].weight, 2);
    assert_eq!(report.total_node_weight, 30);
    let json = serde_json::to_value(&report).expect("json");
    assert_eq!(json["nodes"][0]["kind"], "function");
}

#[test]
fn prefixed_symbol_names_are_stripped_exactly_once() {
    let dot = parse_call_graph_dot("digraph { Node_Node_x -> Node_y; }").expect("parse");
    let facts = facts_with(&[("Node_x", 40), ("y", 8)]);
    let diagnostics = Diagnostics::new();
    let graph = build_weighted_graph(
        &dot.nodes,
        &dot.structural_edges(FrequencyMode::Occurrence),
        &facts,
        &options(4),
        &diagnostics,
    )
    .expect("build");

    assert_eq!(graph.node(&NodeKey::function("Node_x")).map(|n| n.weight()), Some(40));
    assert!(!graph.contains(&NodeKey::function("x")));
    assert!(graph.edge(&NodeKey::function("Node_x"), &NodeKey::function("y")).is_some());
    assert!(diagnostics.is_empty());
}
