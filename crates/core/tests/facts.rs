use std::fs;

use boxcut_core::diagnostics::{DiagnosticKind, Diagnostics};
use boxcut_core::facts::{
    discover_objects, load_module, parse_call_graph_dot, FactsError, FrequencyMode,
    ModuleFactStore, ModuleFacts, ModuleLayout,
};
use tempfile::tempdir;

const DOT: &str = r#"
digraph "Call graph" {
    // emitted by the decompiler
    label="Call graph";
    node [shape=record];
    Node0x1 [label="{main}"];
    "Node_main" -> "Node_parse";
    Node_parse -> Node_log -> Node_write [weight=3];
    subgraph cluster_io {
        "Node_main" -> Node_log;
    }
    /* trailing block comment */
}
"#;

#[test]
fn dot_reader_strips_prefixes_and_flattens_chains() {
    let dot = parse_call_graph_dot(DOT).expect("parse");

    assert_eq!(dot.nodes, vec!["Node0x1", "main", "parse", "log", "write"]);
    let pairs: Vec<(&str, &str)> =
        dot.edges.iter().map(|e| (e.caller.as_str(), e.callee.as_str())).collect();
    assert_eq!(
        pairs,
        vec![("main", "parse"), ("parse", "log"), ("log", "write"), ("main", "log")]
    );
    assert_eq!(dot.edges[1].count, Some(3));
    assert_eq!(dot.edges[0].count, None);
}

#[test]
fn callee_in_degree_mode_weights_edges_by_callee_fan_in() {
    let dot = parse_call_graph_dot(DOT).expect("parse");
    let edges = dot.structural_edges(FrequencyMode::CalleeInDegree);

    let freq = |from: &str, to: &str| {
        edges.iter().find(|e| e.caller == from && e.callee == to).map(|e| e.frequency)
    };
    assert_eq!(freq("main", "parse"), Some(1));
    assert_eq!(freq("parse", "log"), Some(2));
    assert_eq!(freq("main", "log"), Some(2));
    assert_eq!(freq("log", "write"), Some(1));
}

#[test]
fn occurrence_mode_uses_weight_attribute_or_one() {
    let dot = parse_call_graph_dot(DOT).expect("parse");
    let edges = dot.structural_edges(FrequencyMode::Occurrence);

    let freqs: Vec<u64> = edges.iter().map(|e| e.frequency).collect();
    assert_eq!(freqs, vec![1, 3, 3, 1]);
}

#[test]
fn malformed_dot_reports_line() {
    let err = parse_call_graph_dot("digraph {\n a -> ;\n}").expect_err("bad edge");
    assert!(matches!(err, FactsError::Dot { line: 2, .. }), "{err:?}");

    assert!(parse_call_graph_dot("digraph { a -> b").is_err());
    assert!(parse_call_graph_dot("graphviz { }").is_err());
}

const FACTS_JSON: &str = r#"{
  "functions": [
    {
      "name": "encrypt",
      "startAddr": "0x1000",
      "endAddr": "0x1080",
      "returnType": { "llvmIr": "i32" },
      "parameters": [
        { "name": "buf", "realName": "buffer", "type": { "llvmIr": "i8*" } },
        { "name": "len", "type": { "llvmIr": "i64" } }
      ]
    },
    { "name": "aes_round", "startAddr": "0x1080", "endAddr": "0x10c0" }
  ],
  "globals": [
    { "name": "sbox", "type": { "llvmIr": "[256 x i8]" }, "storage": { "type": "internal" } },
    { "name": "counter", "type": { "llvmIr": "i32" }, "storage": "common", "constant": false }
  ]
}"#;

#[test]
fn module_facts_parse_addresses_types_and_storage() {
    let facts = ModuleFacts::from_json_str(FACTS_JSON).expect("facts");

    let encrypt = facts.function("encrypt").expect("encrypt");
    assert_eq!(encrypt.code_size(), 0x80);
    assert_eq!(encrypt.return_type, "i32");
    let types: Vec<&str> = encrypt.parameters.iter().map(|p| p.ty.as_str()).collect();
    assert_eq!(types, vec!["i8*", "i64"]);

    let aes = facts.function("aes_round").expect("aes_round");
    assert_eq!(aes.code_size(), 0x40);
    assert_eq!(aes.return_type, "void");

    assert_eq!(facts.global("sbox").map(|g| g.storage.as_str()), Some("internal"));
    assert_eq!(facts.global("counter").map(|g| g.storage.as_str()), Some("common"));
}

#[test]
fn bad_address_is_rejected() {
    let body = r#"{ "functions": [ { "name": "f", "startAddr": "0xZZ", "endAddr": "0x10" } ] }"#;
    let err = ModuleFacts::from_json_str(body).expect_err("bad address");
    assert!(matches!(err, FactsError::BadAddress { ref function, .. } if function == "f"));
}

#[test]
fn reference_sidecar_counts_multiplicity_and_constness() {
    let mut facts = ModuleFacts::from_json_str(FACTS_JSON).expect("facts");
    facts
        .apply_references_json(
            r#"{ "references": { "aes_round": ["sbox", "sbox", "counter"] }, "constants": ["sbox"] }"#,
        )
        .expect("refs");

    assert_eq!(facts.referencing_functions(), vec!["aes_round"]);
    assert_eq!(facts.global_references("aes_round"), vec![("counter", 1), ("sbox", 2)]);
    assert!(facts.global("sbox").map(|g| g.constant).unwrap_or(false));
    assert!(!facts.global("counter").map(|g| g.constant).unwrap_or(true));
}

#[test]
fn fact_merge_is_order_independent() {
    let mut a = ModuleFacts::from_json_str(FACTS_JSON).expect("a");
    a.apply_references_json(r#"{ "references": { "encrypt": ["counter"] } }"#).expect("refs");
    let mut b = ModuleFacts::from_json_str(
        r#"{ "functions": [ { "name": "encrypt", "startAddr": "0x0", "endAddr": "0x10" } ],
             "globals": [ { "name": "counter", "type": { "llvmIr": "i32" }, "storage": "common" } ] }"#,
    )
    .expect("b");
    b.apply_references_json(r#"{ "references": { "encrypt": ["counter"] }, "constants": ["counter"] }"#)
        .expect("refs");

    let mut ab = ModuleFacts::new();
    ab.merge(a.clone());
    ab.merge(b.clone());
    let mut ba = ModuleFacts::new();
    ba.merge(b);
    ba.merge(a);

    assert_eq!(ab, ba);
    assert_eq!(ab.function("encrypt").map(|f| f.code_size()), Some(0x80));
    assert_eq!(ab.global_references("encrypt"), vec![("counter", 2)]);
    assert!(ab.global("counter").map(|g| g.constant).unwrap_or(false));
}

#[test]
fn layout_derives_artifact_paths_from_object_name() {
    let layout = ModuleLayout::new("/work/bb", "/src/objs/crypto.o");
    assert_eq!(layout.name, "crypto.o");
    assert_eq!(layout.call_graph_path.to_string_lossy(), "/work/bb/crypto.o.c.cg.dot");
    assert_eq!(layout.facts_path.to_string_lossy(), "/work/bb/crypto.o.config.json");
    assert_eq!(layout.references_path.to_string_lossy(), "/work/bb/crypto.o.refs.json");
}

#[test]
fn discover_objects_collects_sorted_object_files() {
    let dir = tempdir().expect("tempdir");
    for name in ["b.o", "a.o", "notes.txt"] {
        fs::write(dir.path().join(name), b"").expect("write");
    }

    let objects = discover_objects(&[dir.path().to_path_buf()]).expect("discover");
    let names: Vec<String> = objects
        .iter()
        .map(|p| p.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default())
        .collect();
    assert_eq!(names, vec!["a.o", "b.o"]);

    assert!(discover_objects(&[dir.path().join("missing")]).is_err());
}

#[test]
fn load_module_reads_all_artifacts() {
    let dir = tempdir().expect("tempdir");
    let layout = ModuleLayout::new(dir.path(), "crypto.o");
    fs::write(&layout.call_graph_path, "digraph { Node_encrypt -> Node_aes_round; }").expect("dot");
    fs::write(&layout.facts_path, FACTS_JSON).expect("facts");
    fs::write(&layout.references_path, r#"{ "references": { "aes_round": ["sbox"] } }"#)
        .expect("refs");
    let diagnostics = Diagnostics::new();

    let loaded = load_module(&layout, FrequencyMode::CalleeInDegree, &diagnostics).expect("load");

    assert_eq!(loaded.input.name, "crypto.o");
    assert_eq!(loaded.input.nodes, vec!["encrypt", "aes_round"]);
    assert_eq!(loaded.input.edges.len(), 1);
    assert_eq!(loaded.input.facts.function_count(), 2);
    assert_eq!(loaded.input.facts.global_references("aes_round"), vec![("sbox", 1)]);
    assert_eq!(loaded.fingerprints.len(), 3);
    assert!(loaded.fingerprints.iter().all(|f| f.sha256.len() == 64));
    assert!(diagnostics.is_empty());
}

#[test]
fn load_module_without_facts_records_a_warning() {
    let dir = tempdir().expect("tempdir");
    let layout = ModuleLayout::new(dir.path(), "bare.o");
    fs::write(&layout.call_graph_path, "digraph { a -> b; }").expect("dot");
    let diagnostics = Diagnostics::new();

    let loaded = load_module(&layout, FrequencyMode::Occurrence, &diagnostics).expect("load");

    assert_eq!(loaded.input.facts.function_count(), 0);
    assert_eq!(loaded.fingerprints.len(), 1);
    assert!(diagnostics.has(DiagnosticKind::MissingFacts, "bare.o"));
}

#[test]
fn load_module_requires_the_call_graph() {
    let dir = tempdir().expect("tempdir");
    let layout = ModuleLayout::new(dir.path(), "missing.o");

    let err = load_module(&layout, FrequencyMode::CalleeInDegree, &Diagnostics::new())
        .expect_err("missing dot");
    assert!(matches!(err, FactsError::Io { .. }));
}

#[test]
fn load_module_wraps_parse_errors_with_the_artifact_path() {
    let dir = tempdir().expect("tempdir");
    let layout = ModuleLayout::new(dir.path(), "broken.o");
    fs::write(&layout.call_graph_path, "digraph { a -> b; }").expect("dot");
    fs::write(&layout.facts_path, "{ not json").expect("facts");

    let err = load_module(&layout, FrequencyMode::CalleeInDegree, &Diagnostics::new())
        .expect_err("bad facts");
    match err {
        FactsError::Artifact { path, source } => {
            assert_eq!(path, layout.facts_path);
            assert!(matches!(*source, FactsError::Json(_)));
        }
        other => panic!("unexpected error {other:?}"),
    }
}
