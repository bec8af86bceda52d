use std::fs;
use std::path::Path;

use boxcut::{canonicalize_or_current, emit_json};
use tempfile::tempdir;

// Both cases change the process CWD, so they share one test.
#[test]
fn canonicalize_or_current_resolves_against_cwd() {
    let original = std::env::current_dir().expect("cwd");
    let tmp = tempdir().expect("tempdir");
    let subdir = tmp.path().join("nested");
    fs::create_dir_all(&subdir).expect("create nested");
    std::env::set_current_dir(tmp.path()).expect("chdir tmp");

    let dot = canonicalize_or_current(Path::new(".")).expect("canonicalize .");
    let nested = canonicalize_or_current(Path::new("nested")).expect("canonicalize nested");
    let pending = canonicalize_or_current(Path::new("out/manifest.json")).expect("pending");

    std::env::set_current_dir(original).expect("restore cwd");

    let root = tmp.path().canonicalize().expect("canon tmp");
    assert_eq!(dot.canonicalize().expect("canon"), root);
    assert_eq!(nested, subdir.canonicalize().expect("canonicalize subdir"));
    assert!(pending.ends_with("out/manifest.json"));
    assert!(pending.is_absolute());
}

#[test]
fn canonicalize_or_current_keeps_missing_absolute_paths() {
    let tmp = tempdir().expect("tempdir");
    let missing = tmp.path().join("does-not-exist");
    assert_eq!(canonicalize_or_current(&missing).expect("path"), missing);
}

#[test]
fn emit_json_creates_parent_directories() {
    let tmp = tempdir().expect("tempdir");
    let out = tmp.path().join("a").join("b").join("value.json");

    emit_json(&serde_json::json!({ "cut": 3 }), Some(&out)).expect("emit");

    let value: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&out).expect("read")).expect("json");
    assert_eq!(value["cut"], 3);
}
