//! Reads one module's artifacts from disk and fingerprints them.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::analysis::call_graph::ModuleInput;
use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::facts::{parse_call_graph_dot, FactsError, FrequencyMode, ModuleFacts, ModuleLayout};

/// SHA-256 of one artifact that went into a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactFingerprint {
    pub path: String,
    pub sha256: String,
}

/// A module's artifacts, parsed and ready to merge.
#[derive(Debug, Clone)]
pub struct LoadedModule {
    pub input: ModuleInput,
    pub fingerprints: Vec<ArtifactFingerprint>,
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn read_artifact(path: &Path) -> Result<Option<String>, FactsError> {
    match fs::read_to_string(path) {
        Ok(body) => Ok(Some(body)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(source) => Err(FactsError::Io { path: path.to_path_buf(), source }),
    }
}

fn in_artifact(path: &Path) -> impl FnOnce(FactsError) -> FactsError + '_ {
    move |source| FactsError::Artifact { path: path.to_path_buf(), source: Box::new(source) }
}

/// Read and parse the artifacts of one object file.
///
/// The call graph is required. A missing facts file leaves every symbol of
/// the module unresolved (recorded as `MissingFacts`); a missing reference
/// sidecar means the module records no global references.
pub fn load_module(
    layout: &ModuleLayout,
    mode: FrequencyMode,
    diagnostics: &Diagnostics,
) -> Result<LoadedModule, FactsError> {
    let mut fingerprints = Vec::new();

    let dot_body = read_artifact(&layout.call_graph_path)?.ok_or_else(|| FactsError::Io {
        path: layout.call_graph_path.clone(),
        source: std::io::Error::new(ErrorKind::NotFound, "call graph not found"),
    })?;
    fingerprints.push(ArtifactFingerprint {
        path: layout.call_graph_path.display().to_string(),
        sha256: sha256_hex(dot_body.as_bytes()),
    });
    let dot = parse_call_graph_dot(&dot_body).map_err(in_artifact(&layout.call_graph_path))?;

    let mut facts = match read_artifact(&layout.facts_path)? {
        Some(body) => {
            fingerprints.push(ArtifactFingerprint {
                path: layout.facts_path.display().to_string(),
                sha256: sha256_hex(body.as_bytes()),
            });
            ModuleFacts::from_json_str(&body).map_err(in_artifact(&layout.facts_path))?
        }
        None => {
            diagnostics.warn(
                DiagnosticKind::MissingFacts,
                layout.name.clone(),
                format!("No module facts at {}", layout.facts_path.display()),
            );
            ModuleFacts::new()
        }
    };

    if let Some(body) = read_artifact(&layout.references_path)? {
        fingerprints.push(ArtifactFingerprint {
            path: layout.references_path.display().to_string(),
            sha256: sha256_hex(body.as_bytes()),
        });
        facts.apply_references_json(&body).map_err(in_artifact(&layout.references_path))?;
    }

    tracing::debug!(
        module = %layout.name,
        nodes = dot.nodes.len(),
        edges = dot.edges.len(),
        functions = facts.function_count(),
        globals = facts.global_count(),
        "loaded module artifacts"
    );

    Ok(LoadedModule {
        input: ModuleInput {
            name: layout.name.clone(),
            nodes: dot.nodes.clone(),
            edges: dot.structural_edges(mode),
            facts,
        },
        fingerprints,
    })
}
