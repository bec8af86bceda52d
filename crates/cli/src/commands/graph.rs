use std::path::Path;

use anyhow::{Context, Result};
use boxcut_core::analysis::GraphReport;
use boxcut_core::diagnostics::{Diagnostic, Diagnostics};
use boxcut_core::facts::ArtifactFingerprint;
use boxcut_core::services::Pipeline;
use serde::Serialize;

use crate::commands::PlanArgs;
use crate::emit_json;

#[derive(Serialize)]
pub struct GraphSnapshot {
    pub modules: usize,
    pub graph: GraphReport,
    pub artifacts: Vec<ArtifactFingerprint>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Build the weighted graph without partitioning it.
pub fn graph_command(args: &PlanArgs, out: Option<&Path>) -> Result<()> {
    let plan = args.resolve()?;
    let diagnostics = Diagnostics::new();
    let built = Pipeline::new(plan)
        .build_graph(&diagnostics)
        .context("Failed to build the weighted call graph")?;

    let snapshot = GraphSnapshot {
        modules: built.modules,
        graph: built.graph.report(),
        artifacts: built.artifacts,
        diagnostics: diagnostics.into_sorted(),
    };
    emit_json(&snapshot, out)
}
