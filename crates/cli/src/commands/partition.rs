use std::path::Path;

use anyhow::{Context, Result};
use boxcut_core::services::{Pipeline, RunManifest};

use crate::commands::PlanArgs;
use crate::emit_json;

/// Build the graph, partition it and report the compartment gates.
pub fn partition_command(args: &PlanArgs, out: Option<&Path>, summary: bool) -> Result<()> {
    let plan = args.resolve()?;
    let manifest = Pipeline::new(plan).run().context("Partitioning failed")?;

    if summary {
        print_summary(&manifest);
        if let Some(path) = out {
            emit_json(&manifest, Some(path))?;
        }
        Ok(())
    } else {
        emit_json(&manifest, out)
    }
}

fn print_summary(manifest: &RunManifest) {
    let meta = &manifest.metadata;
    println!(
        "Partitioned {} nodes into {} compartments (oracle: {})",
        manifest.graph.nodes, meta.partitions, meta.oracle
    );
    println!("Total cut cost: {}", manifest.manifest.total_cut_cost);
    for part in &manifest.manifest.partitions {
        let gates: Vec<String> = part.entry_points.iter().map(|k| k.to_string()).collect();
        println!(
            "Compartment {}: {} nodes, weight {}, entry points: {}",
            part.index,
            part.node_count(),
            part.weight,
            if gates.is_empty() { "-".to_string() } else { gates.join(", ") }
        );
    }
    if !manifest.diagnostics.is_empty() {
        println!("Warnings: {}", manifest.diagnostics.len());
    }
}
