//! End-to-end run: load modules, build the graph, partition, report gates.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analysis::boundary::{BoundaryAnalyzer, PartitionManifest};
use crate::analysis::call_graph::{BuildError, CallGraphBuilder, WeightedCallGraph};
use crate::config::{ConfigError, PartitionPlan};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::facts::{
    discover_objects, load_module, sha256_hex, ArtifactFingerprint, FactsError, ModuleLayout,
};
use crate::services::partition::{
    default_oracle_registry, partition_with_timeout, OracleRegistry, PartitionError,
};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    InvalidConfiguration(#[from] ConfigError),

    #[error(transparent)]
    Facts(#[from] FactsError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Partition(#[from] PartitionError),

    #[error("Failed to start loader pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

/// Provenance of a partitioning run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub tool_version: String,
    pub plan_sha256: String,
    pub artifacts: Vec<ArtifactFingerprint>,
    pub oracle: String,
    pub partitions: usize,
    pub pointer_unit_cost: u64,
    pub started_at: String,
    pub finished_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSummary {
    pub modules: usize,
    pub nodes: usize,
    pub edges: usize,
    pub total_node_weight: u64,
}

/// Everything a run hands to compartment generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunManifest {
    pub metadata: RunMetadata,
    pub graph: GraphSummary,
    pub manifest: PartitionManifest,
    pub diagnostics: Vec<Diagnostic>,
}

/// A built graph together with what it was built from.
#[derive(Debug, Clone)]
pub struct BuiltGraph {
    pub graph: WeightedCallGraph,
    pub modules: usize,
    pub artifacts: Vec<ArtifactFingerprint>,
}

/// Coordinator for load, merge, partition and boundary analysis.
pub struct Pipeline {
    plan: PartitionPlan,
    registry: OracleRegistry,
}

impl Pipeline {
    pub fn new(plan: PartitionPlan) -> Self {
        let registry = default_oracle_registry(plan.imbalance);
        Self { plan, registry }
    }

    pub fn with_registry(plan: PartitionPlan, registry: OracleRegistry) -> Self {
        Self { plan, registry }
    }

    pub fn plan(&self) -> &PartitionPlan {
        &self.plan
    }

    /// Explicit objects plus everything found in `object_dirs`, deduplicated.
    ///
    /// Artifacts are keyed by the object's file name, so two distinct objects
    /// sharing one are rejected.
    pub fn resolve_objects(&self) -> Result<Vec<PathBuf>, PipelineError> {
        let mut objects: BTreeSet<PathBuf> = self.plan.objects.iter().cloned().collect();
        objects.extend(discover_objects(&self.plan.object_dirs)?);
        if objects.is_empty() {
            return Err(ConfigError::Invalid("no object files found".to_string()).into());
        }

        let mut by_name: BTreeMap<String, PathBuf> = BTreeMap::new();
        for object in objects {
            let name = ModuleLayout::module_name(&object);
            match by_name.get(&name) {
                Some(kept) if same_file(kept, &object) => {
                    tracing::debug!(object = %object.display(), "object listed twice");
                }
                Some(kept) => {
                    return Err(ConfigError::Invalid(format!(
                        "objects {} and {} share the module name {name}",
                        kept.display(),
                        object.display()
                    ))
                    .into());
                }
                None => {
                    by_name.insert(name, object);
                }
            }
        }
        Ok(by_name.into_values().collect())
    }

    /// Load every module on the worker pool and merge into one graph.
    pub fn build_graph(&self, diagnostics: &Diagnostics) -> Result<BuiltGraph, PipelineError> {
        self.plan.validate()?;
        let layouts: Vec<ModuleLayout> = self
            .resolve_objects()?
            .iter()
            .map(|object| ModuleLayout::new(&self.plan.bb_dir, object))
            .collect();

        let pool = rayon::ThreadPoolBuilder::new().num_threads(self.plan.workers).build()?;
        let builder = Mutex::new(CallGraphBuilder::new(self.plan.build_options()));
        let mode = self.plan.frequency_mode;

        let fingerprints: Vec<Vec<ArtifactFingerprint>> = pool.install(|| {
            layouts
                .par_iter()
                .map(|layout| {
                    let loaded = load_module(layout, mode, diagnostics)?;
                    builder.lock().merge_module(loaded.input);
                    Ok(loaded.fingerprints)
                })
                .collect::<Result<Vec<_>, FactsError>>()
        })?;

        let mut artifacts: Vec<ArtifactFingerprint> = fingerprints.into_iter().flatten().collect();
        artifacts.sort_by(|a, b| a.path.cmp(&b.path));

        let builder = builder.into_inner();
        tracing::info!(modules = builder.module_count(), "modules merged");
        let graph = builder.finish(diagnostics)?;

        Ok(BuiltGraph { graph, modules: builder.module_count(), artifacts })
    }

    /// Full run: build, partition with the configured oracle, find gates.
    pub fn run(&self) -> Result<RunManifest, PipelineError> {
        let span = tracing::info_span!(
            "partition_run",
            oracle = %self.plan.oracle,
            k = self.plan.partitions
        );
        let _guard = span.enter();

        let started_at = Utc::now().to_rfc3339();
        let plan_sha256 = sha256_hex(&self.plan.to_canonical_json()?);
        let diagnostics = Diagnostics::new();

        let built = self.build_graph(&diagnostics)?;
        let oracle = self.registry.resolve(&self.plan.oracle)?;
        let input = Arc::new(built.graph.partition_input());
        tracing::info!(
            vertices = input.node_count(),
            edges = input.edge_count(),
            "partitioning"
        );
        let partitioning =
            partition_with_timeout(oracle, input, self.plan.partitions, self.plan.timeout())?;

        let analyzer = BoundaryAnalyzer::from_partitioning(&built.graph, &partitioning);
        let manifest = analyzer.manifest(self.plan.partitions);
        tracing::info!(
            cut_cost = manifest.total_cut_cost,
            gates = manifest.entry_points().len(),
            "partitioning complete"
        );

        Ok(RunManifest {
            metadata: RunMetadata {
                tool_version: crate::version().to_string(),
                plan_sha256,
                artifacts: built.artifacts,
                oracle: self.plan.oracle.clone(),
                partitions: self.plan.partitions,
                pointer_unit_cost: self.plan.pointer_unit_cost,
                started_at,
                finished_at: Utc::now().to_rfc3339(),
            },
            graph: GraphSummary {
                modules: built.modules,
                nodes: built.graph.node_count(),
                edges: built.graph.edge_count(),
                total_node_weight: built.graph.total_node_weight(),
            },
            manifest,
            diagnostics: diagnostics.into_sorted(),
        })
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
