//! Partition plan: which objects to load and how to weigh and split them.
//!
//! Plans are YAML (`.yaml`/`.yml`) or JSON (`.json`). Relative paths inside a
//! plan file are resolved against the file's directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analysis::call_graph::{
    BuildOptions, MalformedTypePolicy, Perturbations, UnresolvedPolicy, DEFAULT_POINTER_UNIT_COST,
};
use crate::facts::FrequencyMode;
use crate::model::{EdgeKind, NodeKey, NodeKind};
use crate::services::partition::DEFAULT_IMBALANCE;

pub const DEFAULT_BB_DIR: &str = "bb";
pub const DEFAULT_ORACLE: &str = "auto";
pub const DEFAULT_PARTITIONS: usize = 2;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read plan {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML plan: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid JSON plan: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported plan format for {0} (expected .yaml, .yml or .json)")]
    UnsupportedFormat(PathBuf),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Bias on one node's weight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodePerturbation {
    pub name: String,
    #[serde(default = "default_node_kind")]
    pub kind: NodeKind,
    pub bias: i64,
}

/// Bias on one edge's weight. A `data_reference` edge points at a global.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgePerturbation {
    pub from: String,
    pub to: String,
    #[serde(default = "default_edge_kind")]
    pub kind: EdgeKind,
    pub bias: i64,
}

fn default_node_kind() -> NodeKind {
    NodeKind::Function
}

fn default_edge_kind() -> EdgeKind {
    EdgeKind::Call
}

fn default_bb_dir() -> PathBuf {
    PathBuf::from(DEFAULT_BB_DIR)
}

fn default_partitions() -> usize {
    DEFAULT_PARTITIONS
}

fn default_pointer_unit_cost() -> u64 {
    DEFAULT_POINTER_UNIT_COST
}

fn default_oracle() -> String {
    DEFAULT_ORACLE.to_string()
}

fn default_imbalance() -> f64 {
    DEFAULT_IMBALANCE
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionPlan {
    /// Object files to compartmentalize.
    #[serde(default)]
    pub objects: Vec<PathBuf>,
    /// Directories scanned for `*.o` files.
    #[serde(default)]
    pub object_dirs: Vec<PathBuf>,
    /// Work directory holding the decompiler outputs.
    #[serde(default = "default_bb_dir")]
    pub bb_dir: PathBuf,
    /// Number of compartments (`k`).
    #[serde(default = "default_partitions")]
    pub partitions: usize,
    #[serde(default = "default_pointer_unit_cost")]
    pub pointer_unit_cost: u64,
    /// Registered partitioner name.
    #[serde(default = "default_oracle")]
    pub oracle: String,
    #[serde(default = "default_imbalance")]
    pub imbalance: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Loader threads; 0 uses one per core.
    #[serde(default)]
    pub workers: usize,
    #[serde(default)]
    pub frequency_mode: FrequencyMode,
    #[serde(default)]
    pub malformed_type_policy: MalformedTypePolicy,
    #[serde(default)]
    pub unresolved_policy: UnresolvedPolicy,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub node_perturbations: Vec<NodePerturbation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edge_perturbations: Vec<EdgePerturbation>,
}

impl Default for PartitionPlan {
    fn default() -> Self {
        Self {
            objects: Vec::new(),
            object_dirs: Vec::new(),
            bb_dir: default_bb_dir(),
            partitions: DEFAULT_PARTITIONS,
            pointer_unit_cost: DEFAULT_POINTER_UNIT_COST,
            oracle: default_oracle(),
            imbalance: DEFAULT_IMBALANCE,
            timeout_secs: None,
            workers: 0,
            frequency_mode: FrequencyMode::default(),
            malformed_type_policy: MalformedTypePolicy::default(),
            unresolved_policy: UnresolvedPolicy::default(),
            node_perturbations: Vec::new(),
            edge_perturbations: Vec::new(),
        }
    }
}

impl PartitionPlan {
    /// Load a plan file, picking the format from its extension.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let body = fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        let ext = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
        let mut plan = match ext.as_deref() {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&body)?,
            Some("json") => Self::from_json_str(&body)?,
            _ => return Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        };
        if let Some(base) = path.parent() {
            plan.resolve_relative_to(base);
        }
        Ok(plan)
    }

    pub fn from_yaml_str(body: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(body)?)
    }

    pub fn from_json_str(body: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(body)?)
    }

    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Canonical JSON encoding, used for fingerprinting the plan.
    pub fn to_canonical_json(&self) -> Result<Vec<u8>, ConfigError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Make relative input paths relative to `base` instead of the CWD.
    pub fn resolve_relative_to(&mut self, base: &Path) {
        let rebase = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        self.objects.iter_mut().for_each(rebase);
        self.object_dirs.iter_mut().for_each(rebase);
        rebase(&mut self.bb_dir);
    }

    /// Reject plans that cannot produce a run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.objects.is_empty() && self.object_dirs.is_empty() {
            return Err(ConfigError::Invalid(
                "no input objects or object directories given".to_string(),
            ));
        }
        if self.partitions == 0 {
            return Err(ConfigError::Invalid("partitions must be at least 1".to_string()));
        }
        if !self.imbalance.is_finite() || self.imbalance < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "imbalance must be a non-negative number, got {}",
                self.imbalance
            )));
        }
        if self.timeout_secs == Some(0) {
            return Err(ConfigError::Invalid("timeout_secs must be positive".to_string()));
        }
        if self.oracle.trim().is_empty() {
            return Err(ConfigError::Invalid("oracle name is empty".to_string()));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Cost-model options derived from the plan.
    pub fn build_options(&self) -> BuildOptions {
        let mut perturbations = Perturbations::default();
        for p in &self.node_perturbations {
            let key = match p.kind {
                NodeKind::Function => NodeKey::function(&p.name),
                NodeKind::GlobalVariable => NodeKey::global(&p.name),
            };
            perturbations.nodes.insert(key, p.bias);
        }
        for p in &self.edge_perturbations {
            let to = match p.kind {
                EdgeKind::Call => NodeKey::function(&p.to),
                EdgeKind::DataReference => NodeKey::global(&p.to),
            };
            perturbations.edges.insert((NodeKey::function(&p.from), to), p.bias);
        }

        BuildOptions {
            pointer_unit_cost: self.pointer_unit_cost,
            malformed_type_policy: self.malformed_type_policy,
            unresolved_policy: self.unresolved_policy,
            perturbations,
        }
    }

    /// Starter plan written by `boxcut init-plan`.
    pub fn template() -> Self {
        Self { object_dirs: vec![PathBuf::from("objs")], ..Self::default() }
    }
}
