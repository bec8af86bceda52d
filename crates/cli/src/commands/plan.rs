use std::path::PathBuf;

use anyhow::{Context, Result};
use boxcut_core::analysis::{MalformedTypePolicy, UnresolvedPolicy};
use boxcut_core::config::PartitionPlan;
use boxcut_core::facts::FrequencyMode;
use clap::{Args, ValueEnum};

use crate::canonicalize_or_current;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrequencyArg {
    /// Each call edge counts the callee's in-degree in its module.
    CalleeInDegree,
    /// Each call edge counts once, or its `weight`/`count` attribute.
    Occurrence,
}

impl From<FrequencyArg> for FrequencyMode {
    fn from(arg: FrequencyArg) -> Self {
        match arg {
            FrequencyArg::CalleeInDegree => FrequencyMode::CalleeInDegree,
            FrequencyArg::Occurrence => FrequencyMode::Occurrence,
        }
    }
}

/// Inputs and cost-model settings shared by `partition` and `graph`.
///
/// Flags override the values of `--plan`.
#[derive(Args, Debug, Clone, Default)]
pub struct PlanArgs {
    /// Plan file (YAML or JSON).
    #[arg(long)]
    pub plan: Option<PathBuf>,

    /// Object file to include; repeatable.
    #[arg(long = "object")]
    pub objects: Vec<PathBuf>,

    /// Directory scanned for `*.o` files; repeatable.
    #[arg(long = "object-dir")]
    pub object_dirs: Vec<PathBuf>,

    /// Directory holding the decompiler outputs (`<obj>.c.cg.dot`, ...).
    #[arg(long)]
    pub bb_dir: Option<PathBuf>,

    /// Number of compartments.
    #[arg(short = 'k', long)]
    pub partitions: Option<usize>,

    /// Partitioner name (exact, greedy, auto).
    #[arg(long)]
    pub oracle: Option<String>,

    /// Byte cost of one pointer level.
    #[arg(long)]
    pub pointer_unit_cost: Option<u64>,

    /// Allowed overshoot of a compartment's weight over the average (0.3 = 30%).
    #[arg(long)]
    pub imbalance: Option<f64>,

    /// Give up partitioning after this many seconds.
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Loader threads (0 = one per core).
    #[arg(long)]
    pub workers: Option<usize>,

    #[arg(long, value_enum)]
    pub frequency_mode: Option<FrequencyArg>,

    /// Fail on unparseable type descriptors instead of costing them at zero.
    #[arg(long, default_value_t = false)]
    pub strict_types: bool,

    /// Drop call-graph symbols without binary facts instead of using a fallback size.
    #[arg(long, default_value_t = false)]
    pub drop_unresolved: bool,
}

impl PlanArgs {
    /// Load `--plan` (or start from defaults) and apply the flag overrides.
    pub fn resolve(&self) -> Result<PartitionPlan> {
        let mut plan = match &self.plan {
            Some(path) => PartitionPlan::load(path)
                .with_context(|| format!("Failed to load plan {}", path.display()))?,
            None => PartitionPlan::default(),
        };

        for object in &self.objects {
            plan.objects.push(canonicalize_or_current(object)?);
        }
        for dir in &self.object_dirs {
            plan.object_dirs.push(canonicalize_or_current(dir)?);
        }
        if let Some(bb_dir) = &self.bb_dir {
            plan.bb_dir = canonicalize_or_current(bb_dir)?;
        }
        if let Some(k) = self.partitions {
            plan.partitions = k;
        }
        if let Some(oracle) = &self.oracle {
            plan.oracle = oracle.clone();
        }
        if let Some(cost) = self.pointer_unit_cost {
            plan.pointer_unit_cost = cost;
        }
        if let Some(imbalance) = self.imbalance {
            plan.imbalance = imbalance;
        }
        if let Some(secs) = self.timeout_secs {
            plan.timeout_secs = Some(secs);
        }
        if let Some(workers) = self.workers {
            plan.workers = workers;
        }
        if let Some(mode) = self.frequency_mode {
            plan.frequency_mode = mode.into();
        }
        if self.strict_types {
            plan.malformed_type_policy = MalformedTypePolicy::Abort;
        }
        if self.drop_unresolved {
            plan.unresolved_policy = UnresolvedPolicy::Remove;
        }

        tracing::debug!(
            objects = plan.objects.len(),
            object_dirs = plan.object_dirs.len(),
            oracle = %plan.oracle,
            k = plan.partitions,
            "resolved plan"
        );
        plan.validate()?;
        Ok(plan)
    }
}
