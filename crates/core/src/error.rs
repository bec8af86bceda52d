//! Error types of every stage, in one place for frontends.

pub use crate::analysis::call_graph::BuildError;
pub use crate::analysis::type_cost::TypeCostError;
pub use crate::config::ConfigError;
pub use crate::facts::FactsError;
pub use crate::services::partition::PartitionError;
pub use crate::services::pipeline::PipelineError;
