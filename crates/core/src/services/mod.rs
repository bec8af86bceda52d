//! Partitioning services: the oracle contract, built-in oracles and the
//! end-to-end pipeline.

pub mod oracles;
pub mod partition;
pub mod pipeline;

pub use partition::{
    default_oracle_registry, partition_with_timeout, validate_partitioning, OracleRegistry,
    PartitionError, PartitionGraph, PartitionOracle, Partitioning,
};
pub use pipeline::{Pipeline, PipelineError, RunManifest};
