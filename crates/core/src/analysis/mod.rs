//! Cost model, graph construction and boundary analysis.
//!
//! - `type_cost` turns type descriptors into boundary-crossing byte costs
//! - `call_graph` fuses structural edges and module facts into a weighted graph
//! - `boundary` finds compartment entry points for a partition assignment

pub mod boundary;
pub mod call_graph;
pub mod type_cost;

pub use boundary::{
    cut_cost, entrypoints, BoundaryAnalyzer, CompartmentManifest, CutEdge, PartitionManifest,
    UNASSIGNED,
};
pub use call_graph::{
    build_weighted_graph, BuildError, BuildOptions, CallGraphBuilder, GraphReport,
    MalformedTypePolicy, ModuleInput, Perturbations, UnresolvedPolicy, WeightedCallGraph,
    CONSTANT_GLOBAL_MULTIPLIER, DEFAULT_POINTER_UNIT_COST,
};
pub use type_cost::{
    parse_type, type_cost, TypeCostError, TypeCostEvaluator, TypeExpr, MAX_TYPE_DEPTH,
};
