//! boxcut-core
//!
//! Weighted call-graph construction and cost model for automatic
//! compartmentalization of native programs.
//!
//! Structural call graphs and per-module binary facts are merged into one
//! weighted graph of functions and globals, split into `k` compartments by a
//! pluggable partitioner, and the resulting cross-compartment edges are turned
//! into per-compartment entry-point (gate) sets.
//!
//! All substantive logic lives here so it is testable and reusable from
//! frontends other than the CLI.

pub mod model;
pub mod analysis;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod facts;
pub mod services;

/// Returns the library version as encoded at compile time.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
