pub mod graph;
pub mod init;
pub mod partition;
pub mod plan;
pub mod type_cost;

pub use graph::*;
pub use init::*;
pub use partition::*;
pub use plan::*;
pub use type_cost::*;
