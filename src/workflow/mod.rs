pub mod port;
mod workflow;

pub use port::{PortDirection, PortRef};
pub use workflow::Workflow;

/// node id
pub type NodeId = String;
