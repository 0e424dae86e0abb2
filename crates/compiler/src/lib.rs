//! Workflow graph compiler — lowers a validated sequence into the portable
//! node/edge artifact the external automation runtime consumes.

pub mod graph;
pub mod lower;

pub use graph::{ConnectionTarget, GraphNode, NodeConnections, NodeType, WorkflowGraph};
pub use lower::compile;
