//! The compiled graph artifact. Shapes here are wire-exact for the external
//! runtime's workflow-creation endpoint; the sequence model never leaks
//! runtime syntax, and this module never interprets sequence semantics.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A lowered sequence: ordered nodes plus a connection map from node id to
/// successor targets. Connections use a `BTreeMap` so serialization is
/// deterministic and compile-twice diffs stay clean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowGraph {
    pub name: String,
    pub nodes: Vec<GraphNode>,
    pub connections: BTreeMap<String, NodeConnections>,
}

impl WorkflowGraph {
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Successor node ids of `id`, in connection order.
    pub fn successors(&self, id: &str) -> Vec<&str> {
        self.connections
            .get(id)
            .map(|c| {
                c.main
                    .iter()
                    .flatten()
                    .map(|t| t.node.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub position: [f64; 2],
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Trigger,
    MessageSend,
    Condition,
    TaskCreate,
    Wait,
}

/// Outgoing connections of one node. The runtime groups edges under a
/// `main` output with one target list per output slot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeConnections {
    pub main: Vec<Vec<ConnectionTarget>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionTarget {
    pub node: String,
    #[serde(rename = "type")]
    pub connection_type: String,
    pub index: u32,
}

impl ConnectionTarget {
    pub fn main(node: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            connection_type: "main".to_string(),
            index: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_wire_shape() {
        let mut graph = WorkflowGraph {
            name: "g".into(),
            nodes: vec![],
            connections: BTreeMap::new(),
        };
        graph.connections.insert(
            "node_1".into(),
            NodeConnections {
                main: vec![vec![ConnectionTarget::main("node_2")]],
            },
        );

        let json = serde_json::to_value(&graph).unwrap();
        assert_eq!(
            json["connections"]["node_1"]["main"][0][0],
            serde_json::json!({"node": "node_2", "type": "main", "index": 0})
        );
    }
}
