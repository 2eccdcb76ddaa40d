//! Workflow edge definitions for connecting nodes.
//!
//! An edge carries one output port of its source node to its target.
//! Only `logic.if` uses more than one port (0 = false branch, 1 = true branch).

use serde::{Deserialize, Serialize};

use crate::{model::EdgeModel, workflow::node::NodeId};

/// Output port of a node.
pub type Port = u32;

/// Runtime edge representation connecting two nodes.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub source: NodeId,
    pub port: Port,
    pub target: NodeId,
}

impl From<&EdgeModel> for Edge {
    fn from(model: &EdgeModel) -> Self {
        Self {
            source: model.source.clone(),
            port: model.source_port,
            target: model.target.clone(),
        }
    }
}
