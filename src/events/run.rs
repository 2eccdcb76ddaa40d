use crate::{model::RunError, workflow::node::NodeId};

#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    Started(RunStartedEvent),
    Completed,
    Failed(RunError),
    Cancelled,
}

impl RunEvent {
    pub fn str(&self) -> &str {
        match self {
            RunEvent::Started(_) => "Running",
            RunEvent::Completed => "Completed",
            RunEvent::Failed(_) => "Failed",
            RunEvent::Cancelled => "Cancelled",
        }
    }
}

/// Event emitted when a run starts
#[derive(Debug, Clone, PartialEq)]
pub struct RunStartedEvent {
    pub trigger: NodeId,
    /// participating node ids for batch initialization
    pub node_ids: Vec<NodeId>,
}
