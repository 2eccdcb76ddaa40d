//! Event types for workflow runs.
//!
//! Events are emitted while a run executes to notify subscribers
//! about state changes, completions, errors and logs.

mod node;
mod run;

pub use node::*;
pub use run::*;

use crate::{model::LogLevel, runtime::RunId, workflow::node::NodeId};

/// Generic event wrapper.
#[derive(Debug, Clone)]
pub struct Event<T> {
    inner: T,
}

/// Top-level event type for workflow graph events.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphEvent {
    /// Run-level events (started, completed, failed, cancelled).
    Run(RunEvent),
    /// Node-level events (running, succeeded, skipped, failed, etc.).
    Node(NodeEvent),
}

/// Event message containing run and node context.
#[derive(Debug, Clone)]
pub struct Message {
    /// Run that generated this event.
    pub rid: RunId,
    /// Node that generated this event (empty for run events).
    pub nid: NodeId,
    /// The actual event data.
    pub event: GraphEvent,
}

/// Log entry emitted during a run.
#[derive(Debug, Clone)]
pub struct Log {
    pub rid: RunId,
    /// empty for run-level entries
    pub nid: NodeId,
    pub level: LogLevel,
    pub content: String,
    /// Timestamp in milliseconds of the log entry.
    pub timestamp: i64,
}

impl<T> std::ops::Deref for Event<T>
where
    T: std::fmt::Debug + Clone,
{
    type Target = T;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<T> Event<T>
where
    T: std::fmt::Debug + Clone,
{
    pub fn new(inner: &T) -> Self {
        Self {
            inner: inner.clone(),
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

impl GraphEvent {
    pub fn is_complete(&self) -> bool {
        matches!(self, GraphEvent::Run(RunEvent::Completed))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, GraphEvent::Run(RunEvent::Failed(_)))
    }

    /// Any event after which the run accepts no more writes.
    pub fn is_terminal(&self) -> bool {
        matches!(self, GraphEvent::Run(RunEvent::Completed | RunEvent::Failed(_) | RunEvent::Cancelled))
    }
}
