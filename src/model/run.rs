use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{HandlerErrorKind, workflow::node::NodeState};

/// Lifecycle of a run: `pending -> running -> {completed | failed | cancelled}`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr, strum::Display, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    /// Terminal statuses are absorbing.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, strum::AsRefStr, strum::Display, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// position in the run's log, starting at 1
    pub seq: u64,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    pub level: LogLevel,
    pub message: String,
}

/// The handler failure that ended a run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunError {
    pub node_id: String,
    pub kind: HandlerErrorKind,
    pub message: String,
}

impl std::fmt::Display for RunError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "HandlerFailed: {}: {}", self.kind, self.message)
    }
}

/// One execution of a workflow from a chosen trigger, as seen by the query surface.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    pub id: String,
    pub workflow_id: String,
    pub trigger_id: String,
    pub status: RunStatus,
    pub started_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
    pub logs: Vec<LogEntry>,
    /// final state of every participating node
    pub nodes: BTreeMap<String, NodeState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RunError>,
}

impl Run {
    pub fn node_state(
        &self,
        nid: &str,
    ) -> Option<NodeState> {
        self.nodes.get(nid).copied()
    }

    /// Log entries emitted for one node, in order.
    pub fn logs_for<'a>(
        &'a self,
        nid: &'a str,
    ) -> impl Iterator<Item = &'a LogEntry> + 'a {
        self.logs.iter().filter(move |l| l.node_id.as_deref() == Some(nid))
    }
}
