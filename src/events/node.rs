use std::fmt;

use crate::HandlerErrorKind;

#[derive(Debug, Clone, PartialEq)]
pub enum NodeEvent {
    Running(i64),
    Succeeded(i64),
    Skipped,
    Failed(ErrorReason),
    /// attempt number of the retry about to start
    Retry(u64),
    /// loop iteration about to start, counted from 0
    Iteration(usize),
}

impl NodeEvent {
    pub fn str(&self) -> &str {
        match self {
            NodeEvent::Running(_) => "Running",
            NodeEvent::Succeeded(_) => "Succeeded",
            NodeEvent::Skipped => "Skipped",
            NodeEvent::Failed(_) => "Failed",
            NodeEvent::Retry(_) => "Retry",
            NodeEvent::Iteration(_) => "Iteration",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ErrorReason {
    pub kind: HandlerErrorKind,
    pub message: String,
}

impl fmt::Display for ErrorReason {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}
