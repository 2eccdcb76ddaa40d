mod edge;
mod node;
mod run;
mod workflow;

pub use edge::EdgeModel;
pub use node::{NodeKind, NodeModel, RetryModel};
pub use run::{LogEntry, LogLevel, Run, RunError, RunStatus};
pub use workflow::WorkflowModel;
