mod log;
mod node;
mod run;
mod workflow;

pub use log::Log;
pub use node::Node;
pub use run::Run;
pub use workflow::Workflow;
