mod channel;
mod process;
mod recorder;

pub use channel::{Channel, ChannelEvent, ChannelOptions};
pub use process::{Process, WorkflowCommand};
pub use recorder::Recorder;

pub type RunId = String;
