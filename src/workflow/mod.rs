pub mod consts;
pub mod edge;
pub mod handlers;
pub mod node;
pub mod template;
pub mod validator;
mod workflow;

pub use validator::{ValidationResult, Violation, ViolationKind, validate};
pub use workflow::{LoopBody, Workflow};
