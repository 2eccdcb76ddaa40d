mod arena;
mod dispatcher;

pub use dispatcher::{DispatchOptions, Dispatcher};
