mod handler;
mod models;

pub use handler::ConditionHandler;
pub use models::{ComparisonOperator, ConditionConfig};
