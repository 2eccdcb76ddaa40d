use super::edge::Port;

/// `logic.if` port taken when the condition does not hold.
pub const FALSE_PORT: Port = 0;
/// `logic.if` port taken when the condition holds.
pub const TRUE_PORT: Port = 1;

/// Variable name a loop binds each element to when none is configured.
pub const DEFAULT_ITEM_VARIABLE: &str = "item";
/// Longest output summary written to a run log entry.
pub const LOG_SUMMARY_LIMIT: usize = 200;
