//! # Relayflow
//!
//! Relayflow is the graph model and execution engine behind a visual workflow
//! builder. A workflow is a directed acyclic graph of trigger, action and
//! logic nodes; the engine validates it, walks it from one chosen trigger and
//! records every run as an auditable log.
//!
//! ## Core Features
//!
//! - **Validated graphs**: schema, dangling edge, port, cycle and reachability
//!   checks that report every problem at once
//! - **Conditional branching**: `logic.if` nodes take exactly one output port
//! - **Loops**: `logic.loop` nodes re-run their body once per item
//! - **Pluggable handlers**: node kinds map to handlers; messaging and model
//!   clients are injected
//! - **Run records**: ordered logs, node states and results behind a query surface
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use relayflow::{EngineBuilder, RunQuery, WorkflowModel};
//!
//! let engine = EngineBuilder::new().messaging_client(client).build()?;
//! engine.launch();
//!
//! let workflow = WorkflowModel::from_json(json_str)?;
//! let run = engine.run(&workflow, "start", serde_json::json!({"status": "active"})).await?;
//! for entry in engine.get_run(&run.id)?.logs {
//!     println!("{} {}", entry.seq, entry.message);
//! }
//! ```

mod builder;
pub mod clients;
mod common;
mod config;
mod dispatcher;
mod engine;
mod error;
pub mod events;
mod model;
mod runtime;
pub mod store;
mod utils;
pub mod workflow;

use std::sync::{Arc, RwLock};

pub use builder::EngineBuilder;
pub use common::Vars;
pub use config::Config;
pub use engine::Engine;
pub use error::{HandlerErrorKind, RelayflowError};
pub use model::*;
pub use runtime::{Channel, ChannelEvent, ChannelOptions, Process, RunId};
pub use store::RunQuery;
pub use workflow::{
    ValidationResult, Violation, ViolationKind,
    handlers::{Handler, HandlerOutcome, HandlerRegistry},
    node::NodeState,
    validate,
};

/// Result type alias for Relayflow operations.
pub type Result<T> = std::result::Result<T, RelayflowError>;

/// Thread-safe shared lock wrapper using Arc<RwLock<T>>.
pub(crate) type ShareLock<T> = Arc<RwLock<T>>;
