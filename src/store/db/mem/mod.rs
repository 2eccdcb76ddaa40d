mod collect;
mod r#impl;

use std::{collections::HashMap, sync::Arc};

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value as JsonValue;

use crate::{
    Result,
    store::{DbCollection, DbStore, Store, data::*},
};
pub use collect::Collect;

/// Volatile store backing the run recorder and the workflow catalog.
#[derive(Debug, Clone)]
pub struct MemStore {
    workflows: Arc<Collect<Workflow>>,
    runs: Arc<Collect<Run>>,
    nodes: Arc<Collect<Node>>,
    logs: Arc<Collect<Log>>,
}

/// Record that can be filtered and ordered by its document fields.
pub trait DbDocument: Serialize + DeserializeOwned {
    /// Document key the collection keeps a lookup index for.
    const INDEX: Option<&'static str> = None;

    fn id(&self) -> &str;

    /// Value of the `INDEX` key.
    fn index_value(&self) -> &str {
        ""
    }

    fn doc(&self) -> Result<HashMap<String, JsonValue>>;
}

impl DbStore for MemStore {
    fn init(
        &self,
        s: &Store,
    ) -> Result<()> {
        s.register(self.workflows())?;
        s.register(self.runs())?;
        s.register(self.nodes())?;
        s.register(self.logs())
    }
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemStore {
    pub fn new() -> Self {
        let workflows = Collect::new("workflow");
        let runs = Collect::new("run");
        let nodes = Collect::new("node");
        let logs = Collect::new("log");

        Self {
            workflows: Arc::new(workflows),
            runs: Arc::new(runs),
            nodes: Arc::new(nodes),
            logs: Arc::new(logs),
        }
    }

    pub fn workflows(&self) -> Arc<dyn DbCollection<Item = Workflow> + Send + Sync> {
        self.workflows.clone()
    }

    pub fn runs(&self) -> Arc<dyn DbCollection<Item = Run> + Send + Sync> {
        self.runs.clone()
    }

    pub fn nodes(&self) -> Arc<dyn DbCollection<Item = Node> + Send + Sync> {
        self.nodes.clone()
    }

    pub fn logs(&self) -> Arc<dyn DbCollection<Item = Log> + Send + Sync> {
        self.logs.clone()
    }
}
