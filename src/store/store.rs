use std::{
    any::Any,
    collections::{BTreeMap, HashMap},
    convert::AsRef,
    sync::{Arc, RwLock},
};

use tracing::trace;

use crate::{
    RelayflowError, Result, ShareLock,
    model::{self, LogEntry, RunError, RunStatus, WorkflowModel},
    workflow::node::NodeState,
    utils,
};

use super::{DbCollection, DbCollectionIden, DbStore, MemStore, StoreIden, data::*, query::Query};

// upper bound for one run's logs or node records in a single query
const RUN_RECORD_LIMIT: usize = 1_000_000;

#[derive(Clone)]
pub struct DynDbSetRef<T>(Arc<dyn DbCollection<Item = T>>);

pub struct Store {
    collections: ShareLock<HashMap<StoreIden, Arc<dyn Any + Send + Sync + 'static>>>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Self {
            collections: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Store with every collection kept in memory.
    pub fn memory() -> Result<Self> {
        let store = Self::new();
        MemStore::new().init(&store)?;
        Ok(store)
    }

    pub fn collection<DATA>(&self) -> Result<Arc<dyn DbCollection<Item = DATA>>>
    where
        DATA: DbCollectionIden + Send + Sync + 'static,
    {
        let iden = DATA::iden();
        let collections = self.collections.read().map_err(|e| RelayflowError::Store(e.to_string()))?;
        collections
            .get(&iden)
            .and_then(|collection| collection.downcast_ref::<DynDbSetRef<DATA>>())
            .map(|v| v.0.clone())
            .ok_or_else(|| RelayflowError::Store(format!("collection {} is not registered", iden.as_ref())))
    }

    pub fn register<DATA>(
        &self,
        collection: Arc<dyn DbCollection<Item = DATA> + Send + Sync + 'static>,
    ) -> Result<()>
    where
        DATA: DbCollectionIden + 'static,
    {
        let mut collections = self.collections.write().map_err(|e| RelayflowError::Store(e.to_string()))?;
        collections.insert(DATA::iden(), Arc::new(DynDbSetRef::<DATA>(collection)));
        Ok(())
    }

    pub fn workflows(&self) -> Result<Arc<dyn DbCollection<Item = Workflow>>> {
        self.collection()
    }

    pub fn runs(&self) -> Result<Arc<dyn DbCollection<Item = Run>>> {
        self.collection()
    }

    pub fn nodes(&self) -> Result<Arc<dyn DbCollection<Item = Node>>> {
        self.collection()
    }

    pub fn logs(&self) -> Result<Arc<dyn DbCollection<Item = Log>>> {
        self.collection()
    }

    /// Add a workflow to the catalog or replace the deployed version.
    pub fn deploy(
        &self,
        workflow: &WorkflowModel,
    ) -> Result<bool> {
        trace!("store::deploy({})", workflow.id);
        if workflow.id.is_empty() {
            return Err(RelayflowError::Store("missing id in workflow".into()));
        }
        let text = workflow.to_json()?;
        let workflows = self.workflows()?;
        match workflows.find(&workflow.id) {
            Ok(m) => {
                let data = Workflow {
                    id: workflow.id.clone(),
                    name: workflow.name.clone(),
                    desc: workflow.description.clone(),
                    data: text,
                    create_time: m.create_time,
                    update_time: utils::time::time_millis(),
                };
                workflows.update(&data)
            }
            Err(_) => {
                let data = Workflow {
                    id: workflow.id.clone(),
                    name: workflow.name.clone(),
                    desc: workflow.description.clone(),
                    data: text,
                    create_time: utils::time::time_millis(),
                    update_time: 0,
                };
                workflows.create(&data)
            }
        }
    }

    /// Deployed workflow by id. The returned model is a copy.
    pub fn find_workflow(
        &self,
        wid: &str,
    ) -> Result<WorkflowModel> {
        let data = self.workflows()?.find(wid)?;
        WorkflowModel::from_json(&data.data)
    }

    fn assemble(
        &self,
        run: Run,
    ) -> Result<model::Run> {
        let logs = self
            .logs()?
            .query(&Query::new().push("rid", run.id.as_str()).set_order("seq", false).set_limit(RUN_RECORD_LIMIT))?
            .rows
            .into_iter()
            .map(|l| LogEntry {
                seq: l.seq,
                timestamp: l.timestamp,
                node_id: if l.nid.is_empty() { None } else { Some(l.nid) },
                level: l.level.parse().unwrap_or_default(),
                message: l.content,
            })
            .collect();

        let mut nodes = BTreeMap::new();
        for n in self.nodes()?.query(&Query::new().push("rid", run.id.as_str()).set_limit(RUN_RECORD_LIMIT))?.rows {
            let state: NodeState = n.state.parse().map_err(|_| RelayflowError::Store(format!("invalid node state '{}'", n.state)))?;
            nodes.insert(n.nid, state);
        }

        let status: RunStatus = run.state.parse().map_err(|_| RelayflowError::Store(format!("invalid run state '{}'", run.state)))?;
        let result = run.result.as_deref().map(serde_json::from_str::<serde_json::Value>).transpose()?;
        let error = run.err.as_deref().map(serde_json::from_str::<RunError>).transpose()?;

        Ok(model::Run {
            id: run.id,
            workflow_id: run.wid,
            trigger_id: run.tid,
            status,
            started_at: run.start_time,
            completed_at: if run.end_time > 0 { Some(run.end_time) } else { None },
            logs,
            nodes,
            result,
            error,
        })
    }
}

/// Read-only query surface over recorded runs.
pub trait RunQuery {
    /// Run by id, with its logs in order and its node states.
    fn get_run(
        &self,
        id: &str,
    ) -> Result<model::Run>;

    /// Runs of a workflow ordered by start time.
    fn list_runs_for_workflow(
        &self,
        wid: &str,
    ) -> Result<Vec<model::Run>>;
}

impl RunQuery for Store {
    fn get_run(
        &self,
        id: &str,
    ) -> Result<model::Run> {
        let run = self.runs()?.find(id)?;
        self.assemble(run)
    }

    fn list_runs_for_workflow(
        &self,
        wid: &str,
    ) -> Result<Vec<model::Run>> {
        let runs = self.runs()?.query(&Query::new().push("wid", wid).set_order("start_time", false).set_limit(RUN_RECORD_LIMIT))?.rows;
        if runs.is_empty() && !self.workflows()?.exists(wid)? {
            return Err(RelayflowError::NotFound(format!("workflow {}", wid)));
        }
        runs.into_iter().map(|run| self.assemble(run)).collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn run(
        id: &str,
        wid: &str,
        start_time: i64,
    ) -> Run {
        Run {
            id: id.to_string(),
            wid: wid.to_string(),
            tid: "start".to_string(),
            state: "completed".to_string(),
            start_time,
            end_time: start_time + 5,
            result: Some("{\"ok\":true}".to_string()),
            err: None,
            timestamp: start_time,
        }
    }

    #[test]
    fn test_deploy_and_find() {
        let store = Store::memory().unwrap();
        let model = WorkflowModel {
            id: "wf".to_string(),
            name: "first".to_string(),
            ..Default::default()
        };
        assert!(store.deploy(&model).unwrap());

        let mut changed = model.clone();
        changed.name = "second".to_string();
        assert!(store.deploy(&changed).unwrap());
        assert_eq!(store.find_workflow("wf").unwrap().name, "second");
        assert!(matches!(store.find_workflow("nope"), Err(RelayflowError::NotFound(_))));
    }

    #[test]
    fn test_unregistered_collection_is_store_error() {
        let store = Store::new();
        assert!(matches!(store.runs(), Err(RelayflowError::Store(_))));
        assert!(matches!(store.get_run("r1"), Err(RelayflowError::Store(_))));
    }

    #[test]
    fn test_runs_for_workflow_in_start_order() {
        let store = Store::memory().unwrap();
        store.runs().unwrap().create(&run("r2", "wf", 20)).unwrap();
        store.runs().unwrap().create(&run("r1", "wf", 10)).unwrap();
        store.runs().unwrap().create(&run("r3", "other", 5)).unwrap();

        let runs = store.list_runs_for_workflow("wf").unwrap();
        assert_eq!(runs.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(), vec!["r1", "r2"]);
        assert_eq!(runs[0].status, RunStatus::Completed);
        assert_eq!(runs[0].result, Some(serde_json::json!({"ok": true})));
        assert_eq!(runs[0].completed_at, Some(15));

        assert!(matches!(store.list_runs_for_workflow("missing"), Err(RelayflowError::NotFound(_))));
        assert!(matches!(store.get_run("missing"), Err(RelayflowError::NotFound(_))));
    }
}
