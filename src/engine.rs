//! Workflow engine - the main entry point for Relayflow.
//!
//! The engine manages the lifecycle of workflows and runs, including:
//! - Keeping a catalog of deployed workflow definitions
//! - Validating a workflow and starting a run from a chosen trigger
//! - Cancelling runs and answering run queries
//! - Managing the event channel and storage
//! - Graceful shutdown coordination


use std::sync::{
    Arc, RwLock,
    atomic::{AtomicBool, Ordering},
};

use serde_json::Value;
use tokio::runtime::{Handle, Runtime};
use tracing::{debug, info};

use crate::{
    ChannelEvent, ChannelOptions, Config, RelayflowError, Result, ShareLock,
    common::{MemCache, Queue, Shutdown, Vars},
    dispatcher::DispatchOptions,
    model::{Run, WorkflowModel},
    runtime::{Channel, Process, RunId},
    store::{RunQuery, Store},
    workflow::handlers::{Handler, HandlerRegistry},
};

/// Maximum number of processes to cache in memory.
const PROCESS_CACHE_SIZE: usize = 2048;
/// Size of the queue for completed run notifications.
const PROCESS_COMPLETE_QUEUE_SIZE: usize = 100;

/// The main workflow engine.
///
/// # Example
///
/// ```rust,ignore
/// let engine = EngineBuilder::new().messaging_client(client).build()?;
/// engine.launch();
///
/// let workflow = WorkflowModel::from_json(json_str)?;
/// let run = engine.run(&workflow, "start", json!({"status": "active"})).await?;
/// assert_eq!(run.status, RunStatus::Completed);
///
/// engine.shutdown();
/// ```
pub struct Engine {
    config: Config,
    /// Event channel for broadcasting run events and logs.
    channel: Arc<Channel>,
    /// Workflow catalog and run records.
    store: Arc<Store>,
    /// Handlers used by runs started from now on.
    registry: ShareLock<Arc<HandlerRegistry>>,
    /// Queue for receiving run completion notifications.
    procs_complete_queue: Arc<Queue<RunId>>,
    /// In-memory cache of active runs.
    procs: Arc<MemCache<RunId, Arc<Process>>>,

    /// Flag indicating if the engine is running.
    running: Arc<AtomicBool>,
    /// Runtime owned by the engine, if it built one.
    runtime: Option<Arc<Runtime>>,
    handle: Handle,
    /// Shutdown coordinator for graceful termination.
    shutdown: Arc<Shutdown>,
}

impl Engine {
    pub(crate) fn new(
        config: Config,
        registry: HandlerRegistry,
        runtime: Option<Arc<Runtime>>,
        handle: Handle,
    ) -> Result<Self> {
        let store = Arc::new(Store::memory()?);
        let channel = Arc::new(Channel::new(handle.clone(), config.event_queue_size, config.log_queue_size));

        Ok(Self {
            config,
            channel,
            store,
            registry: Arc::new(RwLock::new(Arc::new(registry))),
            procs_complete_queue: Queue::new(PROCESS_COMPLETE_QUEUE_SIZE),
            procs: Arc::new(MemCache::new(PROCESS_CACHE_SIZE)),
            running: Arc::new(AtomicBool::new(false)),
            runtime,
            handle,
            shutdown: Arc::new(Shutdown::new()),
        })
    }

    /// Starts the engine and begins dispatching events.
    ///
    /// Finished runs are dropped from the active cache; their records stay
    /// queryable.
    pub fn launch(&self) {
        if self.running.swap(true, Ordering::Relaxed) {
            return;
        }
        info!(threads = self.config.async_worker_thread_number, owned_runtime = self.runtime.is_some(), "engine launched");

        // register before listening so no event is missed
        let procs_complete_queue = self.procs_complete_queue.clone();
        if let Ok(events) = ChannelEvent::channel(self.channel.clone(), ChannelOptions::default()) {
            events.on_event(move |e| {
                if e.event.is_terminal() {
                    let _ = procs_complete_queue.send(e.rid.clone());
                }
            });
        }
        self.channel.listen();

        let procs_complete_queue = self.procs_complete_queue.clone();
        let shutdown = self.shutdown.clone();
        let procs = self.procs.clone();
        self.handle.spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.wait() => break,
                    Some(rid) = procs_complete_queue.next_async() => {
                        debug!(run_id = %rid, "run finished");
                        procs.remove(&rid);
                    }
                }
            }
        });
    }

    /// Gracefully shuts down the engine.
    ///
    /// Active runs are cancelled at their next node boundary.
    pub fn shutdown(&self) {
        if !self.running.swap(false, Ordering::Relaxed) {
            return;
        }

        self.shutdown.shutdown();
        for (_, proc) in self.procs.iter() {
            let _ = proc.cancel();
        }
        self.channel.shutdown();
        info!("engine shut down");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    fn ensure_running(&self) -> Result<()> {
        if !self.is_running() {
            return Err(RelayflowError::Engine("Engine is not running".to_string()));
        }
        Ok(())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Adds a workflow definition to the catalog, replacing a previous version.
    pub fn deploy(
        &self,
        workflow: &WorkflowModel,
    ) -> Result<bool> {
        self.store.deploy(workflow)
    }

    /// Validate `workflow` and start a run from `trigger_id`.
    ///
    /// Returns once the run exists in `pending`; execution continues on the
    /// engine's runtime. Validation failures create no run.
    pub fn start(
        &self,
        workflow: &WorkflowModel,
        trigger_id: &str,
        input: Value,
    ) -> Result<Arc<Process>> {
        self.ensure_running()?;
        let registry = self.registry.read().map_err(|_| RelayflowError::Engine("handler registry is poisoned".to_string()))?.clone();
        let options = DispatchOptions {
            handler_timeout: self.config.handler_timeout(),
        };

        let process = Process::new(workflow, trigger_id, Vars::from(input), registry, options, self.store.clone(), self.channel.clone())?;
        debug!(run_id = %process.id(), workflow_id = %workflow.id, trigger_id, "run created");

        // cache before starting so a fast run is still removed on completion
        self.procs.set(process.id().to_string(), process.clone());
        process.start(&self.handle);

        Ok(process)
    }

    /// Start a run and wait for its terminal record.
    pub async fn run(
        &self,
        workflow: &WorkflowModel,
        trigger_id: &str,
        input: Value,
    ) -> Result<Run> {
        let process = self.start(workflow, trigger_id, input)?;
        process.wait().await
    }

    /// Start a run of a deployed workflow.
    pub fn start_deployed(
        &self,
        wid: &str,
        trigger_id: &str,
        input: Value,
    ) -> Result<Arc<Process>> {
        let workflow = self.store.find_workflow(wid)?;
        self.start(&workflow, trigger_id, input)
    }

    /// Run a deployed workflow and wait for its terminal record.
    pub async fn run_deployed(
        &self,
        wid: &str,
        trigger_id: &str,
        input: Value,
    ) -> Result<Run> {
        let process = self.start_deployed(wid, trigger_id, input)?;
        process.wait().await
    }

    /// Ask a run to stop at its next node boundary.
    pub fn cancel(
        &self,
        rid: &str,
    ) -> Result<()> {
        if let Some(process) = self.procs.get(&rid.to_string()) {
            return process.cancel();
        }
        // not active: either finished or never existed
        self.store.get_run(rid)?;
        Err(RelayflowError::Engine(format!("run {} already finished", rid)))
    }

    /// Gets an active run by its id.
    pub fn process(
        &self,
        rid: &str,
    ) -> Option<Arc<Process>> {
        self.procs.get(&rid.to_string())
    }

    /// Register a handler for runs started from now on, replacing the
    /// current handler of its kind.
    pub fn register_handler(
        &self,
        handler: Arc<dyn Handler>,
    ) -> Result<()> {
        let mut registry = self.registry.write().map_err(|_| RelayflowError::Engine("handler registry is poisoned".to_string()))?;
        Arc::make_mut(&mut *registry).register(handler);
        Ok(())
    }

    /// Returns a reference to the event channel.
    pub fn channel(&self) -> Arc<Channel> {
        self.channel.clone()
    }

    pub fn store(&self) -> Arc<Store> {
        self.store.clone()
    }
}

impl RunQuery for Engine {
    fn get_run(
        &self,
        id: &str,
    ) -> Result<Run> {
        self.store.get_run(id)
    }

    fn list_runs_for_workflow(
        &self,
        wid: &str,
    ) -> Result<Vec<Run>> {
        self.store.list_runs_for_workflow(wid)
    }
}
