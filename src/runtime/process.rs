use std::sync::Arc;

use tokio::runtime::Handle;

use crate::{
    RelayflowError, Result,
    common::{Queue, Vars},
    dispatcher::{DispatchOptions, Dispatcher},
    model::{Run, WorkflowModel},
    runtime::{Channel, Recorder, RunId},
    store::{RunQuery, Store},
    utils,
    workflow::{Workflow, handlers::HandlerRegistry},
};

const COMMAND_QUEUE_SIZE: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowCommand {
    Cancel,
}

/// One run of a workflow from a chosen trigger.
#[derive(Clone)]
pub struct Process {
    id: RunId,
    wid: String,
    dispatcher: Arc<Dispatcher>,
    command_queue: Arc<Queue<WorkflowCommand>>,
    store: Arc<Store>,
}

impl Process {
    /// Validate the workflow, snapshot it and create the run in `pending`.
    ///
    /// Nothing is written when validation fails.
    pub(crate) fn new(
        model: &WorkflowModel,
        trigger_id: &str,
        input: Vars,
        registry: Arc<HandlerRegistry>,
        options: DispatchOptions,
        store: Arc<Store>,
        channel: Arc<Channel>,
    ) -> Result<Arc<Process>> {
        let workflow = Arc::new(Workflow::build(model, trigger_id)?);

        let rid = utils::run_id();
        if store.runs()?.exists(&rid)? {
            return Err(RelayflowError::Engine(format!("run id {rid} is duplicated")));
        }

        let participants: Vec<String> = workflow.participants().iter().map(|idx| workflow.node(*idx).id.clone()).collect();
        let recorder = Arc::new(Recorder::create(&rid, workflow.id(), trigger_id, &participants, store.clone(), channel)?);

        let command_queue = Queue::new(COMMAND_QUEUE_SIZE);
        let dispatcher = Arc::new(Dispatcher::new(workflow, registry, recorder, command_queue.clone(), options, input));

        Ok(Arc::new(Process {
            id: rid,
            wid: model.id.clone(),
            dispatcher,
            command_queue,
            store,
        }))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn wid(&self) -> &str {
        &self.wid
    }

    pub fn start(
        &self,
        handle: &Handle,
    ) {
        self.dispatcher.start(handle);
    }

    /// Ask the run to stop at the next node boundary.
    pub fn cancel(&self) -> Result<()> {
        if self.is_complete() {
            return Err(RelayflowError::Engine(format!("run {} already finished", self.id)));
        }
        self.command_queue.send(WorkflowCommand::Cancel)
    }

    pub fn is_complete(&self) -> bool {
        self.dispatcher.is_complete()
    }

    /// Wait for the run to reach a terminal status and return it.
    pub async fn wait(&self) -> Result<Run> {
        self.dispatcher.shutdown().wait().await;
        self.store.get_run(&self.id)
    }

    /// Current state of the run.
    pub fn run(&self) -> Result<Run> {
        self.store.get_run(&self.id)
    }
}
