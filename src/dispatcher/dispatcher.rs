//! Workflow dispatcher for scheduling and executing nodes.
//!
//! The dispatcher is responsible for:
//! - Walking the participating graph from the chosen trigger
//! - Scheduling nodes once every inbound edge is resolved
//! - Following only the chosen branch of `logic.if` nodes
//! - Re-running loop bodies once per item
//! - Applying handler timeouts and retries
//!
//! A run executes on one tokio task: exactly one handler is in flight at a time.

use std::{
    collections::HashSet,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use futures::{FutureExt, future::BoxFuture};
use petgraph::graph::{EdgeIndex, NodeIndex};
use serde_json::Value;
use tokio::runtime::Handle;
use tracing::{debug, trace, warn};

use crate::{
    HandlerErrorKind, Result,
    common::{Queue, Shutdown, Vars},
    dispatcher::arena::Arena,
    events::NodeEvent,
    model::{LogLevel, RunError, RunStatus},
    runtime::{Recorder, WorkflowCommand},
    workflow::{
        LoopBody, Workflow,
        consts::LOG_SUMMARY_LIMIT,
        edge::Port,
        handlers::{HandlerOutcome, HandlerRegistry},
        node::{Node, NodeConfig, NodeState},
    },
};

/// How a scope of the run ended.
#[derive(Debug)]
enum Step {
    Completed,
    Failed(RunError),
    Cancelled,
}

/// Settings the dispatcher takes from the engine configuration.
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    /// timeout for nodes without their own
    pub handler_timeout: Duration,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            handler_timeout: Duration::from_millis(crate::config::DEFAULT_HANDLER_TIMEOUT),
        }
    }
}

/// Workflow execution dispatcher.
pub struct Dispatcher {
    /// The workflow snapshot to execute.
    workflow: Arc<Workflow>,
    /// Handlers resolved by node kind.
    registry: Arc<HandlerRegistry>,
    recorder: Arc<Recorder>,
    /// Queue for receiving workflow commands.
    command_queue: Arc<Queue<WorkflowCommand>>,
    options: DispatchOptions,
    input: Vars,
    cancelled: AtomicBool,
    /// Signalled once the run reached a terminal status.
    shutdown: Arc<Shutdown>,
}

impl Dispatcher {
    pub fn new(
        workflow: Arc<Workflow>,
        registry: Arc<HandlerRegistry>,
        recorder: Arc<Recorder>,
        command_queue: Arc<Queue<WorkflowCommand>>,
        options: DispatchOptions,
        input: Vars,
    ) -> Self {
        Self {
            workflow,
            registry,
            recorder,
            command_queue,
            options,
            input,
            cancelled: AtomicBool::new(false),
            shutdown: Arc::new(Shutdown::new()),
        }
    }

    /// Spawn the run on `handle`.
    pub fn start(
        self: &Arc<Self>,
        handle: &Handle,
    ) {
        let dispatcher = self.clone();
        handle.spawn(async move {
            if let Err(err) = dispatcher.run().await {
                warn!(run_id = %dispatcher.recorder.rid(), "run aborted: {}", err);
                if !dispatcher.recorder.is_finalized() {
                    let err = RunError {
                        node_id: dispatcher.workflow.trigger_id().to_string(),
                        kind: HandlerErrorKind::Internal,
                        message: err.to_string(),
                    };
                    let _ = dispatcher.recorder.finish(RunStatus::Failed, None, Some(err));
                }
            }
            dispatcher.shutdown.shutdown();
        });
    }

    pub fn is_complete(&self) -> bool {
        self.shutdown.is_terminated()
    }

    pub fn shutdown(&self) -> Arc<Shutdown> {
        self.shutdown.clone()
    }

    async fn run(&self) -> Result<()> {
        let node_ids = self.workflow.participants().iter().map(|idx| self.workflow.node(*idx).id.clone()).collect();
        self.recorder.running(self.workflow.trigger_id(), node_ids)?;

        let mut arena = Arena::root(&self.workflow, self.input.clone());
        self.recorder.node_state(self.workflow.trigger_id(), NodeState::Ready)?;

        match self.drive(&mut arena).await? {
            Step::Completed => {
                let result = arena.collect(&self.workflow, self.workflow.terminals());
                self.recorder.log(None, LogLevel::Info, "run completed".to_string())?;
                self.recorder.finish(RunStatus::Completed, Some(result), None)
            }
            Step::Failed(err) => {
                self.revert_ready(&mut arena)?;
                self.skip_downstream(&mut arena)?;
                self.recorder.log(Some(&err.node_id), LogLevel::Error, err.to_string())?;
                self.recorder.finish(RunStatus::Failed, None, Some(err))
            }
            Step::Cancelled => {
                self.revert_ready(&mut arena)?;
                self.recorder.log(None, LogLevel::Warn, "run cancelled".to_string())?;
                self.recorder.finish(RunStatus::Cancelled, None, None)
            }
        }
    }

    /// Drain the ready queue of a scope.
    fn drive<'a>(
        &'a self,
        arena: &'a mut Arena,
    ) -> BoxFuture<'a, Result<Step>> {
        async move {
            loop {
                if self.is_cancelled() {
                    return Ok(Step::Cancelled);
                }
                let Some(idx) = arena.queue.pop_front() else {
                    return Ok(Step::Completed);
                };
                if let Some(step) = self.execute(arena, idx).await? {
                    return Ok(step);
                }
            }
        }
        .boxed()
    }

    /// Run one ready node. Returns a step when the scope has to stop.
    async fn execute(
        &self,
        arena: &mut Arena,
        idx: NodeIndex,
    ) -> Result<Option<Step>> {
        let node = self.workflow.node(idx);
        let input = match arena.get(idx) {
            Some(record) => record.input.clone(),
            None => return Ok(None),
        };

        self.set_state(arena, idx, NodeState::Running)?;
        trace!(run_id = %self.recorder.rid(), node_id = %node.id, "executing {}", node.kind);

        match self.invoke(node, &input).await? {
            HandlerOutcome::Failed {
                kind,
                message,
            } => {
                let err = RunError {
                    node_id: node.id.clone(),
                    kind,
                    message,
                };
                arena.set_state(idx, NodeState::Failed);
                if arena.persistent {
                    self.recorder.node_failed(&err)?;
                }
                Ok(Some(Step::Failed(err)))
            }
            HandlerOutcome::Success {
                output,
                branch,
            } => {
                if let NodeConfig::Loop(config) = &node.config {
                    return self.iterate(arena, idx, input, output, config.item_variable()).await;
                }

                self.recorder.log(Some(&node.id), LogLevel::Info, format!("completed: {}", summarize(&output)))?;
                if let Some(record) = arena.get_mut(idx) {
                    record.output = Some(output);
                }
                self.set_state(arena, idx, NodeState::Done)?;
                self.propagate(arena, idx, branch)?;
                Ok(None)
            }
        }
    }

    /// Call the node's handler under its timeout, retrying retryable failures.
    async fn invoke(
        &self,
        node: &Node,
        input: &Vars,
    ) -> Result<HandlerOutcome> {
        let handler = match self.registry.resolve(node.kind) {
            Ok(handler) => handler,
            Err(err) => return Ok(HandlerOutcome::failed(HandlerErrorKind::Internal, err.to_string())),
        };
        let timeout = node.timeout.unwrap_or(self.options.handler_timeout);

        let mut attempt = 0;
        loop {
            let outcome = match tokio::time::timeout(timeout, handler.execute(&node.config, input)).await {
                Ok(outcome) => outcome,
                Err(_) => HandlerOutcome::failed(HandlerErrorKind::Timeout, format!("handler did not finish within {}ms", timeout.as_millis())),
            };

            if let (
                HandlerOutcome::Failed {
                    kind,
                    message,
                },
                Some(retry),
            ) = (&outcome, &node.retry)
            {
                if kind.is_retryable() && attempt < retry.times {
                    attempt += 1;
                    self.recorder.log(Some(&node.id), LogLevel::Warn, format!("retrying ({}/{}) after {}: {}", attempt, retry.times, kind, message))?;
                    self.recorder.node_event(&node.id, NodeEvent::Retry(attempt))?;
                    if !retry.interval.is_zero() {
                        tokio::time::sleep(retry.interval).await;
                    }
                    continue;
                }
            }

            return Ok(outcome);
        }
    }

    /// Mark body nodes that completed in any iteration so far as `Done` in the enclosing scope.
    fn keep_ran(
        &self,
        arena: &mut Arena,
        body: &LoopBody,
        ran: &HashSet<NodeIndex>,
        current: Option<&Arena>,
    ) -> Result<()> {
        for idx in body.nodes.iter().copied() {
            if ran.contains(&idx) || current.is_some_and(|sub| sub.state(idx) == Some(NodeState::Done)) {
                self.set_state(arena, idx, NodeState::Done)?;
            }
        }
        Ok(())
    }

    /// Run the loop body once per item, then resolve the loop's exit edges.
    async fn iterate(
        &self,
        arena: &mut Arena,
        lp: NodeIndex,
        input: Vars,
        items: Value,
        item_variable: &str,
    ) -> Result<Option<Step>> {
        let node = self.workflow.node(lp);
        let Some(body) = self.workflow.loop_body_of(lp) else {
            let err = RunError {
                node_id: node.id.clone(),
                kind: HandlerErrorKind::Internal,
                message: "loop body was not computed".to_string(),
            };
            arena.set_state(lp, NodeState::Failed);
            if arena.persistent {
                self.recorder.node_failed(&err)?;
            }
            return Ok(Some(Step::Failed(err)));
        };
        let items = match items {
            Value::Array(items) => items,
            other => vec![other],
        };

        let mut outputs = Vec::with_capacity(items.len());
        let mut ran: HashSet<NodeIndex> = HashSet::new();
        for (i, item) in items.into_iter().enumerate() {
            if self.is_cancelled() {
                self.keep_ran(arena, body, &ran, None)?;
                self.set_state(arena, lp, NodeState::Pending)?;
                return Ok(Some(Step::Cancelled));
            }
            debug!(run_id = %self.recorder.rid(), node_id = %node.id, "iteration {}", i);
            self.recorder.node_event(&node.id, NodeEvent::Iteration(i))?;

            let mut iteration_input = input.clone();
            iteration_input.set(item_variable, &item);
            let mut sub = Arena::iteration(&self.workflow, lp, body, iteration_input, item);
            self.propagate(&mut sub, lp, None)?;

            match self.drive(&mut sub).await? {
                Step::Completed => {}
                Step::Cancelled => {
                    self.keep_ran(arena, body, &ran, Some(&sub))?;
                    self.set_state(arena, lp, NodeState::Pending)?;
                    return Ok(Some(Step::Cancelled));
                }
                Step::Failed(err) => {
                    self.keep_ran(arena, body, &ran, Some(&sub))?;
                    for idx in body.nodes.iter().copied().filter(|idx| sub.state(*idx) == Some(NodeState::Failed)) {
                        arena.set_state(idx, NodeState::Failed);
                        if arena.persistent && self.workflow.node(idx).id != err.node_id {
                            self.recorder.node_state(&self.workflow.node(idx).id, NodeState::Failed)?;
                        }
                    }
                    if arena.persistent {
                        self.recorder.node_failed(&err)?;
                    }
                    self.set_state(arena, lp, NodeState::Failed)?;
                    return Ok(Some(Step::Failed(err)));
                }
            }

            outputs.push(sub.collect(&self.workflow, &body.terminals));
            for idx in body.nodes.iter().copied() {
                let Some(record) = sub.get(idx) else {
                    continue;
                };
                if record.state == NodeState::Done {
                    ran.insert(idx);
                    // keep the latest values for exits and enclosing loops
                    let (record_input, record_output) = (record.input.clone(), record.output.clone());
                    if let Some(parent) = arena.get_mut(idx) {
                        parent.input = record_input;
                        parent.output = record_output;
                    }
                }
            }
            for (edge, ctx) in sub.escaped.drain() {
                arena.escaped.insert(edge, ctx);
            }
        }

        let output = Value::Array(outputs);
        self.recorder.log(Some(&node.id), LogLevel::Info, format!("completed: {}", summarize(&output)))?;
        if let Some(record) = arena.get_mut(lp) {
            record.output = Some(output);
        }
        self.set_state(arena, lp, NodeState::Done)?;
        for idx in body.nodes.iter().copied() {
            let state = if ran.contains(&idx) { NodeState::Done } else { NodeState::Skipped };
            self.set_state(arena, idx, state)?;
        }

        let ctx = arena.get(lp).map(|r| r.context(&node.id)).unwrap_or_default();
        for edge in body.exits.iter().copied() {
            let Some(target) = self.workflow.edge_target(edge) else {
                continue;
            };
            let source = &self.workflow.edge(edge).source;
            let taken = if *source == node.id { Some(ctx.clone()) } else { arena.escaped.remove(&edge) };
            self.resolve(arena, edge, target, taken)?;
        }
        Ok(None)
    }

    /// Resolve the outgoing edges of a finished node. With a branch, only the
    /// edges on that port are taken.
    fn propagate(
        &self,
        arena: &mut Arena,
        idx: NodeIndex,
        branch: Option<Port>,
    ) -> Result<()> {
        let ctx = match arena.get(idx) {
            Some(record) => record.context(&self.workflow.node(idx).id),
            None => return Ok(()),
        };
        for (edge, target) in self.workflow.outgoing(idx) {
            let taken = branch.is_none_or(|port| self.workflow.edge(edge).port == port);
            self.resolve(arena, edge, target, taken.then(|| ctx.clone()))?;
        }
        Ok(())
    }

    /// Resolve one edge as taken (with the source context) or skipped.
    ///
    /// A node whose inbound edges all resolved becomes ready when one was
    /// taken, otherwise it is skipped and its own edges are skipped in turn.
    fn resolve(
        &self,
        arena: &mut Arena,
        edge: EdgeIndex,
        target: NodeIndex,
        taken: Option<Vars>,
    ) -> Result<()> {
        let mut stack = vec![(edge, target, taken)];

        while let Some((edge, target, taken)) = stack.pop() {
            let Some(record) = arena.get_mut(target) else {
                // leaves this scope; the enclosing loop resolves it
                if let Some(ctx) = taken {
                    arena.escaped.insert(edge, ctx);
                }
                continue;
            };
            if record.state != NodeState::Pending {
                continue;
            }

            record.awaiting = record.awaiting.saturating_sub(1);
            if let Some(ctx) = &taken {
                record.activated = true;
                record.input.merge(ctx);
            }
            if record.awaiting > 0 {
                continue;
            }

            if record.activated {
                self.set_state(arena, target, NodeState::Ready)?;
                arena.queue.push_back(target);
            } else {
                let nid = &self.workflow.node(target).id;
                self.set_state(arena, target, NodeState::Skipped)?;
                self.recorder.log(Some(nid), LogLevel::Info, "skipped: branch not taken".to_string())?;
                for (next_edge, next) in self.workflow.outgoing(target) {
                    stack.push((next_edge, next, None));
                }
            }
        }
        Ok(())
    }

    /// Put queued nodes back to pending.
    fn revert_ready(
        &self,
        arena: &mut Arena,
    ) -> Result<()> {
        while let Some(idx) = arena.queue.pop_front() {
            self.set_state(arena, idx, NodeState::Pending)?;
        }
        Ok(())
    }

    /// Mark every pending node downstream of a failed node as skipped.
    ///
    /// Only states change here; the failure entry stays the last log entry.
    fn skip_downstream(
        &self,
        arena: &mut Arena,
    ) -> Result<()> {
        let failed: Vec<NodeIndex> = arena.nodes().filter(|idx| arena.state(*idx) == Some(NodeState::Failed)).collect();
        let mut downstream: Vec<NodeIndex> = failed.iter().flat_map(|idx| self.workflow.downstream(*idx)).collect::<HashSet<_>>().into_iter().collect();
        downstream.sort();

        for idx in downstream {
            if arena.state(idx) == Some(NodeState::Pending) {
                self.set_state(arena, idx, NodeState::Skipped)?;
            }
        }
        Ok(())
    }

    /// Update a record, writing it through to the run when the scope is persistent.
    fn set_state(
        &self,
        arena: &mut Arena,
        idx: NodeIndex,
        state: NodeState,
    ) -> Result<()> {
        arena.set_state(idx, state);
        if arena.persistent {
            self.recorder.node_state(&self.workflow.node(idx).id, state)?;
        }
        Ok(())
    }

    /// Whether a cancel command arrived. Once seen it stays set.
    fn is_cancelled(&self) -> bool {
        while let Some(command) = self.command_queue.try_next() {
            match command {
                WorkflowCommand::Cancel => self.cancelled.store(true, Ordering::SeqCst),
            }
        }
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Compact JSON rendering of an output for log entries.
fn summarize(output: &Value) -> String {
    let text = output.to_string();
    if text.chars().count() <= LOG_SUMMARY_LIMIT {
        return text;
    }
    let mut summary: String = text.chars().take(LOG_SUMMARY_LIMIT).collect();
    summary.push_str("...");
    summary
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::summarize;
    use crate::workflow::consts::LOG_SUMMARY_LIMIT;

    #[test]
    fn test_summarize_truncates() {
        assert_eq!(summarize(&json!({"a": 1})), r#"{"a":1}"#);

        let long = summarize(&json!("x".repeat(500)));
        assert_eq!(long.chars().count(), LOG_SUMMARY_LIMIT + 3);
        assert!(long.ends_with("..."));
    }
}
