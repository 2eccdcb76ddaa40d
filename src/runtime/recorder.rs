//! Run recorder: append-only log sink, node-state writer and final-status
//! setter for one run.
//!
//! Every write goes to the store first and is then published on the channel.
//! Once the run reaches a terminal status the recorder refuses further writes.

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::{
    RelayflowError, Result,
    events::{Event, GraphEvent, Log, Message, NodeEvent, RunEvent, RunStartedEvent},
    model::{LogLevel, RunError, RunStatus},
    runtime::{Channel, RunId},
    store::{Store, data},
    utils,
    workflow::node::{NodeId, NodeState},
};

pub struct Recorder {
    rid: RunId,
    store: Arc<Store>,
    channel: Arc<Channel>,
    seq: AtomicU64,
    finalized: AtomicBool,
}

impl Recorder {
    /// Create the run in `pending` with a `pending` record per participating node.
    pub fn create(
        rid: &str,
        wid: &str,
        tid: &str,
        participants: &[NodeId],
        store: Arc<Store>,
        channel: Arc<Channel>,
    ) -> Result<Self> {
        let now = utils::time::time_millis();
        store.runs()?.create(&data::Run {
            id: rid.to_string(),
            wid: wid.to_string(),
            tid: tid.to_string(),
            state: RunStatus::Pending.to_string(),
            start_time: now,
            end_time: 0,
            result: None,
            err: None,
            timestamp: now,
        })?;

        let nodes = store.nodes()?;
        for nid in participants.iter() {
            nodes.create(&data::Node {
                id: node_record_id(rid, nid),
                rid: rid.to_string(),
                nid: nid.clone(),
                state: NodeState::Pending.to_string(),
                err: None,
                start_time: 0,
                end_time: 0,
                timestamp: now,
            })?;
        }

        Ok(Self {
            rid: rid.to_string(),
            store,
            channel,
            seq: AtomicU64::new(0),
            finalized: AtomicBool::new(false),
        })
    }

    pub fn rid(&self) -> &str {
        &self.rid
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        if self.is_finalized() {
            return Err(RelayflowError::Store(format!("run {} is finalized", self.rid)));
        }
        Ok(())
    }

    /// `pending -> running`
    pub fn running(
        &self,
        trigger: &str,
        node_ids: Vec<NodeId>,
    ) -> Result<()> {
        self.check()?;
        let runs = self.store.runs()?;
        let mut run = runs.find(&self.rid)?;
        run.state = RunStatus::Running.to_string();
        run.start_time = utils::time::time_millis();
        run.timestamp = run.start_time;
        runs.update(&run)?;

        self.emit(
            "",
            GraphEvent::Run(RunEvent::Started(RunStartedEvent {
                trigger: trigger.to_string(),
                node_ids,
            })),
        );
        self.log(None, LogLevel::Info, format!("run started from trigger {}", trigger))
    }

    /// Append a log entry with the next sequence number.
    pub fn log(
        &self,
        nid: Option<&str>,
        level: LogLevel,
        content: String,
    ) -> Result<()> {
        self.check()?;
        self.append(nid, level, content)
    }

    fn append(
        &self,
        nid: Option<&str>,
        level: LogLevel,
        content: String,
    ) -> Result<()> {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let nid = nid.unwrap_or_default();
        let timestamp = utils::time::time_millis();

        match level {
            LogLevel::Debug => debug!(run_id = %self.rid, node_id = nid, seq, "{}", content),
            LogLevel::Info => info!(run_id = %self.rid, node_id = nid, seq, "{}", content),
            LogLevel::Warn => warn!(run_id = %self.rid, node_id = nid, seq, "{}", content),
            LogLevel::Error => error!(run_id = %self.rid, node_id = nid, seq, "{}", content),
        }

        self.store.logs()?.create(&data::Log {
            id: utils::longid(),
            rid: self.rid.clone(),
            nid: nid.to_string(),
            seq,
            level: level.to_string(),
            content: content.clone(),
            timestamp,
        })?;

        let _ = self.channel.log_queue().send(Event::new(&Log {
            rid: self.rid.clone(),
            nid: nid.to_string(),
            level,
            content,
            timestamp,
        }));
        Ok(())
    }

    /// Write a node state. `running` and `done` also publish node events.
    pub fn node_state(
        &self,
        nid: &str,
        state: NodeState,
    ) -> Result<()> {
        self.check()?;
        let now = utils::time::time_millis();
        self.update_node(nid, |node| {
            node.state = state.to_string();
            match state {
                NodeState::Running => node.start_time = now,
                NodeState::Done | NodeState::Skipped | NodeState::Failed => node.end_time = now,
                _ => {}
            }
        })?;

        match state {
            NodeState::Running => self.emit(nid, GraphEvent::Node(NodeEvent::Running(now))),
            NodeState::Done => self.emit(nid, GraphEvent::Node(NodeEvent::Succeeded(now))),
            NodeState::Skipped => self.emit(nid, GraphEvent::Node(NodeEvent::Skipped)),
            _ => {}
        }
        Ok(())
    }

    pub fn node_failed(
        &self,
        err: &RunError,
    ) -> Result<()> {
        self.check()?;
        let message = err.to_string();
        self.update_node(&err.node_id, |node| {
            node.state = NodeState::Failed.to_string();
            node.err = Some(message.clone());
            node.end_time = utils::time::time_millis();
        })?;
        self.emit(
            &err.node_id,
            GraphEvent::Node(NodeEvent::Failed(crate::events::ErrorReason {
                kind: err.kind,
                message: err.message.clone(),
            })),
        );
        Ok(())
    }

    /// Publish a node event that changes no state (retry, iteration).
    pub fn node_event(
        &self,
        nid: &str,
        event: NodeEvent,
    ) -> Result<()> {
        self.check()?;
        self.emit(nid, GraphEvent::Node(event));
        Ok(())
    }

    /// Set the terminal status. Later writes fail.
    pub fn finish(
        &self,
        status: RunStatus,
        result: Option<Value>,
        error: Option<RunError>,
    ) -> Result<()> {
        self.check()?;
        let runs = self.store.runs()?;
        let mut run = runs.find(&self.rid)?;
        run.state = status.to_string();
        run.end_time = utils::time::time_millis();
        run.timestamp = run.end_time;
        run.result = result.map(|v| v.to_string());
        run.err = error.as_ref().map(serde_json::to_string).transpose()?;
        runs.update(&run)?;
        self.finalized.store(true, Ordering::SeqCst);

        let event = match (status, error) {
            (RunStatus::Failed, Some(err)) => RunEvent::Failed(err),
            (RunStatus::Cancelled, _) => RunEvent::Cancelled,
            _ => RunEvent::Completed,
        };
        self.emit("", GraphEvent::Run(event));
        Ok(())
    }

    fn update_node(
        &self,
        nid: &str,
        f: impl FnOnce(&mut data::Node),
    ) -> Result<()> {
        let nodes = self.store.nodes()?;
        let mut node = nodes.find(&node_record_id(&self.rid, nid))?;
        f(&mut node);
        node.timestamp = utils::time::time_millis();
        nodes.update(&node)?;
        Ok(())
    }

    fn emit(
        &self,
        nid: &str,
        event: GraphEvent,
    ) {
        let _ = self.channel.event_queue().send(Event::new(&Message {
            rid: self.rid.clone(),
            nid: nid.to_string(),
            event,
        }));
    }
}

fn node_record_id(
    rid: &str,
    nid: &str,
) -> String {
    format!("{}:{}", rid, nid)
}

#[cfg(test)]
mod test {
    use tokio::runtime::Handle;

    use super::*;
    use crate::{HandlerErrorKind, store::RunQuery};

    fn recorder(store: Arc<Store>) -> Recorder {
        let channel = Arc::new(Channel::new(Handle::current(), 16, 16));
        Recorder::create("r1", "wf", "start", &["start".to_string(), "send".to_string()], store, channel).unwrap()
    }

    #[tokio::test]
    async fn test_recorder_writes_run() {
        let store = Arc::new(Store::memory().unwrap());
        let recorder = recorder(store.clone());
        assert_eq!(store.get_run("r1").unwrap().status, RunStatus::Pending);

        recorder.running("start", vec!["start".to_string(), "send".to_string()]).unwrap();
        recorder.node_state("start", NodeState::Done).unwrap();
        recorder.log(Some("start"), LogLevel::Info, "completed: {}".to_string()).unwrap();
        let err = RunError {
            node_id: "send".to_string(),
            kind: HandlerErrorKind::TransportError,
            message: "connection refused".to_string(),
        };
        recorder.node_failed(&err).unwrap();
        recorder.log(Some("send"), LogLevel::Error, err.to_string()).unwrap();
        recorder.finish(RunStatus::Failed, None, Some(err.clone())).unwrap();

        let run = store.get_run("r1").unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.error, Some(err));
        assert_eq!(run.logs.iter().map(|l| l.seq).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(run.logs[2].message, "HandlerFailed: TransportError: connection refused");
        assert_eq!(run.node_state("start"), Some(NodeState::Done));
        assert_eq!(run.node_state("send"), Some(NodeState::Failed));
        assert!(run.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_finalized_run_refuses_writes() {
        let store = Arc::new(Store::memory().unwrap());
        let recorder = recorder(store.clone());
        recorder.running("start", vec![]).unwrap();
        recorder.finish(RunStatus::Completed, Some(serde_json::json!(1)), None).unwrap();

        assert!(matches!(recorder.log(None, LogLevel::Info, "late".to_string()), Err(RelayflowError::Store(_))));
        assert!(recorder.node_state("send", NodeState::Running).is_err());
        assert!(recorder.finish(RunStatus::Cancelled, None, None).is_err());
        assert_eq!(store.get_run("r1").unwrap().logs.len(), 1);
    }
}
