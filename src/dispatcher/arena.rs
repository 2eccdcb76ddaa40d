//! Execution records for one scope of a run: the whole participating graph,
//! or the body of a loop during one iteration.

use std::collections::{HashMap, VecDeque};

use petgraph::graph::{EdgeIndex, NodeIndex};
use serde_json::Value;

use crate::{
    common::Vars,
    workflow::{LoopBody, Workflow, node::NodeState},
};

#[derive(Debug, Clone, Default)]
pub(crate) struct NodeRecord {
    pub state: NodeState,
    /// inbound edges from participating nodes not yet resolved
    pub awaiting: usize,
    /// at least one inbound edge was taken
    pub activated: bool,
    pub input: Vars,
    pub output: Option<Value>,
}

impl NodeRecord {
    fn new(awaiting: usize) -> Self {
        Self {
            awaiting,
            ..Default::default()
        }
    }

    /// The node's input with its own output under `<id>`.
    pub fn context(
        &self,
        id: &str,
    ) -> Vars {
        let mut ctx = self.input.clone();
        ctx.set(id, self.output.clone().unwrap_or(Value::Null));
        ctx
    }
}

#[derive(Debug)]
pub(crate) struct Arena {
    records: Vec<Option<NodeRecord>>,
    pub queue: VecDeque<NodeIndex>,
    /// taken edges whose target lies outside this scope, with the source context
    pub escaped: HashMap<EdgeIndex, Vars>,
    /// whether state changes are written to the run record
    pub persistent: bool,
}

impl Arena {
    /// Records for every participating node, with the trigger ready.
    pub fn root(
        workflow: &Workflow,
        input: Vars,
    ) -> Self {
        let mut arena = Self::empty(workflow, true);
        for idx in workflow.participants().iter().copied() {
            arena.records[idx.index()] = Some(NodeRecord::new(workflow.incoming(idx).len()));
        }

        let trigger = workflow.trigger();
        if let Some(record) = arena.get_mut(trigger) {
            record.state = NodeState::Ready;
            record.activated = true;
            record.input = input;
        }
        arena.queue.push_back(trigger);
        arena
    }

    /// Records for one loop iteration: the loop node already done with
    /// `item` as its output, the body pending.
    pub fn iteration(
        workflow: &Workflow,
        lp: NodeIndex,
        body: &LoopBody,
        input: Vars,
        item: Value,
    ) -> Self {
        let mut arena = Self::empty(workflow, false);
        for idx in body.nodes.iter().copied() {
            arena.records[idx.index()] = Some(NodeRecord::new(workflow.incoming(idx).len()));
        }
        arena.records[lp.index()] = Some(NodeRecord {
            state: NodeState::Done,
            awaiting: 0,
            activated: true,
            input,
            output: Some(item),
        });
        arena
    }

    fn empty(
        workflow: &Workflow,
        persistent: bool,
    ) -> Self {
        Self {
            records: vec![None; workflow.node_count()],
            queue: VecDeque::new(),
            escaped: HashMap::new(),
            persistent,
        }
    }

    pub fn get(
        &self,
        idx: NodeIndex,
    ) -> Option<&NodeRecord> {
        self.records.get(idx.index()).and_then(|r| r.as_ref())
    }

    pub fn get_mut(
        &mut self,
        idx: NodeIndex,
    ) -> Option<&mut NodeRecord> {
        self.records.get_mut(idx.index()).and_then(|r| r.as_mut())
    }

    pub fn state(
        &self,
        idx: NodeIndex,
    ) -> Option<NodeState> {
        self.get(idx).map(|r| r.state)
    }

    pub fn set_state(
        &mut self,
        idx: NodeIndex,
        state: NodeState,
    ) {
        if let Some(record) = self.get_mut(idx) {
            record.state = state;
        }
    }

    /// Node indexes present in this scope.
    pub fn nodes(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.records.iter().enumerate().filter(|(_, r)| r.is_some()).map(|(i, _)| NodeIndex::new(i))
    }

    /// Outputs of the given nodes that finished: none is null, one is its
    /// value, several are keyed by node id.
    pub fn collect(
        &self,
        workflow: &Workflow,
        nodes: &[NodeIndex],
    ) -> Value {
        let mut done: Vec<(String, Value)> = nodes
            .iter()
            .filter_map(|idx| {
                let record = self.get(*idx)?;
                match (record.state, &record.output) {
                    (NodeState::Done, Some(output)) => Some((workflow.node(*idx).id.clone(), output.clone())),
                    _ => None,
                }
            })
            .collect();

        match done.len() {
            0 => Value::Null,
            1 => done.remove(0).1,
            _ => Value::Object(done.into_iter().collect()),
        }
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;
    use crate::model::{EdgeModel, NodeKind, NodeModel, WorkflowModel};

    fn workflow() -> Workflow {
        let model = WorkflowModel {
            id: "wf".to_string(),
            nodes: vec![
                NodeModel::new("start", NodeKind::TriggerManual, json!({})),
                NodeModel::new("each", NodeKind::LogicLoop, json!({"items": "lines"})),
                NodeModel::new("ask", NodeKind::ActionLlm, json!({"prompt": "{{item}}"})),
                NodeModel::new("mail", NodeKind::ActionEmail, json!({"to": "a@b.c", "subject": "s", "body": "b"})),
            ],
            edges: vec![EdgeModel::new("start", 0, "each"), EdgeModel::new("each", 0, "ask"), EdgeModel::new("start", 0, "mail")],
            ..Default::default()
        };
        Workflow::build(&model, "start").unwrap()
    }

    #[test]
    fn test_root_arena_seeds_trigger() {
        let workflow = workflow();
        let arena = Arena::root(&workflow, Vars::new().with("lines", json!([1])));
        let start = workflow.trigger();

        assert_eq!(arena.queue, VecDeque::from(vec![start]));
        assert_eq!(arena.state(start), Some(NodeState::Ready));
        assert_eq!(arena.get(workflow.index_of("each").unwrap()).unwrap().awaiting, 1);
        assert_eq!(arena.nodes().count(), 4);
    }

    #[test]
    fn test_iteration_arena_holds_body() {
        let workflow = workflow();
        let each = workflow.index_of("each").unwrap();
        let body = workflow.loop_body_of(each).unwrap().clone();
        let arena = Arena::iteration(&workflow, each, &body, Vars::new(), json!("x"));

        assert!(!arena.persistent);
        assert_eq!(arena.state(each), Some(NodeState::Done));
        assert_eq!(arena.get(each).unwrap().context("each").get::<String>("each"), Some("x".to_string()));
        assert!(arena.get(workflow.index_of("mail").unwrap()).is_none());
        assert_eq!(arena.nodes().count(), 2);
    }

    #[test]
    fn test_collect_outputs() {
        let workflow = workflow();
        let mut arena = Arena::root(&workflow, Vars::new());
        let ask = workflow.index_of("ask").unwrap();
        let mail = workflow.index_of("mail").unwrap();
        assert_eq!(arena.collect(&workflow, &[ask, mail]), Value::Null);

        for (idx, output) in [(ask, json!("a")), (mail, json!("m"))] {
            let record = arena.get_mut(idx).unwrap();
            record.state = NodeState::Done;
            record.output = Some(output);
        }
        assert_eq!(arena.collect(&workflow, &[ask]), json!("a"));
        assert_eq!(arena.collect(&workflow, &[ask, mail]), json!({"ask": "a", "mail": "m"}));
    }
}
