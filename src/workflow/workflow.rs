//! Runtime workflow representation using a directed graph.
//!
//! A [`Workflow`] is an immutable snapshot built from a validated
//! [`WorkflowModel`] for one chosen trigger. It wraps the nodes and edges in a
//! petgraph `DiGraph` and precomputes what the dispatcher needs: the nodes that
//! participate in the run and the body of every loop.

use std::collections::{HashMap, HashSet};

use petgraph::{
    Direction,
    algo::toposort,
    graph::{DiGraph, EdgeIndex, NodeIndex},
    visit::{Dfs, EdgeRef},
};

use crate::{
    RelayflowError, Result,
    model::{NodeKind, WorkflowModel},
    workflow::{
        edge::Edge,
        node::{Node, NodeId},
        validator::{ValidationResult, ViolationKind, validate},
    },
};

/// Nodes a loop re-runs once per item.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoopBody {
    /// body nodes in topological order
    pub nodes: Vec<NodeIndex>,
    /// edges from the loop node or its body into the rest of the workflow
    pub exits: Vec<EdgeIndex>,
    /// body nodes without outgoing edges; their outputs form an iteration's output
    pub terminals: Vec<NodeIndex>,
}

impl LoopBody {
    pub fn contains(
        &self,
        idx: NodeIndex,
    ) -> bool {
        self.nodes.contains(&idx)
    }
}

#[derive(Debug, Clone)]
pub struct Workflow {
    id: String,
    graph: DiGraph<Node, Edge>,
    index: HashMap<NodeId, NodeIndex>,
    trigger: NodeIndex,
    /// nodes reachable from the trigger, in topological order
    participants: Vec<NodeIndex>,
    loops: HashMap<NodeIndex, LoopBody>,
    /// participants outside every loop body whose outputs form the run result
    terminals: Vec<NodeIndex>,
}

impl Workflow {
    /// Validate `model` and build the snapshot for a run started from `trigger_id`.
    pub fn build(
        model: &WorkflowModel,
        trigger_id: &str,
    ) -> Result<Self> {
        let trigger_kind = model.node(trigger_id).map(|n| n.kind).ok_or_else(|| RelayflowError::NotFound(format!("trigger {}", trigger_id)))?;

        let result = validate(model);
        if !result.is_runnable() {
            return Err(RelayflowError::ValidationFailed(result));
        }
        if !trigger_kind.is_trigger() {
            return Err(RelayflowError::ValidationFailed(ValidationResult::single(
                ViolationKind::Unreachable,
                trigger_id,
                format!("{} node cannot start a run", trigger_kind),
            )));
        }

        let mut graph: DiGraph<Node, Edge> = DiGraph::new();
        let mut index = HashMap::new();
        for node in model.nodes.iter() {
            let runtime = Node::from_model(node).map_err(|problems| RelayflowError::ValidationFailed(ValidationResult::single(ViolationKind::SchemaInvalid, &node.id, problems.join(", "))))?;
            let idx = graph.add_node(runtime);
            index.insert(node.id.clone(), idx);
        }
        for edge in model.edges.iter() {
            // endpoints exist after validation
            if let (Some(source), Some(target)) = (index.get(&edge.source), index.get(&edge.target)) {
                graph.add_edge(*source, *target, Edge::from(edge));
            }
        }

        let trigger = index[trigger_id];

        let mut reached = HashSet::new();
        let mut dfs = Dfs::new(&graph, trigger);
        while let Some(idx) = dfs.next(&graph) {
            reached.insert(idx);
        }
        let order = toposort(&graph, None).map_err(|cycle| RelayflowError::ValidationFailed(ValidationResult::single(ViolationKind::CycleDetected, &graph[cycle.node_id()].id, "cycle in workflow graph".to_string())))?;
        let participants: Vec<NodeIndex> = order.into_iter().filter(|idx| reached.contains(idx)).collect();

        let mut workflow = Self {
            id: model.id.clone(),
            graph,
            index,
            trigger,
            participants,
            loops: HashMap::new(),
            terminals: Vec::new(),
        };
        let loops = workflow.participants.iter().filter(|idx| workflow.graph[**idx].kind == NodeKind::LogicLoop).map(|idx| (*idx, workflow.loop_body(*idx))).collect();
        workflow.loops = loops;

        // terminals need every loop body, nested ones included
        let lps: Vec<NodeIndex> = workflow.loops.keys().copied().collect();
        for lp in lps {
            let terminals = workflow.terminals_within(Some(lp));
            if let Some(body) = workflow.loops.get_mut(&lp) {
                body.terminals = terminals;
            }
        }
        workflow.terminals = workflow.terminals_within(None);

        Ok(workflow)
    }

    /// Nodes reached only through the loop: every participating predecessor
    /// is the loop node itself or already in the body.
    fn loop_body(
        &self,
        lp: NodeIndex,
    ) -> LoopBody {
        let mut members: HashSet<NodeIndex> = HashSet::new();
        let mut nodes = Vec::new();

        let mut downstream = HashSet::new();
        let mut dfs = Dfs::new(&self.graph, lp);
        while let Some(idx) = dfs.next(&self.graph) {
            downstream.insert(idx);
        }

        for idx in self.participants.iter().copied() {
            if idx == lp || !downstream.contains(&idx) {
                continue;
            }
            let enclosed = self.incoming(idx).into_iter().all(|(_, source)| source == lp || members.contains(&source));
            if enclosed {
                members.insert(idx);
                nodes.push(idx);
            }
        }

        let mut exits = Vec::new();
        for idx in std::iter::once(lp).chain(nodes.iter().copied()) {
            for (edge, target) in self.outgoing(idx) {
                if !members.contains(&target) {
                    exits.push(edge);
                }
            }
        }

        LoopBody {
            nodes,
            exits,
            terminals: Vec::new(),
        }
    }

    /// Nodes of a scope (a loop body, or the top level for `None`) whose
    /// completion produces no further work inside that scope. A loop counts
    /// as one node: its successors are the targets of its exits, and the
    /// nodes of its body belong to the inner scope.
    fn terminals_within(
        &self,
        scope: Option<NodeIndex>,
    ) -> Vec<NodeIndex> {
        let members: Vec<NodeIndex> = match scope.and_then(|lp| self.loops.get(&lp)) {
            Some(body) => body.nodes.clone(),
            None => self.participants.clone(),
        };
        let inner = |idx: NodeIndex| self.loops.iter().any(|(lp, body)| Some(*lp) != scope && members.contains(lp) && body.contains(idx));

        members
            .iter()
            .copied()
            .filter(|idx| !inner(*idx))
            .filter(|idx| {
                let targets: Vec<NodeIndex> = match self.loops.get(idx) {
                    Some(body) => body.exits.iter().filter_map(|e| self.edge_target(*e)).collect(),
                    None => self.outgoing(*idx).into_iter().map(|(_, target)| target).collect(),
                };
                targets.iter().all(|t| !members.contains(t))
            })
            .collect()
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn trigger(&self) -> NodeIndex {
        self.trigger
    }

    pub fn trigger_id(&self) -> &str {
        &self.graph[self.trigger].id
    }

    pub fn node(
        &self,
        idx: NodeIndex,
    ) -> &Node {
        &self.graph[idx]
    }

    pub fn edge(
        &self,
        idx: EdgeIndex,
    ) -> &Edge {
        &self.graph[idx]
    }

    /// get node index by id
    pub fn index_of(
        &self,
        id: &str,
    ) -> Option<NodeIndex> {
        self.index.get(id).copied()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn participants(&self) -> &[NodeIndex] {
        &self.participants
    }

    pub fn is_participant(
        &self,
        idx: NodeIndex,
    ) -> bool {
        self.participants.contains(&idx)
    }

    /// Inbound edges from participating nodes, as `(edge, source)`.
    pub fn incoming(
        &self,
        idx: NodeIndex,
    ) -> Vec<(EdgeIndex, NodeIndex)> {
        let mut edges: Vec<_> = self.graph.edges_directed(idx, Direction::Incoming).filter(|e| self.is_participant(e.source())).map(|e| (e.id(), e.source())).collect();
        edges.sort();
        edges
    }

    /// Outbound edges as `(edge, target)`, in insertion order.
    pub fn outgoing(
        &self,
        idx: NodeIndex,
    ) -> Vec<(EdgeIndex, NodeIndex)> {
        let mut edges: Vec<_> = self.graph.edges_directed(idx, Direction::Outgoing).map(|e| (e.id(), e.target())).collect();
        edges.sort();
        edges
    }

    pub fn edge_target(
        &self,
        edge: EdgeIndex,
    ) -> Option<NodeIndex> {
        self.graph.edge_endpoints(edge).map(|(_, target)| target)
    }

    /// Nodes whose outputs make up the run result.
    pub fn terminals(&self) -> &[NodeIndex] {
        &self.terminals
    }

    /// Every node reachable from `idx`, excluding `idx` itself.
    pub fn downstream(
        &self,
        idx: NodeIndex,
    ) -> HashSet<NodeIndex> {
        let mut reached = HashSet::new();
        let mut dfs = Dfs::new(&self.graph, idx);
        while let Some(next) = dfs.next(&self.graph) {
            if next != idx {
                reached.insert(next);
            }
        }
        reached
    }

    pub fn loop_body_of(
        &self,
        idx: NodeIndex,
    ) -> Option<&LoopBody> {
        self.loops.get(&idx)
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;
    use crate::model::{EdgeModel, NodeModel};

    fn ids(
        workflow: &Workflow,
        nodes: &[NodeIndex],
    ) -> Vec<String> {
        nodes.iter().map(|idx| workflow.node(*idx).id.clone()).collect()
    }

    fn model() -> WorkflowModel {
        WorkflowModel {
            id: "wf".to_string(),
            nodes: vec![
                NodeModel::new("start", NodeKind::TriggerManual, json!({})),
                NodeModel::new("hook", NodeKind::TriggerWebhook, json!({"path": "/orders"})),
                NodeModel::new("each", NodeKind::LogicLoop, json!({"items": "lines"})),
                NodeModel::new("ask", NodeKind::ActionLlm, json!({"prompt": "{{item}}"})),
                NodeModel::new("notify", NodeKind::ActionTelegram, json!({"chatId": "1", "message": "{{ask.response}}"})),
                NodeModel::new("report", NodeKind::ActionEmail, json!({"to": "a@b.c", "subject": "s", "body": "done"})),
            ],
            edges: vec![
                EdgeModel::new("start", 0, "each"),
                EdgeModel::new("each", 0, "ask"),
                EdgeModel::new("ask", 0, "notify"),
                EdgeModel::new("each", 0, "report"),
                EdgeModel::new("start", 0, "report"),
                EdgeModel::new("hook", 0, "report"),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_participants_follow_trigger() {
        let workflow = Workflow::build(&model(), "hook").unwrap();
        assert_eq!(ids(&workflow, workflow.participants()), vec!["hook", "report"]);

        let workflow = Workflow::build(&model(), "start").unwrap();
        assert_eq!(workflow.participants().len(), 5);
        assert!(!workflow.is_participant(workflow.index_of("hook").unwrap()));
    }

    #[test]
    fn test_loop_body_and_exits() {
        let workflow = Workflow::build(&model(), "start").unwrap();
        let each = workflow.index_of("each").unwrap();
        let body = workflow.loop_body_of(each).unwrap();

        assert_eq!(ids(&workflow, &body.nodes), vec!["ask", "notify"]);
        assert_eq!(ids(&workflow, &body.terminals), vec!["notify"]);
        let exits: Vec<String> = body.exits.iter().map(|e| workflow.edge(*e).target.clone()).collect();
        assert_eq!(exits, vec!["report"]);
        assert_eq!(ids(&workflow, workflow.terminals()), vec!["report"]);
    }

    #[test]
    fn test_unknown_trigger_not_found() {
        assert!(matches!(Workflow::build(&model(), "nope"), Err(RelayflowError::NotFound(_))));
    }

    #[test]
    fn test_non_trigger_start_is_unreachable() {
        let Err(RelayflowError::ValidationFailed(result)) = Workflow::build(&model(), "ask") else {
            panic!("expected validation failure");
        };
        assert!(result.has(ViolationKind::Unreachable));
    }
}
