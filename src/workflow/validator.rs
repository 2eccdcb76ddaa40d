//! Structural and semantic checks a workflow must pass before it can run.
//!
//! Every violation is collected so a caller sees all problems in one pass.
//! Validation only reads the model; the same model always yields the same result.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::{
    model::{NodeKind, WorkflowModel},
    workflow::node::NodeConfig,
};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, strum::AsRefStr, strum::Display, strum::EnumString)]
pub enum ViolationKind {
    /// Missing or duplicate ids and node configs that do not fit their kind.
    SchemaInvalid,
    /// An edge endpoint names a node that does not exist.
    DanglingEdge,
    /// Illegal output port, two `logic.if` edges on one port, duplicate edge or an edge into a trigger.
    PortConflict,
    CycleDetected,
    /// A node no trigger can activate.
    Unreachable,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    pub kind: ViolationKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    pub message: String,
}

impl Violation {
    fn new(
        kind: ViolationKind,
        node_id: Option<&str>,
        message: String,
    ) -> Self {
        Self {
            kind,
            node_id: node_id.map(str::to_string),
            message,
        }
    }
}

impl std::fmt::Display for Violation {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match &self.node_id {
            Some(nid) => write!(f, "{} [{}]: {}", self.kind, nid, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

/// Outcome of [`validate`]. A workflow without violations is runnable.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    pub violations: Vec<Violation>,
}

impl ValidationResult {
    pub fn is_runnable(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn has(
        &self,
        kind: ViolationKind,
    ) -> bool {
        self.violations.iter().any(|v| v.kind == kind)
    }

    pub fn of_kind(
        &self,
        kind: ViolationKind,
    ) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(move |v| v.kind == kind)
    }

    pub(crate) fn single(
        kind: ViolationKind,
        node_id: &str,
        message: String,
    ) -> Self {
        Self {
            violations: vec![Violation::new(kind, Some(node_id), message)],
        }
    }

    fn push(
        &mut self,
        kind: ViolationKind,
        node_id: Option<&str>,
        message: String,
    ) {
        self.violations.push(Violation::new(kind, node_id, message));
    }
}

impl std::fmt::Display for ValidationResult {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        if self.violations.is_empty() {
            return write!(f, "no violations");
        }
        let parts: Vec<String> = self.violations.iter().map(|v| v.to_string()).collect();
        write!(f, "{}", parts.join("; "))
    }
}

/// Check a workflow model and collect every violation.
pub fn validate(model: &WorkflowModel) -> ValidationResult {
    let mut result = ValidationResult::default();

    if model.id.trim().is_empty() {
        result.push(ViolationKind::SchemaInvalid, None, "workflow id is empty".to_string());
    }

    // node ids in declaration order, first occurrence wins
    let mut order: Vec<&str> = Vec::new();
    let mut kinds: HashMap<&str, NodeKind> = HashMap::new();
    for node in model.nodes.iter() {
        if node.id.trim().is_empty() {
            result.push(ViolationKind::SchemaInvalid, None, format!("{} node has an empty id", node.kind));
            continue;
        }
        if kinds.contains_key(node.id.as_str()) {
            result.push(ViolationKind::SchemaInvalid, Some(&node.id), "duplicate node id".to_string());
            continue;
        }
        kinds.insert(&node.id, node.kind);
        order.push(&node.id);

        if let Err(problems) = NodeConfig::parse(node.kind, &node.config) {
            for problem in problems {
                result.push(ViolationKind::SchemaInvalid, Some(&node.id), format!("{} config: {}", node.kind, problem));
            }
        }
    }

    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut seen_edges = HashSet::new();
    let mut used_ports = HashSet::new();
    for edge in model.edges.iter() {
        let label = format!("edge {}:{} -> {}", edge.source, edge.source_port, edge.target);
        let source = kinds.get(edge.source.as_str()).copied();
        let target = kinds.get(edge.target.as_str()).copied();

        if source.is_none() {
            result.push(ViolationKind::DanglingEdge, None, format!("{}: source node '{}' does not exist", label, edge.source));
        }
        if target.is_none() {
            result.push(ViolationKind::DanglingEdge, None, format!("{}: target node '{}' does not exist", label, edge.target));
        }
        let (Some(source), Some(target)) = (source, target) else {
            continue;
        };

        if !seen_edges.insert((edge.source.as_str(), edge.source_port, edge.target.as_str())) {
            result.push(ViolationKind::PortConflict, Some(&edge.source), format!("{}: duplicate edge", label));
            continue;
        }
        if edge.source_port > source.max_port() {
            result.push(ViolationKind::PortConflict, Some(&edge.source), format!("{}: {} has no output port {}", label, source, edge.source_port));
        } else if source == NodeKind::LogicIf && !used_ports.insert((edge.source.as_str(), edge.source_port)) {
            result.push(ViolationKind::PortConflict, Some(&edge.source), format!("{}: port {} already has an edge", label, edge.source_port));
        }
        if target.is_trigger() {
            result.push(ViolationKind::PortConflict, Some(&edge.target), format!("{}: trigger nodes accept no inbound edges", label));
        }

        adjacency.entry(&edge.source).or_default().push(&edge.target);
    }

    let triggers: Vec<&str> = order.iter().copied().filter(|id| kinds[id].is_trigger()).collect();

    find_cycles(&order, &triggers, &adjacency, &mut result);

    if triggers.is_empty() {
        result.push(ViolationKind::Unreachable, None, "workflow has no trigger node".to_string());
    }
    let reached = reachable(&triggers, &adjacency);
    for id in order.iter().copied().filter(|id| !kinds[id].is_trigger() && !reached.contains(id)) {
        result.push(ViolationKind::Unreachable, Some(id), "no trigger can reach this node".to_string());
    }

    result
}

/// Depth-first search with a recursion stack, from every trigger first and then
/// from every node not yet visited. Each back edge reports its cycle.
fn find_cycles<'a>(
    order: &[&'a str],
    triggers: &[&'a str],
    adjacency: &HashMap<&'a str, Vec<&'a str>>,
    result: &mut ValidationResult,
) {
    let mut visited: HashSet<&str> = HashSet::new();
    let mut stack: Vec<&str> = Vec::new();

    for start in triggers.iter().chain(order.iter()) {
        if !visited.contains(start) {
            visit(start, adjacency, &mut visited, &mut stack, result);
        }
    }
}

fn visit<'a>(
    nid: &'a str,
    adjacency: &HashMap<&'a str, Vec<&'a str>>,
    visited: &mut HashSet<&'a str>,
    stack: &mut Vec<&'a str>,
    result: &mut ValidationResult,
) {
    visited.insert(nid);
    stack.push(nid);

    for next in adjacency.get(nid).into_iter().flatten().copied() {
        if let Some(pos) = stack.iter().position(|s| *s == next) {
            let mut path: Vec<&str> = stack[pos..].to_vec();
            path.push(next);
            result.push(ViolationKind::CycleDetected, Some(next), format!("cycle {}", path.join(" -> ")));
        } else if !visited.contains(next) {
            visit(next, adjacency, visited, stack, result);
        }
    }

    stack.pop();
}

fn reachable<'a>(
    triggers: &[&'a str],
    adjacency: &HashMap<&'a str, Vec<&'a str>>,
) -> HashSet<&'a str> {
    let mut reached: HashSet<&str> = triggers.iter().copied().collect();
    let mut queue: VecDeque<&str> = triggers.iter().copied().collect();
    while let Some(nid) = queue.pop_front() {
        for next in adjacency.get(nid).into_iter().flatten().copied() {
            if reached.insert(next) {
                queue.push_back(next);
            }
        }
    }
    reached
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;
    use crate::model::{EdgeModel, NodeModel};

    fn workflow(
        nodes: Vec<NodeModel>,
        edges: Vec<EdgeModel>,
    ) -> WorkflowModel {
        WorkflowModel {
            id: "wf".to_string(),
            nodes,
            edges,
            ..Default::default()
        }
    }

    fn manual(id: &str) -> NodeModel {
        NodeModel::new(id, NodeKind::TriggerManual, json!({}))
    }

    fn telegram(id: &str) -> NodeModel {
        NodeModel::new(id, NodeKind::ActionTelegram, json!({"chatId": "1", "message": "hi"}))
    }

    fn condition(id: &str) -> NodeModel {
        NodeModel::new(id, NodeKind::LogicIf, json!({"field": "status", "operator": "equals", "value": "ok"}))
    }

    #[test]
    fn test_valid_branching_workflow() {
        let model = workflow(
            vec![manual("start"), condition("check"), telegram("yes"), telegram("no")],
            vec![EdgeModel::new("start", 0, "check"), EdgeModel::new("check", 1, "yes"), EdgeModel::new("check", 0, "no")],
        );
        let result = validate(&model);
        assert!(result.is_runnable(), "{}", result);
    }

    #[test]
    fn test_cycle_detected() {
        let model = workflow(
            vec![manual("start"), telegram("a"), telegram("b")],
            vec![EdgeModel::new("start", 0, "a"), EdgeModel::new("a", 0, "b"), EdgeModel::new("b", 0, "a")],
        );
        let result = validate(&model);
        let cycles: Vec<_> = result.of_kind(ViolationKind::CycleDetected).collect();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].message, "cycle a -> b -> a");
    }

    #[test]
    fn test_cycle_without_trigger() {
        let model = workflow(vec![telegram("a"), telegram("b")], vec![EdgeModel::new("a", 0, "b"), EdgeModel::new("b", 0, "a")]);
        let result = validate(&model);
        assert!(result.has(ViolationKind::CycleDetected));
        assert!(result.has(ViolationKind::Unreachable));
    }

    #[test]
    fn test_collects_every_violation() {
        let mut bad_if = condition("check");
        bad_if.config = json!({"field": "status", "operator": "matches", "value": 1});
        let model = workflow(
            vec![manual("start"), bad_if, telegram("a"), telegram("a"), telegram("lonely")],
            vec![
                EdgeModel::new("start", 0, "check"),
                EdgeModel::new("check", 1, "a"),
                EdgeModel::new("check", 1, "ghost"),
                EdgeModel::new("a", 1, "start"),
            ],
        );
        let result = validate(&model);

        assert!(result.has(ViolationKind::SchemaInvalid));
        assert!(result.has(ViolationKind::DanglingEdge));
        assert!(result.has(ViolationKind::Unreachable));
        // a:1 is not a port of telegram, and it points into a trigger
        assert_eq!(result.of_kind(ViolationKind::PortConflict).count(), 2);
        assert_eq!(result.of_kind(ViolationKind::SchemaInvalid).filter(|v| v.node_id.as_deref() == Some("a")).count(), 1);
        assert_eq!(result.of_kind(ViolationKind::Unreachable).map(|v| v.node_id.clone()).collect::<Vec<_>>(), vec![Some("lonely".to_string())]);
    }

    #[test]
    fn test_if_port_rules() {
        let model = workflow(
            vec![manual("start"), condition("check"), telegram("a"), telegram("b")],
            vec![
                EdgeModel::new("start", 0, "check"),
                EdgeModel::new("check", 1, "a"),
                EdgeModel::new("check", 1, "b"),
                EdgeModel::new("check", 1, "a"),
                EdgeModel::new("check", 2, "b"),
            ],
        );
        let result = validate(&model);
        let messages: Vec<_> = result.of_kind(ViolationKind::PortConflict).map(|v| v.message.clone()).collect();
        assert_eq!(
            messages,
            vec![
                "edge check:1 -> b: port 1 already has an edge".to_string(),
                "edge check:1 -> a: duplicate edge".to_string(),
                "edge check:2 -> b: logic.if has no output port 2".to_string(),
            ]
        );
    }

    #[test]
    fn test_no_trigger() {
        let result = validate(&workflow(vec![telegram("a")], vec![]));
        assert_eq!(result.of_kind(ViolationKind::Unreachable).count(), 2);
    }

    #[test]
    fn test_validation_is_idempotent() {
        let model = workflow(vec![manual("start"), telegram("a"), telegram("a")], vec![EdgeModel::new("start", 0, "b")]);
        assert_eq!(validate(&model), validate(&model));
    }
}
