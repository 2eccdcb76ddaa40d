use serde::{Deserialize, Serialize};

use crate::{
    RelayflowError, Result,
    model::{EdgeModel, NodeModel},
};

/// Canonical, serializable workflow definition as produced by an editor or store.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowModel {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub nodes: Vec<NodeModel>,
    pub edges: Vec<EdgeModel>,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
}

impl WorkflowModel {
    pub fn from_json(s: &str) -> Result<Self> {
        serde_json::from_str::<WorkflowModel>(s).map_err(|e| RelayflowError::Convert(format!("invalid workflow: {}", e)))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn node(
        &self,
        id: &str,
    ) -> Option<&NodeModel> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use crate::model::{EdgeModel, NodeKind, NodeModel, WorkflowModel};

    const ALERT_WORKFLOW: &str = r#"{
        "id": "wf-alert",
        "name": "Alert",
        "description": "route status alerts",
        "nodes": [
            {"id": "start", "kind": "trigger.manual", "config": {}, "label": "Start"},
            {"id": "check", "kind": "logic.if", "config": {"field": "status", "operator": "equals", "value": "ok"}, "label": "Status ok?"},
            {"id": "tg", "kind": "action.telegram", "config": {"chatId": "42", "message": "all good"}, "label": "Telegram", "timeout": 500},
            {"id": "mail", "kind": "action.email", "config": {"to": "ops@example.com", "subject": "alert", "body": "status {{status}}"}, "label": "Email", "retry": {"times": 2, "interval": 10}}
        ],
        "edges": [
            {"source": "start", "sourcePort": 0, "target": "check"},
            {"source": "check", "sourcePort": 1, "target": "tg"},
            {"source": "check", "sourcePort": 0, "target": "mail"}
        ],
        "createdAt": 1700000000000,
        "updatedAt": 1700000001000
    }"#;

    #[test]
    fn test_workflow_from_json() {
        let workflow = WorkflowModel::from_json(ALERT_WORKFLOW).unwrap();
        assert_eq!(workflow.nodes.len(), 4);
        assert_eq!(workflow.node("check").unwrap().kind, NodeKind::LogicIf);
        assert_eq!(workflow.node("tg").unwrap().timeout, Some(500));
        assert_eq!(workflow.edges[1], EdgeModel::new("check", 1, "tg"));
        assert_eq!(workflow.created_at, 1700000000000);
    }

    #[test]
    fn test_workflow_json_round_trip() {
        let workflow = WorkflowModel::from_json(ALERT_WORKFLOW).unwrap();
        let text = workflow.to_json().unwrap();
        let parsed = WorkflowModel::from_json(&text).unwrap();
        assert_eq!(workflow, parsed);

        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["edges"][1], json!({"source": "check", "sourcePort": 1, "target": "tg"}));
        assert_eq!(value["nodes"][0]["kind"], json!("trigger.manual"));
    }

    #[test]
    fn test_missing_port_defaults_to_zero() {
        let edge: EdgeModel = serde_json::from_value(json!({"source": "a", "target": "b"})).unwrap();
        assert_eq!(edge.source_port, 0);
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let err = serde_json::from_value::<NodeModel>(json!({"id": "x", "kind": "action.sms", "config": {}})).unwrap_err();
        assert!(err.to_string().contains("action.sms"));
    }
}
