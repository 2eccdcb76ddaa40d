use serde::{Deserialize, Serialize};

/// The closed set of node kinds a workflow may contain.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, strum::AsRefStr, strum::Display, strum::EnumString, strum::EnumIter)]
pub enum NodeKind {
    #[serde(rename = "trigger.manual")]
    #[strum(serialize = "trigger.manual")]
    TriggerManual,
    #[serde(rename = "trigger.cron")]
    #[strum(serialize = "trigger.cron")]
    TriggerCron,
    #[serde(rename = "trigger.webhook")]
    #[strum(serialize = "trigger.webhook")]
    TriggerWebhook,
    #[serde(rename = "trigger.form")]
    #[strum(serialize = "trigger.form")]
    TriggerForm,
    #[serde(rename = "action.telegram")]
    #[strum(serialize = "action.telegram")]
    ActionTelegram,
    #[serde(rename = "action.email")]
    #[strum(serialize = "action.email")]
    ActionEmail,
    #[serde(rename = "action.llm")]
    #[strum(serialize = "action.llm")]
    ActionLlm,
    #[serde(rename = "logic.if")]
    #[strum(serialize = "logic.if")]
    LogicIf,
    #[serde(rename = "logic.loop")]
    #[strum(serialize = "logic.loop")]
    LogicLoop,
}

impl NodeKind {
    pub fn is_trigger(&self) -> bool {
        matches!(self, NodeKind::TriggerManual | NodeKind::TriggerCron | NodeKind::TriggerWebhook | NodeKind::TriggerForm)
    }

    /// Highest output port an edge leaving this kind may use.
    pub fn max_port(&self) -> u32 {
        match self {
            NodeKind::LogicIf => 1,
            _ => 0,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RetryModel {
    /// extra attempts after the first failure
    pub times: u64,
    /// pause between attempts in milliseconds
    #[serde(default)]
    pub interval: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeModel {
    pub id: String,
    pub kind: NodeKind,
    #[serde(default)]
    pub config: serde_json::Value,
    #[serde(default)]
    pub label: String,
    /// handler timeout in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryModel>,
}

impl NodeModel {
    pub fn new(
        id: &str,
        kind: NodeKind,
        config: serde_json::Value,
    ) -> Self {
        Self {
            id: id.to_string(),
            kind,
            config,
            label: String::new(),
            timeout: None,
            retry: None,
        }
    }
}
