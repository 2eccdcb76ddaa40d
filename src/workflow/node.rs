use std::time::Duration;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{
    model::{NodeKind, NodeModel},
    workflow::handlers::{
        condition::ConditionConfig,
        iterate::LoopConfig,
        llm::LlmConfig,
        messaging::{EmailConfig, TelegramConfig},
        trigger::{CronTriggerConfig, FormTriggerConfig, ManualTriggerConfig, WebhookTriggerConfig},
    },
};

/// node id
pub type NodeId = String;

/// State of a node's execution record during a run.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr, strum::Display, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NodeState {
    /// Waiting for inbound edges to resolve, or never reached.
    #[default]
    Pending,
    /// All inbound edges resolved and at least one was taken; queued.
    Ready,
    Running,
    Done,
    /// Explicitly not executed: its branch was not taken or an upstream node failed.
    Skipped,
    Failed,
}

/// Typed configuration shape of one node kind.
///
/// `schema` is checked with `jsonschema` before the value is deserialized,
/// `check` then adds semantic checks the schema cannot express.
pub trait KindConfig: DeserializeOwned {
    fn schema() -> Value;

    fn check(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Per-kind node configuration, selected by the node's `kind`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", content = "config")]
pub enum NodeConfig {
    #[serde(rename = "trigger.manual")]
    Manual(ManualTriggerConfig),
    #[serde(rename = "trigger.cron")]
    Cron(CronTriggerConfig),
    #[serde(rename = "trigger.webhook")]
    Webhook(WebhookTriggerConfig),
    #[serde(rename = "trigger.form")]
    Form(FormTriggerConfig),
    #[serde(rename = "action.telegram")]
    Telegram(TelegramConfig),
    #[serde(rename = "action.email")]
    Email(EmailConfig),
    #[serde(rename = "action.llm")]
    Llm(LlmConfig),
    #[serde(rename = "logic.if")]
    If(ConditionConfig),
    #[serde(rename = "logic.loop")]
    Loop(LoopConfig),
}

impl NodeConfig {
    /// Validate `value` against the schema of `kind` and build the typed config.
    ///
    /// Every problem is returned, not only the first. A missing (null) config
    /// is treated as an empty object.
    pub fn parse(
        kind: NodeKind,
        value: &Value,
    ) -> Result<Self, Vec<String>> {
        let empty = Value::Object(Default::default());
        let value = if value.is_null() { &empty } else { value };

        match kind {
            NodeKind::TriggerManual => parse_config(value).map(NodeConfig::Manual),
            NodeKind::TriggerCron => parse_config(value).map(NodeConfig::Cron),
            NodeKind::TriggerWebhook => parse_config(value).map(NodeConfig::Webhook),
            NodeKind::TriggerForm => parse_config(value).map(NodeConfig::Form),
            NodeKind::ActionTelegram => parse_config(value).map(NodeConfig::Telegram),
            NodeKind::ActionEmail => parse_config(value).map(NodeConfig::Email),
            NodeKind::ActionLlm => parse_config(value).map(NodeConfig::Llm),
            NodeKind::LogicIf => parse_config(value).map(NodeConfig::If),
            NodeKind::LogicLoop => parse_config(value).map(NodeConfig::Loop),
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            NodeConfig::Manual(_) => NodeKind::TriggerManual,
            NodeConfig::Cron(_) => NodeKind::TriggerCron,
            NodeConfig::Webhook(_) => NodeKind::TriggerWebhook,
            NodeConfig::Form(_) => NodeKind::TriggerForm,
            NodeConfig::Telegram(_) => NodeKind::ActionTelegram,
            NodeConfig::Email(_) => NodeKind::ActionEmail,
            NodeConfig::Llm(_) => NodeKind::ActionLlm,
            NodeConfig::If(_) => NodeKind::LogicIf,
            NodeConfig::Loop(_) => NodeKind::LogicLoop,
        }
    }
}

fn parse_config<T: KindConfig>(value: &Value) -> Result<T, Vec<String>> {
    let schema = T::schema();
    let validator = jsonschema::validator_for(&schema).map_err(|e| vec![format!("invalid config schema: {}", e)])?;

    let errors: Vec<String> = validator.iter_errors(value).map(|e| e.to_string()).collect();
    if !errors.is_empty() {
        return Err(errors);
    }

    let config = serde_json::from_value::<T>(value.clone()).map_err(|e| vec![e.to_string()])?;
    let problems = config.check();
    if !problems.is_empty() {
        return Err(problems);
    }

    Ok(config)
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// extra attempts after the first failure
    pub times: u64,
    /// pause between attempts
    pub interval: Duration,
}

/// A validated node: typed config plus execution settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub label: String,
    pub config: NodeConfig,
    /// overrides the engine's default handler timeout
    pub timeout: Option<Duration>,
    pub retry: Option<RetryConfig>,
}

impl Node {
    pub fn from_model(model: &NodeModel) -> Result<Self, Vec<String>> {
        let config = NodeConfig::parse(model.kind, &model.config)?;

        Ok(Self {
            id: model.id.clone(),
            kind: model.kind,
            label: model.label.clone(),
            config,
            timeout: model.timeout.map(Duration::from_millis),
            retry: model.retry.as_ref().map(|r| RetryConfig {
                times: r.times,
                interval: Duration::from_millis(r.interval),
            }),
        })
    }

    pub fn is_trigger(&self) -> bool {
        self.kind.is_trigger()
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse_selects_variant_by_kind() {
        let config = NodeConfig::parse(NodeKind::LogicIf, &json!({"field": "status", "operator": "equals", "value": "ok"})).unwrap();
        assert_eq!(config.kind(), NodeKind::LogicIf);
        assert!(matches!(config, NodeConfig::If(_)));
    }

    #[test]
    fn test_null_config_is_empty_object() {
        assert!(matches!(NodeConfig::parse(NodeKind::TriggerManual, &Value::Null), Ok(NodeConfig::Manual(_))));
    }

    #[test]
    fn test_parse_collects_all_problems() {
        let problems = NodeConfig::parse(NodeKind::LogicIf, &json!({"operator": "matches", "extra": 1})).unwrap_err();
        // missing field, missing value, bad operator, unknown key
        assert!(problems.len() >= 3, "{:?}", problems);
    }

    #[test]
    fn test_node_from_model_settings() {
        let mut model = NodeModel::new("mail", NodeKind::ActionEmail, json!({"to": "a@b.c", "subject": "s", "body": "b"}));
        model.timeout = Some(250);
        model.retry = Some(crate::model::RetryModel {
            times: 2,
            interval: 5,
        });
        let node = Node::from_model(&model).unwrap();
        assert_eq!(node.timeout, Some(Duration::from_millis(250)));
        assert_eq!(node.retry.as_ref().unwrap().interval, Duration::from_millis(5));
        assert!(!node.is_trigger());
    }
}
