use std::str::FromStr;

use async_trait::async_trait;
use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    HandlerErrorKind,
    common::Vars,
    model::NodeKind,
    workflow::{
        handlers::{Handler, HandlerOutcome, mismatched},
        node::{KindConfig, NodeConfig},
    },
};

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ManualTriggerConfig {}

impl KindConfig for ManualTriggerConfig {
    fn schema() -> Value {
        json!({
            "type": "object",
            "additionalProperties": false
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CronTriggerConfig {
    pub expression: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

impl CronTriggerConfig {
    /// Parse the expression. Five field expressions get an implied `0` seconds field.
    pub fn schedule(&self) -> Result<cron::Schedule, String> {
        let expr = self.expression.trim();
        let expr = if expr.split_whitespace().count() == 5 {
            format!("0 {}", expr)
        } else {
            expr.to_string()
        };
        cron::Schedule::from_str(&expr).map_err(|e| format!("invalid cron expression '{}': {}", self.expression, e))
    }

    /// Offset the schedule is evaluated in: `UTC`, `Z` or `+HH:MM` / `-HH:MM`. UTC when unset.
    pub fn offset(&self) -> Result<FixedOffset, String> {
        let Some(tz) = self.timezone.as_deref().map(str::trim) else {
            return Ok(Utc.fix());
        };
        if tz.eq_ignore_ascii_case("utc") || tz == "Z" {
            return Ok(Utc.fix());
        }

        let invalid = || format!("invalid timezone '{}': expected UTC or an offset like +02:00", tz);
        let (sign, rest) = match tz.as_bytes().first() {
            Some(b'+') => (1, &tz[1..]),
            Some(b'-') => (-1, &tz[1..]),
            _ => return Err(invalid()),
        };
        let (hours, minutes) = rest.split_once(':').ok_or_else(invalid)?;
        if hours.len() != 2 || minutes.len() != 2 {
            return Err(invalid());
        }
        let hours: i32 = hours.parse().map_err(|_| invalid())?;
        let minutes: i32 = minutes.parse().map_err(|_| invalid())?;
        if hours > 14 || minutes > 59 {
            return Err(invalid());
        }
        FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
    }
}

impl KindConfig for CronTriggerConfig {
    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "expression": { "type": "string", "minLength": 1 },
                "timezone": { "type": "string" }
            },
            "required": ["expression"],
            "additionalProperties": false
        })
    }

    fn check(&self) -> Vec<String> {
        self.schedule().err().into_iter().chain(self.offset().err()).collect()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WebhookTriggerConfig {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
}

impl KindConfig for WebhookTriggerConfig {
    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "pattern": "^/" },
                "method": { "type": "string", "enum": ["GET", "POST", "PUT", "PATCH", "DELETE"] }
            },
            "required": ["path"],
            "additionalProperties": false
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FormField {
    pub name: String,
    #[serde(default)]
    pub required: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FormTriggerConfig {
    pub fields: Vec<FormField>,
}

impl KindConfig for FormTriggerConfig {
    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "fields": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "name": { "type": "string", "minLength": 1 },
                            "required": { "type": "boolean" }
                        },
                        "required": ["name"],
                        "additionalProperties": false
                    }
                }
            },
            "required": ["fields"],
            "additionalProperties": false
        })
    }
}

/// Passes the run's initial input through as the trigger output.
pub struct TriggerHandler {
    kind: NodeKind,
}

impl TriggerHandler {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
        }
    }
}

#[async_trait]
impl Handler for TriggerHandler {
    fn kind(&self) -> NodeKind {
        self.kind
    }

    async fn execute(
        &self,
        config: &NodeConfig,
        input: &Vars,
    ) -> HandlerOutcome {
        if config.kind() != self.kind {
            return mismatched(self.kind, config);
        }

        if let NodeConfig::Form(form) = config {
            let missing: Vec<&str> = form.fields.iter().filter(|f| f.required && input.get::<Value>(&f.name).is_none_or(|v| v.is_null())).map(|f| f.name.as_str()).collect();
            if !missing.is_empty() {
                return HandlerOutcome::failed(HandlerErrorKind::InvalidInput, format!("missing required form fields: {}", missing.join(", ")));
            }
        }

        HandlerOutcome::success(input.clone().into())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_cron_five_fields() {
        let config = CronTriggerConfig {
            expression: "*/5 * * * *".to_string(),
            timezone: None,
        };
        assert!(config.schedule().is_ok());
    }

    #[test]
    fn test_cron_invalid_expression() {
        let problems = NodeConfig::parse(NodeKind::TriggerCron, &json!({"expression": "every day"})).unwrap_err();
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("invalid cron expression"));
    }

    #[test]
    fn test_cron_timezone() {
        let config = |tz: &str| NodeConfig::parse(NodeKind::TriggerCron, &json!({"expression": "0 9 * * *", "timezone": tz}));
        assert!(config("UTC").is_ok());
        assert!(config("+05:30").is_ok());
        assert!(config("-08:00").is_ok());

        let problems = config("Mars/Olympus").unwrap_err();
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("invalid timezone"));
        assert!(config("+25:00").is_err());
        assert!(config("+5").is_err());

        let NodeConfig::Cron(cron) = config("-01:30").unwrap() else {
            panic!("expected cron config");
        };
        assert_eq!(cron.offset().unwrap().local_minus_utc(), -5400);
    }

    #[test]
    fn test_cron_empty_expression() {
        assert!(NodeConfig::parse(NodeKind::TriggerCron, &json!({"expression": ""})).is_err());
    }

    #[test]
    fn test_webhook_path_must_be_absolute() {
        assert!(NodeConfig::parse(NodeKind::TriggerWebhook, &json!({"path": "hooks/a"})).is_err());
        assert!(NodeConfig::parse(NodeKind::TriggerWebhook, &json!({"path": "/hooks/a", "method": "POST"})).is_ok());
    }

    #[tokio::test]
    async fn test_trigger_passes_input_through() {
        let handler = TriggerHandler::new(NodeKind::TriggerManual);
        let config = NodeConfig::Manual(ManualTriggerConfig {});
        let outcome = handler.execute(&config, &Vars::new().with("status", "ok")).await;
        assert_eq!(outcome, HandlerOutcome::success(json!({"status": "ok"})));
    }

    #[tokio::test]
    async fn test_form_trigger_requires_fields() {
        let handler = TriggerHandler::new(NodeKind::TriggerForm);
        let config = NodeConfig::parse(NodeKind::TriggerForm, &json!({"fields": [{"name": "email", "required": true}, {"name": "note"}]})).unwrap();

        let outcome = handler.execute(&config, &Vars::new().with("note", "x")).await;
        assert_eq!(outcome, HandlerOutcome::failed(HandlerErrorKind::InvalidInput, "missing required form fields: email"));

        let outcome = handler.execute(&config, &Vars::new().with("email", "a@b.c")).await;
        assert_eq!(outcome, HandlerOutcome::success(json!({"email": "a@b.c"})));
    }
}
