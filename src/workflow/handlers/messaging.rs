use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use crate::{
    HandlerErrorKind, Result,
    clients::{MessageChannel, MessagingClient, OutboundMessage},
    common::Vars,
    model::NodeKind,
    workflow::{
        handlers::{Handler, HandlerOutcome, mismatched},
        node::{KindConfig, NodeConfig},
        template,
    },
};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TelegramConfig {
    pub chat_id: String,
    pub message: String,
}

impl KindConfig for TelegramConfig {
    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "chatId": { "type": "string", "minLength": 1 },
                "message": { "type": "string" }
            },
            "required": ["chatId", "message"],
            "additionalProperties": false
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EmailConfig {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl KindConfig for EmailConfig {
    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "to": { "type": "string", "minLength": 1 },
                "subject": { "type": "string" },
                "body": { "type": "string" }
            },
            "required": ["to", "subject", "body"],
            "additionalProperties": false
        })
    }
}

/// Renders a message from the node config and hands it to the messaging client.
pub struct MessageHandler {
    kind: NodeKind,
    client: Arc<dyn MessagingClient>,
}

impl MessageHandler {
    pub fn new(
        kind: NodeKind,
        client: Arc<dyn MessagingClient>,
    ) -> Self {
        Self {
            kind,
            client,
        }
    }

    /// Build the outbound message, `None` when the config belongs to another kind.
    fn render(
        &self,
        config: &NodeConfig,
        input: &Vars,
    ) -> Result<Option<OutboundMessage>> {
        let message = match config {
            NodeConfig::Telegram(c) if self.kind == NodeKind::ActionTelegram => OutboundMessage {
                channel: MessageChannel::Telegram,
                target: template::render(&c.chat_id, input)?,
                subject: None,
                body: template::render(&c.message, input)?,
            },
            NodeConfig::Email(c) if self.kind == NodeKind::ActionEmail => OutboundMessage {
                channel: MessageChannel::Email,
                target: template::render(&c.to, input)?,
                subject: Some(template::render(&c.subject, input)?),
                body: template::render(&c.body, input)?,
            },
            _ => return Ok(None),
        };
        Ok(Some(message))
    }
}

#[async_trait]
impl Handler for MessageHandler {
    fn kind(&self) -> NodeKind {
        self.kind
    }

    async fn execute(
        &self,
        config: &NodeConfig,
        input: &Vars,
    ) -> HandlerOutcome {
        let message = match self.render(config, input) {
            Ok(Some(message)) => message,
            Ok(None) => return mismatched(self.kind, config),
            Err(err) => return HandlerOutcome::failed(HandlerErrorKind::InvalidInput, err.to_string()),
        };

        debug!(channel = %message.channel, target = %message.target, "sending message");
        match self.client.send_message(&message).await {
            Ok(receipt) => {
                let mut output = serde_json::to_value(&message).unwrap_or(Value::Null);
                if let Value::Object(map) = &mut output {
                    map.insert("receipt".to_string(), Value::String(receipt));
                }
                HandlerOutcome::success(output)
            }
            Err(err) => HandlerOutcome::failed(HandlerErrorKind::TransportError, err.to_string()),
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Mutex;

    use super::*;
    use crate::clients::{ClientError, UnconfiguredClient};

    #[derive(Default)]
    struct Outbox {
        sent: Mutex<Vec<OutboundMessage>>,
    }

    #[async_trait]
    impl MessagingClient for Outbox {
        async fn send_message(
            &self,
            message: &OutboundMessage,
        ) -> std::result::Result<String, ClientError> {
            let mut sent = self.sent.lock().unwrap();
            sent.push(message.clone());
            Ok(format!("msg-{}", sent.len()))
        }
    }

    #[tokio::test]
    async fn test_telegram_renders_and_sends() {
        let outbox = Arc::new(Outbox::default());
        let handler = MessageHandler::new(NodeKind::ActionTelegram, outbox.clone());
        let config = NodeConfig::parse(NodeKind::ActionTelegram, &json!({"chatId": "42", "message": "order {{ order.id }} is {{status}}"})).unwrap();
        let input = Vars::from(json!({"order": {"id": 7}, "status": "ok"}));

        let outcome = handler.execute(&config, &input).await;
        assert_eq!(
            outcome,
            HandlerOutcome::success(json!({
                "channel": "telegram",
                "target": "42",
                "body": "order 7 is ok",
                "receipt": "msg-1"
            }))
        );
        assert_eq!(outbox.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_email_missing_template_value() {
        let handler = MessageHandler::new(NodeKind::ActionEmail, Arc::new(Outbox::default()));
        let config = NodeConfig::parse(NodeKind::ActionEmail, &json!({"to": "ops@example.com", "subject": "alert", "body": "{{ reason }}"})).unwrap();

        let outcome = handler.execute(&config, &Vars::new()).await;
        assert!(matches!(outcome, HandlerOutcome::Failed { kind: HandlerErrorKind::InvalidInput, .. }));
    }

    #[tokio::test]
    async fn test_client_error_is_transport_error() {
        let handler = MessageHandler::new(NodeKind::ActionTelegram, Arc::new(UnconfiguredClient));
        let config = NodeConfig::parse(NodeKind::ActionTelegram, &json!({"chatId": "42", "message": "hi"})).unwrap();

        let outcome = handler.execute(&config, &Vars::new()).await;
        assert!(matches!(outcome, HandlerOutcome::Failed { kind: HandlerErrorKind::TransportError, .. }));
    }

    #[tokio::test]
    async fn test_wrong_config_variant_is_internal() {
        let handler = MessageHandler::new(NodeKind::ActionEmail, Arc::new(Outbox::default()));
        let config = NodeConfig::parse(NodeKind::ActionTelegram, &json!({"chatId": "42", "message": "hi"})).unwrap();

        let outcome = handler.execute(&config, &Vars::new()).await;
        assert!(matches!(outcome, HandlerOutcome::Failed { kind: HandlerErrorKind::Internal, .. }));
    }
}
