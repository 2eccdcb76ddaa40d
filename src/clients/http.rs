use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use super::{ClientError, MessageChannel, MessagingClient, ModelClient, ModelParams, OutboundMessage};

const TELEGRAM_API_URL: &str = "https://api.telegram.org";
const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Messaging over HTTP: Telegram Bot API for chats and a JSON relay for e-mail.
#[derive(Debug, Clone, Default)]
pub struct HttpMessagingClient {
    http: Client,
    telegram_base: Option<String>,
    email_relay: Option<String>,
}

impl HttpMessagingClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable telegram delivery through the bot identified by `token`.
    pub fn telegram(
        mut self,
        token: &str,
    ) -> Self {
        self.telegram_base = Some(format!("{}/bot{}", TELEGRAM_API_URL, token));
        self
    }

    /// Override the telegram endpoint, e.g. for a local bot api server.
    pub fn telegram_endpoint(
        mut self,
        base: &str,
    ) -> Self {
        self.telegram_base = Some(base.trim_end_matches('/').to_string());
        self
    }

    /// Enable e-mail delivery by posting `{to, subject, body}` to `url`.
    pub fn email_relay(
        mut self,
        url: &str,
    ) -> Self {
        self.email_relay = Some(url.to_string());
        self
    }

    async fn post_json(
        &self,
        url: &str,
        body: &Value,
    ) -> Result<Value, ClientError> {
        debug!(url, "posting message");
        let resp = self.http.post(url).json(body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(ClientError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
        // relays may answer with an empty body
        let text = resp.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| ClientError::Response(e.to_string()))
    }
}

#[async_trait]
impl MessagingClient for HttpMessagingClient {
    async fn send_message(
        &self,
        message: &OutboundMessage,
    ) -> Result<String, ClientError> {
        match message.channel {
            MessageChannel::Telegram => {
                let base = self.telegram_base.as_ref().ok_or_else(|| ClientError::NotConfigured("telegram".to_string()))?;
                let url = format!("{}/sendMessage", base);
                let resp = self
                    .post_json(
                        &url,
                        &json!({
                            "chat_id": message.target,
                            "text": message.body,
                        }),
                    )
                    .await?;
                if resp.get("ok").and_then(Value::as_bool) == Some(false) {
                    let description = resp.get("description").and_then(Value::as_str).unwrap_or("unknown error");
                    return Err(ClientError::Response(description.to_string()));
                }
                let receipt = resp.pointer("/result/message_id").map(|id| id.to_string()).unwrap_or_default();
                Ok(receipt)
            }
            MessageChannel::Email => {
                let url = self.email_relay.as_ref().ok_or_else(|| ClientError::NotConfigured("email".to_string()))?;
                let resp = self
                    .post_json(
                        url,
                        &json!({
                            "to": message.target,
                            "subject": message.subject,
                            "body": message.body,
                        }),
                    )
                    .await?;
                let receipt = resp.get("id").map(|id| id.as_str().map(str::to_string).unwrap_or_else(|| id.to_string())).unwrap_or_default();
                Ok(receipt)
            }
        }
    }
}

/// Model queries against an OpenAI-compatible `chat/completions` endpoint.
#[derive(Debug, Clone)]
pub struct HttpModelClient {
    http: Client,
    url: String,
    api_key: Option<String>,
    default_model: String,
}

impl Default for HttpModelClient {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatAnswer,
}

#[derive(Deserialize)]
struct ChatAnswer {
    #[serde(default)]
    content: Option<String>,
}

impl HttpModelClient {
    pub fn new() -> Self {
        Self {
            http: Client::new(),
            url: OPENAI_API_URL.to_string(),
            api_key: None,
            default_model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Point the client at another OpenAI-compatible server (Ollama, vLLM, ...).
    pub fn endpoint(
        mut self,
        url: &str,
    ) -> Self {
        self.url = url.to_string();
        self
    }

    pub fn api_key(
        mut self,
        key: &str,
    ) -> Self {
        self.api_key = Some(key.to_string());
        self
    }

    /// Model used when a node does not name one.
    pub fn default_model(
        mut self,
        model: &str,
    ) -> Self {
        self.default_model = model.to_string();
        self
    }
}

#[async_trait]
impl ModelClient for HttpModelClient {
    async fn query_model(
        &self,
        prompt: &str,
        params: &ModelParams,
    ) -> Result<String, ClientError> {
        let mut messages = Vec::new();
        if let Some(system) = &params.system {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });

        let body = ChatRequest {
            model: params.model.as_deref().unwrap_or(&self.default_model),
            messages,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
        };

        let mut req = self.http.post(&self.url).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(ClientError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let answer: ChatResponse = resp.json().await.map_err(|e| ClientError::Response(e.to_string()))?;
        answer
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ClientError::Response("no choices in model response".to_string()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn test_messaging_channel_without_endpoint() {
        let client = HttpMessagingClient::new().email_relay("http://127.0.0.1:9/mail");
        let err = client
            .send_message(&OutboundMessage {
                channel: MessageChannel::Telegram,
                target: "42".to_string(),
                subject: None,
                body: "hi".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(err, ClientError::NotConfigured("telegram".to_string()));
    }

    #[tokio::test]
    async fn test_unreachable_telegram_endpoint_is_request_error() {
        let client = HttpMessagingClient::new().telegram_endpoint("http://127.0.0.1:9/");
        let err = client
            .send_message(&OutboundMessage {
                channel: MessageChannel::Telegram,
                target: "42".to_string(),
                subject: None,
                body: "hi".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Request(_)));
    }
}
