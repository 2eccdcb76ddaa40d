//! Capability interfaces for the side effects of action nodes.
//!
//! Handlers never embed transport logic; they call the clients injected
//! through [`crate::EngineBuilder`]. Implementations must be safe for
//! concurrent use because runs share them.

mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use http::{HttpMessagingClient, HttpModelClient};

/// Failure reported by a messaging or model client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("client is not configured for {0}")]
    NotConfigured(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("unexpected response: {0}")]
    Response(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(error: reqwest::Error) -> Self {
        ClientError::Request(error.to_string())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MessageChannel {
    Telegram,
    Email,
}

/// A rendered message ready to hand to a messaging client.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub channel: MessageChannel,
    /// chat id for telegram, address for email
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub body: String,
}

/// Optional model parameters of an `action.llm` node.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ModelParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[async_trait]
pub trait MessagingClient: Send + Sync {
    /// Deliver a message and return a delivery receipt (e.g. the provider's message id).
    async fn send_message(
        &self,
        message: &OutboundMessage,
    ) -> Result<String, ClientError>;
}

#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Send a prompt to a language model and return its text answer.
    async fn query_model(
        &self,
        prompt: &str,
        params: &ModelParams,
    ) -> Result<String, ClientError>;
}

/// Placeholder used when the engine is built without a client.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredClient;

#[async_trait]
impl MessagingClient for UnconfiguredClient {
    async fn send_message(
        &self,
        message: &OutboundMessage,
    ) -> Result<String, ClientError> {
        Err(ClientError::NotConfigured(message.channel.to_string()))
    }
}

#[async_trait]
impl ModelClient for UnconfiguredClient {
    async fn query_model(
        &self,
        _prompt: &str,
        _params: &ModelParams,
    ) -> Result<String, ClientError> {
        Err(ClientError::NotConfigured("model queries".to_string()))
    }
}
