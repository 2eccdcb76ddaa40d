use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    HandlerErrorKind,
    clients::{ModelClient, ModelParams},
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
pub struct LlmConfig {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl KindConfig for LlmConfig {
    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "prompt": { "type": "string", "minLength": 1 },
                "model": { "type": "string" },
                "system": { "type": "string" },
                "temperature": { "type": "number", "minimum": 0, "maximum": 2 },
                "maxTokens": { "type": "integer", "minimum": 1 }
            },
            "required": ["prompt"],
            "additionalProperties": false
        })
    }
}

/// Queries a language model with the rendered prompt.
pub struct ModelHandler {
    client: Arc<dyn ModelClient>,
}

impl ModelHandler {
    pub fn new(client: Arc<dyn ModelClient>) -> Self {
        Self {
            client,
        }
    }
}

#[async_trait]
impl Handler for ModelHandler {
    fn kind(&self) -> NodeKind {
        NodeKind::ActionLlm
    }

    async fn execute(
        &self,
        config: &NodeConfig,
        input: &Vars,
    ) -> HandlerOutcome {
        let NodeConfig::Llm(config) = config else {
            return mismatched(self.kind(), config);
        };

        let prompt = match template::render(&config.prompt, input) {
            Ok(prompt) => prompt,
            Err(err) => return HandlerOutcome::failed(HandlerErrorKind::InvalidInput, err.to_string()),
        };
        let params = ModelParams {
            model: config.model.clone(),
            system: config.system.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        };

        match self.client.query_model(&prompt, &params).await {
            Ok(response) => {
                let mut output = json!({ "response": response });
                if let Some(model) = &config.model {
                    output["model"] = Value::String(model.clone());
                }
                HandlerOutcome::success(output)
            }
            Err(err) => HandlerOutcome::failed(HandlerErrorKind::TransportError, err.to_string()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::clients::ClientError;

    struct Shout;

    #[async_trait]
    impl ModelClient for Shout {
        async fn query_model(
            &self,
            prompt: &str,
            params: &ModelParams,
        ) -> Result<String, ClientError> {
            assert_eq!(params.max_tokens, Some(16));
            Ok(prompt.to_uppercase())
        }
    }

    #[tokio::test]
    async fn test_model_handler_renders_prompt() {
        let handler = ModelHandler::new(Arc::new(Shout));
        let config = NodeConfig::parse(NodeKind::ActionLlm, &json!({"prompt": "summarize {{ text }}", "model": "small", "maxTokens": 16})).unwrap();

        let outcome = handler.execute(&config, &Vars::new().with("text", "logs")).await;
        assert_eq!(outcome, HandlerOutcome::success(json!({"model": "small", "response": "SUMMARIZE LOGS"})));
    }

    #[test]
    fn test_llm_config_rejects_unknown_keys() {
        assert!(NodeConfig::parse(NodeKind::ActionLlm, &json!({"prompt": "x", "topP": 1})).is_err());
    }
}
