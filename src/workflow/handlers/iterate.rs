use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    HandlerErrorKind,
    common::Vars,
    model::NodeKind,
    workflow::{
        consts::DEFAULT_ITEM_VARIABLE,
        handlers::{Handler, HandlerOutcome, mismatched},
        node::{KindConfig, NodeConfig},
    },
};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LoopConfig {
    /// dot path of the array to iterate
    pub items: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_variable: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<usize>,
}

impl LoopConfig {
    /// Name under which the current element is injected into the body input.
    pub fn item_variable(&self) -> &str {
        self.item_variable.as_deref().unwrap_or(DEFAULT_ITEM_VARIABLE)
    }
}

impl KindConfig for LoopConfig {
    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "items": { "type": "string", "minLength": 1 },
                "itemVariable": { "type": "string", "minLength": 1 },
                "maxIterations": { "type": "integer", "minimum": 1 }
            },
            "required": ["items"],
            "additionalProperties": false
        })
    }
}

/// Resolves the iterable of a `logic.loop` node.
///
/// The handler only returns the items; the dispatcher runs the loop body once
/// per element.
pub struct IterateHandler {
    max_iterations: usize,
}

impl IterateHandler {
    pub fn new(max_iterations: usize) -> Self {
        Self {
            max_iterations,
        }
    }
}

#[async_trait]
impl Handler for IterateHandler {
    fn kind(&self) -> NodeKind {
        NodeKind::LogicLoop
    }

    async fn execute(
        &self,
        config: &NodeConfig,
        input: &Vars,
    ) -> HandlerOutcome {
        let NodeConfig::Loop(config) = config else {
            return mismatched(self.kind(), config);
        };

        let items = match input.lookup(&config.items) {
            Some(Value::Array(items)) => items,
            Some(_) => return HandlerOutcome::failed(HandlerErrorKind::InvalidInput, format!("field '{}' is not an array", config.items)),
            None => return HandlerOutcome::failed(HandlerErrorKind::InvalidInput, format!("field '{}' not found", config.items)),
        };

        let limit = config.max_iterations.map_or(self.max_iterations, |max| max.min(self.max_iterations));
        if items.len() > limit {
            return HandlerOutcome::failed(HandlerErrorKind::LoopLimitExceeded, format!("{} items exceed the limit of {} iterations", items.len(), limit));
        }

        HandlerOutcome::success(Value::Array(items.clone()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn config(value: Value) -> NodeConfig {
        NodeConfig::parse(NodeKind::LogicLoop, &value).unwrap()
    }

    #[tokio::test]
    async fn test_loop_returns_items() {
        let handler = IterateHandler::new(10);
        let outcome = handler.execute(&config(json!({"items": "order.lines"})), &Vars::from(json!({"order": {"lines": [1, 2, 3]}}))).await;
        assert_eq!(outcome, HandlerOutcome::success(json!([1, 2, 3])));
    }

    #[tokio::test]
    async fn test_loop_requires_array() {
        let handler = IterateHandler::new(10);
        let outcome = handler.execute(&config(json!({"items": "lines"})), &Vars::new().with("lines", "a,b")).await;
        assert!(matches!(outcome, HandlerOutcome::Failed { kind: HandlerErrorKind::InvalidInput, .. }));
    }

    #[tokio::test]
    async fn test_loop_limit_uses_smaller_bound() {
        let input = Vars::new().with("lines", vec![1, 2, 3]);

        let outcome = IterateHandler::new(2).execute(&config(json!({"items": "lines", "maxIterations": 5})), &input).await;
        assert!(matches!(outcome, HandlerOutcome::Failed { kind: HandlerErrorKind::LoopLimitExceeded, .. }));

        let outcome = IterateHandler::new(100).execute(&config(json!({"items": "lines", "maxIterations": 2})), &input).await;
        assert!(matches!(outcome, HandlerOutcome::Failed { kind: HandlerErrorKind::LoopLimitExceeded, .. }));
    }

    #[test]
    fn test_item_variable_default() {
        let NodeConfig::Loop(c) = config(json!({"items": "lines"})) else { unreachable!() };
        assert_eq!(c.item_variable(), "item");
        assert!(NodeConfig::parse(NodeKind::LogicLoop, &json!({"items": "lines", "maxIterations": 0})).is_err());
    }
}
