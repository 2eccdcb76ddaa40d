//! Executable behavior bound to each node kind.

pub mod condition;
pub mod iterate;
pub mod llm;
pub mod messaging;
pub mod trigger;

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde_json::Value;
use strum::IntoEnumIterator;

use crate::{
    HandlerErrorKind, RelayflowError, Result,
    clients::{MessagingClient, ModelClient, UnconfiguredClient},
    common::Vars,
    config::DEFAULT_MAX_LOOP_ITERATIONS,
    model::NodeKind,
    workflow::{edge::Port, node::NodeConfig},
};

pub use condition::ConditionHandler;
pub use iterate::IterateHandler;
pub use llm::ModelHandler;
pub use messaging::MessageHandler;
pub use trigger::TriggerHandler;

/// Result of one handler invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerOutcome {
    Success {
        output: Value,
        /// output port to follow; only set by `logic.if`
        branch: Option<Port>,
    },
    Failed {
        kind: HandlerErrorKind,
        message: String,
    },
}

impl HandlerOutcome {
    pub fn success(output: Value) -> Self {
        Self::Success {
            output,
            branch: None,
        }
    }

    pub fn branch(
        output: Value,
        port: Port,
    ) -> Self {
        Self::Success {
            output,
            branch: Some(port),
        }
    }

    pub fn failed(
        kind: HandlerErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self::Failed {
            kind,
            message: message.into(),
        }
    }
}

/// The capability every node kind implements.
///
/// Handlers see only their own config and the accumulated input; they never
/// touch the graph.
#[async_trait]
pub trait Handler: Send + Sync {
    /// The node kind served by this handler.
    fn kind(&self) -> NodeKind;

    async fn execute(
        &self,
        config: &NodeConfig,
        input: &Vars,
    ) -> HandlerOutcome;
}

/// Failure for a config variant that does not belong to the handler.
pub(crate) fn mismatched(
    kind: NodeKind,
    config: &NodeConfig,
) -> HandlerOutcome {
    HandlerOutcome::failed(HandlerErrorKind::Internal, format!("{} handler received {} config", kind, config.kind()))
}

/// Maps node kinds to their handlers.
#[derive(Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<NodeKind, Arc<dyn Handler>>,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HandlerRegistry {
    /// Registry with the built-in handlers and no configured clients.
    pub fn new() -> Self {
        Self::with_clients(Arc::new(UnconfiguredClient), Arc::new(UnconfiguredClient), DEFAULT_MAX_LOOP_ITERATIONS)
    }

    /// Registry with the built-in handlers wired to the given clients.
    pub fn with_clients(
        messaging: Arc<dyn MessagingClient>,
        model: Arc<dyn ModelClient>,
        max_loop_iterations: usize,
    ) -> Self {
        let mut registry = Self {
            handlers: HashMap::new(),
        };

        for kind in NodeKind::iter().filter(|k| k.is_trigger()) {
            registry.register(Arc::new(TriggerHandler::new(kind)));
        }
        registry.register(Arc::new(MessageHandler::new(NodeKind::ActionTelegram, messaging.clone())));
        registry.register(Arc::new(MessageHandler::new(NodeKind::ActionEmail, messaging)));
        registry.register(Arc::new(ModelHandler::new(model)));
        registry.register(Arc::new(ConditionHandler));
        registry.register(Arc::new(IterateHandler::new(max_loop_iterations)));

        registry
    }

    /// Register a handler, replacing any handler of the same kind.
    pub fn register(
        &mut self,
        handler: Arc<dyn Handler>,
    ) {
        self.handlers.insert(handler.kind(), handler);
    }

    pub fn resolve(
        &self,
        kind: NodeKind,
    ) -> Result<Arc<dyn Handler>> {
        self.handlers.get(&kind).cloned().ok_or_else(|| RelayflowError::NotFound(format!("handler for {}", kind)))
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.handlers.keys().collect();
        kinds.sort();
        f.debug_struct("HandlerRegistry").field("kinds", &kinds).finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    struct Echo;

    #[async_trait]
    impl Handler for Echo {
        fn kind(&self) -> NodeKind {
            NodeKind::ActionLlm
        }

        async fn execute(
            &self,
            _config: &NodeConfig,
            input: &Vars,
        ) -> HandlerOutcome {
            HandlerOutcome::success(input.clone().into())
        }
    }

    #[test]
    fn test_registry_resolves_every_kind() {
        let registry = HandlerRegistry::new();
        for kind in NodeKind::iter() {
            assert_eq!(registry.resolve(kind).unwrap().kind(), kind);
        }
    }

    #[tokio::test]
    async fn test_register_replaces_handler() {
        let mut registry = HandlerRegistry::new();
        registry.register(Arc::new(Echo));

        let config = NodeConfig::parse(NodeKind::ActionLlm, &serde_json::json!({"prompt": "hi"})).unwrap();
        let input = Vars::new().with("a", 1);
        let outcome = registry.resolve(NodeKind::ActionLlm).unwrap().execute(&config, &input).await;
        assert_eq!(outcome, HandlerOutcome::success(serde_json::json!({"a": 1})));
    }
}
