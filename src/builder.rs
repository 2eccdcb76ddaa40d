use std::sync::Arc;

use tokio::runtime::{Builder, Handle, Runtime};

use crate::{
    Config, Engine, Result,
    clients::{MessagingClient, ModelClient, UnconfiguredClient},
    workflow::handlers::{Handler, HandlerRegistry},
};

pub struct EngineBuilder {
    config: Config,
    rt: Option<Arc<Runtime>>,
    messaging: Option<Arc<dyn MessagingClient>>,
    model: Option<Arc<dyn ModelClient>>,
    handlers: Vec<Arc<dyn Handler>>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self {
            config: Config::default(),
            rt: None,
            messaging: None,
            model: None,
            handlers: Vec::new(),
        }
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(
        mut self,
        config: Config,
    ) -> Self {
        self.config = config;
        self
    }

    pub fn async_worker_thread_number(
        mut self,
        n: u16,
    ) -> Self {
        self.config.async_worker_thread_number = n;
        self
    }

    /// default handler timeout in milliseconds
    pub fn handler_timeout(
        mut self,
        millis: u64,
    ) -> Self {
        self.config.handler_timeout = millis;
        self
    }

    pub fn max_loop_iterations(
        mut self,
        n: usize,
    ) -> Self {
        self.config.max_loop_iterations = n;
        self
    }

    pub fn runtime(
        mut self,
        runtime: Arc<Runtime>,
    ) -> Self {
        self.rt = Some(runtime);
        self
    }

    pub fn messaging_client(
        mut self,
        client: Arc<dyn MessagingClient>,
    ) -> Self {
        self.messaging = Some(client);
        self
    }

    pub fn model_client(
        mut self,
        client: Arc<dyn ModelClient>,
    ) -> Self {
        self.model = Some(client);
        self
    }

    /// Register a handler, replacing the built-in one for its kind.
    pub fn handler(
        mut self,
        handler: Arc<dyn Handler>,
    ) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Build the engine. Without an explicit runtime the engine runs on the
    /// current tokio runtime, or on a runtime of its own outside of one.
    pub fn build(&self) -> Result<Engine> {
        let (runtime, handle) = match (&self.rt, Handle::try_current()) {
            (Some(rt), _) => (Some(rt.clone()), rt.handle().clone()),
            (None, Ok(handle)) => (None, handle),
            (None, Err(_)) => {
                let rt = Arc::new(Builder::new_multi_thread().worker_threads(self.config.async_worker_thread_number.into()).enable_all().build()?);
                let handle = rt.handle().clone();
                (Some(rt), handle)
            }
        };

        let messaging = self.messaging.clone().unwrap_or_else(|| Arc::new(UnconfiguredClient));
        let model = self.model.clone().unwrap_or_else(|| Arc::new(UnconfiguredClient));
        let mut registry = HandlerRegistry::with_clients(messaging, model, self.config.max_loop_iterations);
        for handler in self.handlers.iter() {
            registry.register(handler.clone());
        }

        Engine::new(self.config.clone(), registry, runtime, handle)
    }
}
