use std::{fs, path::Path, time::Duration};

use serde::Deserialize;

use crate::{RelayflowError, Result};

pub const DEFAULT_WORKER_THREADS: u16 = 16;
/// milliseconds
pub const DEFAULT_HANDLER_TIMEOUT: u64 = 30_000;
pub const DEFAULT_MAX_LOOP_ITERATIONS: usize = 1000;
pub const DEFAULT_EVENT_QUEUE_SIZE: usize = 2048;
pub const DEFAULT_LOG_QUEUE_SIZE: usize = 4096;

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// number of async worker threads, range [1, 32768), defaults to 16
    pub async_worker_thread_number: u16,
    /// handler timeout in milliseconds for nodes without their own
    pub handler_timeout: u64,
    /// engine-wide cap on the items a loop may iterate over
    pub max_loop_iterations: usize,
    /// capacity of the run/node event queue
    pub event_queue_size: usize,
    /// capacity of the log queue
    pub log_queue_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            async_worker_thread_number: DEFAULT_WORKER_THREADS,
            handler_timeout: DEFAULT_HANDLER_TIMEOUT,
            max_loop_iterations: DEFAULT_MAX_LOOP_ITERATIONS,
            event_queue_size: DEFAULT_EVENT_QUEUE_SIZE,
            log_queue_size: DEFAULT_LOG_QUEUE_SIZE,
        }
    }
}

impl Config {
    pub fn create<T: AsRef<Path>>(path: T) -> Result<Self> {
        let data = fs::read_to_string(path.as_ref()).map_err(|e| RelayflowError::Config(format!("failed to load config file {:?}: {}", path.as_ref(), e)))?;

        Self::load_from_str(data.as_str())
    }

    pub fn load_from_str(toml_str: &str) -> Result<Self> {
        let config = toml::from_str::<Config>(toml_str)?;
        config.check()?;
        Ok(config)
    }

    pub fn handler_timeout(&self) -> Duration {
        Duration::from_millis(self.handler_timeout)
    }

    fn check(&self) -> Result<()> {
        if self.async_worker_thread_number == 0 {
            return Err(RelayflowError::Config("async_worker_thread_number must be at least 1".to_string()));
        }
        if self.handler_timeout == 0 {
            return Err(RelayflowError::Config("handler_timeout must be at least 1ms".to_string()));
        }
        if self.max_loop_iterations == 0 {
            return Err(RelayflowError::Config("max_loop_iterations must be at least 1".to_string()));
        }
        if self.event_queue_size == 0 || self.log_queue_size == 0 {
            return Err(RelayflowError::Config("queue sizes must be at least 1".to_string()));
        }
        Ok(())
    }
}
