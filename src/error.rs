//! Error types for Relayflow.
//!
//! Errors returned to callers are represented by the `RelayflowError` enum.
//! Failures that happen inside a running workflow are not returned as errors;
//! they are described by a `HandlerErrorKind` and recorded on the run.

use std::{io::ErrorKind, string::FromUtf8Error};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::workflow::ValidationResult;

/// Unified error type for all Relayflow operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RelayflowError {
    /// The workflow graph is not runnable. Carries every problem found.
    #[error("validation failed: {0}")]
    ValidationFailed(ValidationResult),

    /// Unknown workflow, run, node or trigger id.
    #[error("{0} not found")]
    NotFound(String),

    /// Engine-level errors (startup, shutdown, lifecycle).
    #[error("{0}")]
    Engine(String),

    /// Configuration parsing errors.
    #[error("{0}")]
    Config(String),

    /// Data conversion errors (JSON, TOML).
    #[error("{0}")]
    Convert(String),

    /// Storage operation errors.
    #[error("{0}")]
    Store(String),

    /// Message queue errors.
    #[error("{0}")]
    Queue(String),

    /// Template variables that could not be resolved.
    #[error("{0}")]
    Template(String),

    /// Messaging or model client errors.
    #[error("{0}")]
    Client(String),

    /// I/O operation errors.
    #[error("{0}")]
    IoError(String),
}

/// Why a node handler failed.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, strum::AsRefStr, strum::Display, strum::EnumString)]
pub enum HandlerErrorKind {
    /// The handler did not finish within its timeout.
    Timeout,
    /// An external client (messaging, model) could not complete the call.
    TransportError,
    /// A `logic.if` comparison could not be evaluated for the given operands.
    InvalidComparison,
    /// The accumulated input does not fit what the handler needs.
    InvalidInput,
    /// A `logic.loop` was asked to iterate over more items than allowed.
    LoopLimitExceeded,
    /// Engine-side failure, e.g. no handler registered for a kind.
    Internal,
}

impl HandlerErrorKind {
    /// Whether a node's retry policy applies to this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(self, HandlerErrorKind::Timeout | HandlerErrorKind::TransportError)
    }
}

impl From<RelayflowError> for String {
    fn from(val: RelayflowError) -> Self {
        val.to_string()
    }
}

impl From<std::io::Error> for RelayflowError {
    fn from(error: std::io::Error) -> Self {
        RelayflowError::IoError(error.to_string())
    }
}

impl From<RelayflowError> for std::io::Error {
    fn from(val: RelayflowError) -> Self {
        #[allow(clippy::io_other_error)]
        std::io::Error::new(ErrorKind::Other, val.to_string())
    }
}

impl From<FromUtf8Error> for RelayflowError {
    fn from(_: FromUtf8Error) -> Self {
        RelayflowError::Convert("Error with utf-8 string convert".to_string())
    }
}

impl From<serde_json::Error> for RelayflowError {
    fn from(error: serde_json::Error) -> Self {
        RelayflowError::Convert(error.to_string())
    }
}

impl From<toml::de::Error> for RelayflowError {
    fn from(error: toml::de::Error) -> Self {
        RelayflowError::Config(error.to_string())
    }
}

impl From<reqwest::Error> for RelayflowError {
    fn from(error: reqwest::Error) -> Self {
        RelayflowError::Client(error.to_string())
    }
}
