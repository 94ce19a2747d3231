//! Typed error hierarchy for the command gateway.
//!
//! Four enums cover the request lifecycle:
//! - `TranslationError`: the request body could not be turned into tokens
//! - `CaptureError`: the capture buffer could not be created or finalized
//! - `InfrastructureError`: the runner could not complete an invocation
//! - `ActionError`: the invoked command itself reported failure
//!
//! Only the first three ever reach the HTTP layer as a status code.
//! `ActionError` is rendered into the captured output by the registry and
//! the invocation still counts as a success at the transport level.

use thiserror::Error;

/// Errors from translating an HTTP request into command-line tokens.
#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("Malformed request body: {0}")]
    MalformedBody(#[source] serde_json::Error),

    #[error("Request body must be a JSON object, got {found}")]
    NotAnObject { found: &'static str },

    #[error("Flag names must not be empty")]
    EmptyFlagName,
}

/// Errors from the invocation-private capture buffer.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Failed to allocate capture buffer of {requested} bytes")]
    Allocate {
        requested: usize,
        #[source]
        source: std::collections::TryReserveError,
    },

    #[error("Captured output exceeded the limit of {limit} bytes")]
    LimitExceeded { limit: usize },

    #[error("Capture writer still open while finalizing")]
    WriterStillOpen,

    #[error("Capture buffer lock poisoned")]
    Poisoned,
}

/// Errors that abort an invocation without producing captured output.
#[derive(Debug, Error)]
pub enum InfrastructureError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error("Failed to write to the console sink: {0}")]
    Console(#[source] std::io::Error),

    #[error("Command action panicked")]
    ActionPanicked,

    #[error("Invocation task failed: {0}")]
    Join(String),
}

/// Failure reported by the command tree for one invocation.
///
/// By the time a caller sees this the registry has already written its
/// human-readable rendering into the output sink.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("Usage error: {0}")]
    Usage(String),

    #[error("Action failed: {0:#}")]
    Failed(anyhow::Error),

    #[error("Failed to write command output: {0}")]
    Output(#[from] std::io::Error),
}
