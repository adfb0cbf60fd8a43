#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::time::Duration;

use async_openai::error::OpenAIError;

use crate::process::ProcessError;

/// Hard failures talking to a completion backend.
///
/// These are never retried by the grading pipeline; retry is reserved for
/// completions that arrive but cannot be parsed.
#[derive(thiserror::Error, Debug)]
pub enum BackendError {
    /// The backend is missing required configuration.
    #[error("Completion backend is not configured: {0}")]
    NotConfigured(String),
    /// The chat service rejected the request or could not be reached.
    #[error("Chat service request failed: {0}")]
    Request(String),
    /// The backend answered without any completion text.
    #[error("Completion backend returned no content")]
    EmptyResponse,
    /// The agent process could not be started or its pipes failed.
    #[error("Could not run agent process: {0}")]
    Spawn(String),
    /// The agent process exceeded its wall-clock limit.
    #[error("Agent process did not finish within {0:?}")]
    Timeout(Duration),
    /// The agent process exited unsuccessfully.
    #[error("Agent process exited with status {code:?}: {stderr}")]
    NonZeroExit {
        /// Exit code, if the process was not killed by a signal.
        code:   Option<i32>,
        /// Captured standard error, trimmed.
        stderr: String,
    },
    /// The agent process wrote more than the configured cap to stdout.
    #[error("Agent process output exceeded {limit} bytes")]
    OutputTooLarge {
        /// Configured stdout cap in bytes.
        limit: usize,
    },
}

impl From<OpenAIError> for BackendError {
    fn from(err: OpenAIError) -> Self {
        BackendError::Request(err.to_string())
    }
}

impl From<ProcessError> for BackendError {
    fn from(err: ProcessError) -> Self {
        match err {
            ProcessError::TimedOut(limit) => BackendError::Timeout(limit),
            ProcessError::OutputTooLarge(limit) => BackendError::OutputTooLarge { limit },
            other => BackendError::Spawn(other.to_string()),
        }
    }
}
