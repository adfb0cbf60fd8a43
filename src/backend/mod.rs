#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Completion backends.
//!
//! A backend turns an ordered list of role-tagged messages into a single
//! completion text. The grading pipeline borrows a backend handle owned by
//! the caller; nothing here is process-wide.

/// External agent process backend.
pub mod agent;
/// OpenAI-compatible chat-service backend.
pub mod chat;

use std::{fmt::Display, str::FromStr};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use agent::AgentProcessBackend;
pub use chat::ChatServiceBackend;

use crate::{config::GraderConfig, error::BackendError};

/// Which kind of completion backend serves a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// A chat-style model service reached over HTTP.
    #[default]
    ChatService,
    /// An external command-line agent process.
    AgentProcess,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chat" | "chat-service" | "chat_service" => Ok(BackendKind::ChatService),
            "agent" | "agent-process" | "agent_process" => Ok(BackendKind::AgentProcess),
            other => Err(format!("unknown backend `{other}` (expected `chat` or `agent`)")),
        }
    }
}

impl Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::ChatService => write!(f, "chat-service"),
            BackendKind::AgentProcess => write!(f, "agent-process"),
        }
    }
}

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Framing instructions.
    System,
    /// The grader's request.
    User,
    /// A previous completion.
    Assistant,
}

/// A single role-tagged message sent to a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Author of the message.
    pub role:    Role,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    /// Creates a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role:    Role::System,
            content: content.into(),
        }
    }

    /// Creates a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role:    Role::User,
            content: content.into(),
        }
    }

    /// Creates an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role:    Role::Assistant,
            content: content.into(),
        }
    }
}

/// A service that turns a prompt into free text.
///
/// Implementations own their timeouts and cancellation; callers treat any
/// `Err` as a hard failure.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Which variant this backend is.
    fn kind(&self) -> BackendKind;

    /// Model identifier actually used for completions.
    fn model_id(&self) -> &str;

    /// Whether earlier turns can be replayed as conversation history.
    fn supports_history(&self) -> bool;

    /// Requests one completion for the given messages.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, BackendError>;
}

/// Builds the requested backend from configuration, optionally overriding the
/// model identifier.
pub fn from_config(
    kind: BackendKind,
    config: &GraderConfig,
    model: Option<String>,
) -> Result<Box<dyn CompletionBackend>, BackendError> {
    match kind {
        BackendKind::ChatService => {
            let mut backend = ChatServiceBackend::from_env(config.chat())?;
            if let Some(model) = model {
                backend = backend.with_model(model);
            }
            Ok(Box::new(backend))
        }
        BackendKind::AgentProcess => {
            let env = config.agent();
            let backend = AgentProcessBackend::builder()
                .command(env.command())
                .args(env.args().to_vec())
                .maybe_model_flag(env.model_flag().map(str::to_owned))
                .maybe_model(model.or_else(|| env.model().map(str::to_owned)))
                .timeout(env.timeout())
                .max_output_bytes(env.max_output_bytes())
                .build();
            Ok(Box::new(backend))
        }
    }
}
