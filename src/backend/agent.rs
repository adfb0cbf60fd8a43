#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{ffi::OsString, time::Duration};

use async_trait::async_trait;
use bon::Builder;

use super::{BackendKind, ChatMessage, CompletionBackend, Role};
use crate::{
    error::BackendError,
    process::{RunLimits, StdinSource, run_collect},
};

/// Runs an external command-line agent, piping the prompt on stdin and
/// reading the completion from stdout.
#[derive(Debug, Clone, Builder)]
#[builder(on(String, into))]
pub struct AgentProcessBackend {
    /// Program to execute.
    command:          String,
    /// Arguments passed before the model flag.
    #[builder(default)]
    args:             Vec<String>,
    /// Flag used to pass the model identifier.
    model_flag:       Option<String>,
    /// Model identifier handed to the agent.
    model:            Option<String>,
    /// Wall-clock limit for one run.
    #[builder(default = Duration::from_secs(300))]
    timeout:          Duration,
    /// Stdout cap for one run.
    #[builder(default = 1024 * 1024)]
    max_output_bytes: usize,
}

impl AgentProcessBackend {
    /// Full argument list for one run.
    fn command_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = self.args.iter().map(OsString::from).collect();
        if let (Some(flag), Some(model)) = (&self.model_flag, &self.model) {
            args.push(flag.into());
            args.push(model.into());
        }
        args
    }
}

/// Collapses a conversation into the single prompt an agent accepts: the
/// last user turn, or every message joined when there is none.
fn flatten_prompt(messages: &[ChatMessage]) -> String {
    match messages.iter().rev().find(|m| m.role == Role::User) {
        Some(message) => message.content.clone(),
        None => messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n"),
    }
}

#[async_trait]
impl CompletionBackend for AgentProcessBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::AgentProcess
    }

    fn model_id(&self) -> &str {
        self.model.as_deref().unwrap_or(&self.command)
    }

    fn supports_history(&self) -> bool {
        false
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, BackendError> {
        let prompt = flatten_prompt(messages);
        let limits = RunLimits {
            deadline:   Some(self.timeout),
            max_stdout: Some(self.max_output_bytes),
        };

        tracing::debug!(command = %self.command, bytes = prompt.len(), "Running agent process");
        let collected = run_collect(
            &self.command,
            &self.command_args(),
            StdinSource::Bytes(prompt.into_bytes()),
            limits,
        )
        .await?;

        if !collected.status.success() {
            return Err(BackendError::NonZeroExit {
                code:   collected.status.code(),
                stderr: String::from_utf8_lossy(&collected.stderr).trim().to_owned(),
            });
        }

        let text = String::from_utf8_lossy(&collected.stdout).into_owned();
        if text.trim().is_empty() {
            return Err(BackendError::EmptyResponse);
        }
        Ok(text)
    }
}
