#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{str::FromStr, time::Duration};

use crate::backend::BackendKind;

/// Default OpenAI-compatible endpoint.
const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
/// Default chat model identifier.
const DEFAULT_MODEL: &str = "gpt-4o-mini";
/// Default sampling temperature for grading requests.
const DEFAULT_TEMPERATURE: f32 = 0.2;
/// Default generation cap for grading requests.
const DEFAULT_MAX_TOKENS: u32 = 4096;
/// Default agent command.
const DEFAULT_AGENT_COMMAND: &str = "claude";
/// Default agent arguments.
const DEFAULT_AGENT_ARGS: &str = "-p";
/// Default flag used to pass a model identifier to the agent.
const DEFAULT_AGENT_MODEL_FLAG: &str = "--model";
/// Default wall-clock limit for one agent run, in seconds.
const DEFAULT_AGENT_TIMEOUT_SECS: u64 = 300;
/// Default stdout cap for one agent run, in bytes.
const DEFAULT_AGENT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// Chat-service credentials and decoding options sourced from the
/// environment.
#[derive(Debug, Clone)]
pub struct ChatServiceEnv {
    /// Base URL for the OpenAI-compatible API endpoint.
    api_base:    String,
    /// API key used to authenticate requests, if provided.
    api_key:     Option<String>,
    /// Default model identifier for chat completions.
    model:       String,
    /// Sampling temperature.
    temperature: f32,
    /// Maximum number of completion tokens per request.
    max_tokens:  u32,
}

impl ChatServiceEnv {
    /// Reads the chat-service settings through `lookup`.
    fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Self {
        Self {
            api_base:    read_string(lookup, "AUTOGRADE_OPENAI_ENDPOINT", DEFAULT_API_BASE),
            api_key:     read_optional(lookup, "OPENAI_API_KEY"),
            model:       read_string(lookup, "AUTOGRADE_MODEL", DEFAULT_MODEL),
            temperature: read_parsed(lookup, "AUTOGRADE_TEMPERATURE", DEFAULT_TEMPERATURE),
            max_tokens:  read_parsed(lookup, "AUTOGRADE_MAX_TOKENS", DEFAULT_MAX_TOKENS),
        }
    }

    /// Returns the API base URL.
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Returns the API key, if configured.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    /// Returns the default model identifier.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Returns the sampling temperature.
    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    /// Returns the completion token cap.
    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }
}

/// Settings for the external agent process backend.
#[derive(Debug, Clone)]
pub struct AgentEnv {
    /// Program to execute.
    command:          String,
    /// Arguments passed before the model flag.
    args:             Vec<String>,
    /// Flag used to pass the model identifier, if any.
    model_flag:       Option<String>,
    /// Model identifier handed to the agent, if any.
    model:            Option<String>,
    /// Wall-clock limit for one run.
    timeout:          Duration,
    /// Stdout cap for one run.
    max_output_bytes: usize,
}

impl AgentEnv {
    /// Reads the agent settings through `lookup`.
    fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Self {
        let args = read_string(lookup, "AUTOGRADE_AGENT_ARGS", DEFAULT_AGENT_ARGS)
            .split_whitespace()
            .map(str::to_owned)
            .collect();
        // an explicitly empty flag disables passing the model
        let model_flag = match lookup("AUTOGRADE_AGENT_MODEL_FLAG") {
            Some(flag) if flag.trim().is_empty() => None,
            Some(flag) => Some(flag.trim().to_owned()),
            None => Some(DEFAULT_AGENT_MODEL_FLAG.to_owned()),
        };

        Self {
            command: read_string(lookup, "AUTOGRADE_AGENT_COMMAND", DEFAULT_AGENT_COMMAND),
            args,
            model_flag,
            model: read_optional(lookup, "AUTOGRADE_AGENT_MODEL"),
            timeout: read_timeout_secs(
                lookup,
                "AUTOGRADE_AGENT_TIMEOUT_SECS",
                DEFAULT_AGENT_TIMEOUT_SECS,
            ),
            max_output_bytes: read_parsed(
                lookup,
                "AUTOGRADE_AGENT_MAX_OUTPUT_BYTES",
                DEFAULT_AGENT_MAX_OUTPUT_BYTES,
            ),
        }
    }

    /// Returns the program to execute.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Returns the configured arguments.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Returns the flag used to pass a model identifier, if any.
    pub fn model_flag(&self) -> Option<&str> {
        self.model_flag.as_deref()
    }

    /// Returns the configured agent model, if any.
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    /// Returns the wall-clock limit for one run.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the stdout cap for one run.
    pub fn max_output_bytes(&self) -> usize {
        self.max_output_bytes
    }
}

/// Runtime configuration for the grading backends.
///
/// This is an owned value: callers build it once and hand it to
/// [`crate::backend::from_config`], there is no process-wide instance.
#[derive(Debug, Clone)]
pub struct GraderConfig {
    /// Chat-service settings.
    chat:            ChatServiceEnv,
    /// Agent-process settings.
    agent:           AgentEnv,
    /// Backend used when the caller does not pick one.
    default_backend: BackendKind,
}

impl GraderConfig {
    /// Builds a configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let default_backend = match read_optional(&lookup, "AUTOGRADE_BACKEND") {
            Some(value) => value.parse().unwrap_or_else(|err| {
                tracing::warn!("Ignoring AUTOGRADE_BACKEND: {err}");
                BackendKind::default()
            }),
            None => BackendKind::default(),
        };

        Self {
            chat: ChatServiceEnv::from_lookup(&lookup),
            agent: AgentEnv::from_lookup(&lookup),
            default_backend,
        }
    }

    /// Returns the chat-service settings.
    pub fn chat(&self) -> &ChatServiceEnv {
        &self.chat
    }

    /// Returns the agent-process settings.
    pub fn agent(&self) -> &AgentEnv {
        &self.agent
    }

    /// Returns the backend used when none is requested explicitly.
    pub fn default_backend(&self) -> BackendKind {
        self.default_backend
    }
}

/// Reads a trimmed, non-empty value.
fn read_optional(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key)
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

/// Reads a string value, falling back to `default` when missing or blank.
fn read_string(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: &str) -> String {
    read_optional(lookup, key).unwrap_or_else(|| default.to_owned())
}

/// Parses a value, falling back to `default` when parsing fails or the key is
/// missing.
fn read_parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    read_optional(lookup, key)
        .and_then(|value| value.parse::<T>().ok())
        .unwrap_or(default)
}

/// Parses a value into a `Duration` of seconds, falling back to
/// `default_secs` when parsing fails or the key is missing.
fn read_timeout_secs(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default_secs: u64,
) -> Duration {
    Duration::from_secs(read_parsed(lookup, key, default_secs))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> GraderConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        GraderConfig::from_lookup(move |key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_environment_is_empty() {
        let config = config_from(&[]);

        assert_eq!(config.chat().api_base(), DEFAULT_API_BASE);
        assert_eq!(config.chat().model(), DEFAULT_MODEL);
        assert!(config.chat().api_key().is_none());
        assert_eq!(config.chat().max_tokens(), DEFAULT_MAX_TOKENS);
        assert_eq!(config.agent().command(), "claude");
        assert_eq!(config.agent().args(), ["-p".to_string()]);
        assert_eq!(config.agent().model_flag(), Some("--model"));
        assert_eq!(config.agent().timeout(), Duration::from_secs(300));
        assert_eq!(config.default_backend(), BackendKind::ChatService);
    }

    #[test]
    fn unparseable_numbers_fall_back_to_defaults() {
        let config = config_from(&[
            ("AUTOGRADE_TEMPERATURE", "warm"),
            ("AUTOGRADE_AGENT_TIMEOUT_SECS", "-3"),
            ("AUTOGRADE_AGENT_MAX_OUTPUT_BYTES", "lots"),
        ]);

        assert_eq!(config.chat().temperature(), DEFAULT_TEMPERATURE);
        assert_eq!(config.agent().timeout(), Duration::from_secs(DEFAULT_AGENT_TIMEOUT_SECS));
        assert_eq!(config.agent().max_output_bytes(), DEFAULT_AGENT_MAX_OUTPUT_BYTES);
    }

    #[test]
    fn explicit_values_override_defaults() {
        let config = config_from(&[
            ("OPENAI_API_KEY", "  sk-test  "),
            ("AUTOGRADE_MODEL", "gpt-4.1"),
            ("AUTOGRADE_AGENT_ARGS", "run --quiet"),
            ("AUTOGRADE_AGENT_MODEL_FLAG", ""),
            ("AUTOGRADE_AGENT_TIMEOUT_SECS", "12"),
            ("AUTOGRADE_BACKEND", "agent"),
        ]);

        assert_eq!(config.chat().api_key(), Some("sk-test"));
        assert_eq!(config.chat().model(), "gpt-4.1");
        assert_eq!(config.agent().args(), ["run".to_string(), "--quiet".to_string()]);
        assert_eq!(config.agent().model_flag(), None);
        assert_eq!(config.agent().timeout(), Duration::from_secs(12));
        assert_eq!(config.default_backend(), BackendKind::AgentProcess);
    }
}
