#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use async_openai::{
    Client as OpenAIClient,
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs, FinishReason,
    },
};
use async_trait::async_trait;

use super::{BackendKind, ChatMessage, CompletionBackend, Role};
use crate::{config::ChatServiceEnv, error::BackendError};

/// Chat-completions backend for OpenAI-compatible services.
pub struct ChatServiceBackend {
    /// Configured API client.
    client:      OpenAIClient<OpenAIConfig>,
    /// Model identifier sent with every request.
    model:       String,
    /// Sampling temperature.
    temperature: f32,
    /// Maximum number of completion tokens.
    max_tokens:  u32,
}

impl ChatServiceBackend {
    /// Builds a backend from chat-service settings. Fails when no API key is
    /// configured.
    pub fn from_env(env: &ChatServiceEnv) -> Result<Self, BackendError> {
        let api_key = env
            .api_key()
            .ok_or_else(|| BackendError::NotConfigured("OPENAI_API_KEY is not set".into()))?;

        let client = OpenAIClient::with_config(
            OpenAIConfig::new()
                .with_api_base(env.api_base().to_owned())
                .with_api_key(api_key.to_owned()),
        );

        Ok(Self {
            client,
            model: env.model().to_owned(),
            temperature: env.temperature(),
            max_tokens: env.max_tokens(),
        })
    }

    /// Replaces the model identifier.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

/// Converts a backend-neutral message into the request type.
fn to_request_message(message: &ChatMessage) -> Result<ChatCompletionRequestMessage, OpenAIError> {
    let content = message.content.clone();
    Ok(match message.role {
        Role::System => ChatCompletionRequestSystemMessageArgs::default()
            .content(content)
            .build()?
            .into(),
        Role::User => ChatCompletionRequestUserMessageArgs::default()
            .content(content)
            .build()?
            .into(),
        Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
            .content(content)
            .build()?
            .into(),
    })
}

#[async_trait]
impl CompletionBackend for ChatServiceBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::ChatService
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn supports_history(&self) -> bool {
        true
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, BackendError> {
        let messages = messages
            .iter()
            .map(to_request_message)
            .collect::<Result<Vec<_>, _>>()?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(self.model.clone())
            .messages(messages)
            .temperature(self.temperature)
            .max_completion_tokens(self.max_tokens)
            .build()?;

        tracing::debug!(model = %self.model, "Sending chat completion request");
        let response = self.client.chat().create(request).await?;
        let choice = response.choices.into_iter().next();

        if let Some(choice) = &choice
            && matches!(choice.finish_reason, Some(FinishReason::Length))
        {
            tracing::warn!(
                model = %self.model,
                max_tokens = self.max_tokens,
                "Completion hit the token limit and is likely truncated"
            );
        }

        choice
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(BackendError::EmptyResponse)
    }
}
