//! Language model collaborator used to compose answers.

use crate::config::LlmSettings;
use crate::error::{CoachError, Result};
use crate::model::{Message, Role};
use crate::openai::create_client_with_timeout;
use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, instrument};

/// One prior turn handed to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl From<&Message> for ChatTurn {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role,
            content: message.content.clone(),
        }
    }
}

/// Everything the model sees for one turn.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    /// Prior turns, oldest first.
    pub history: Vec<ChatTurn>,
    /// The current user prompt, already rendered with context.
    pub prompt: String,
}

/// A generated answer.
#[derive(Debug, Clone)]
pub struct Completion {
    pub content: String,
    pub model: String,
    pub tokens_used: Option<u32>,
}

/// Chat-completion interface.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generate a reply for the request.
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion>;

    /// Model identifier reported in message metadata.
    fn model_name(&self) -> &str;
}

/// OpenAI chat-completions backed model.
pub struct OpenAIChatModel {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
    model: String,
    temperature: f32,
}

impl OpenAIChatModel {
    /// Create a model client from settings.
    pub fn from_settings(settings: &LlmSettings) -> Result<Self> {
        Ok(Self {
            client: create_client_with_timeout(Duration::from_secs(settings.timeout_seconds))?,
            model: settings.model.clone(),
            temperature: settings.temperature,
        })
    }

    fn to_request_message(turn: &ChatTurn) -> Result<ChatCompletionRequestMessage> {
        let message = match turn.role {
            Role::System => ChatCompletionRequestSystemMessageArgs::default()
                .content(turn.content.clone())
                .build()
                .map_err(|e| CoachError::UpstreamModel(e.to_string()))?
                .into(),
            Role::User => ChatCompletionRequestUserMessageArgs::default()
                .content(turn.content.clone())
                .build()
                .map_err(|e| CoachError::UpstreamModel(e.to_string()))?
                .into(),
            Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                .content(turn.content.clone())
                .build()
                .map_err(|e| CoachError::UpstreamModel(e.to_string()))?
                .into(),
        };
        Ok(message)
    }
}

#[async_trait]
impl LanguageModel for OpenAIChatModel {
    #[instrument(skip(self, request), fields(model = %self.model, history = request.history.len()))]
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        let mut messages = Vec::with_capacity(request.history.len() + 2);
        messages.push(Self::to_request_message(&ChatTurn {
            role: Role::System,
            content: request.system.clone(),
        })?);
        for turn in &request.history {
            messages.push(Self::to_request_message(turn)?);
        }
        messages.push(Self::to_request_message(&ChatTurn {
            role: Role::User,
            content: request.prompt.clone(),
        })?);

        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(self.temperature)
            .build()
            .map_err(|e| CoachError::UpstreamModel(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(chat_request)
            .await
            .map_err(|e| CoachError::UpstreamModel(format!("Failed to generate response: {}", e)))?;

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.as_ref())
            .ok_or_else(|| CoachError::UpstreamModel("Empty response from LLM".to_string()))?
            .clone();

        let tokens_used = response.usage.as_ref().map(|u| u.total_tokens);
        debug!(?tokens_used, "Generated response");

        Ok(Completion {
            content,
            model: response.model,
            tokens_used,
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
