//! Chat model collaborator
//!
//! The dispatcher talks to the text-generation service through the
//! [`ChatModel`] trait so the decision logic can be exercised with a fake.
//! The real implementation calls the OpenAI chat completion API under an
//! explicit timeout; a timeout is an ordinary failure, not a hang.

use async_trait::async_trait;
use log::debug;
use openai::chat::{ChatCompletion, ChatCompletionMessage, ChatCompletionMessageRole};
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;

/// Why a model call produced no usable answer
#[derive(Debug, Error)]
pub enum AiError {
    #[error("the model took too long to answer")]
    Timeout,
    #[error("model call failed: {0}")]
    Upstream(String),
    #[error("the model returned an empty answer")]
    EmptyResponse,
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// One single-turn completion: persona instruction + user prompt in,
    /// generated text out.
    async fn complete(&self, system_prompt: &str, prompt: &str) -> Result<String, AiError>;
}

/// OpenAI-backed [`ChatModel`]. The API key is read from the environment
/// by the client library.
pub struct OpenAiChat {
    model: String,
    call_timeout: Duration,
}

pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

impl OpenAiChat {
    pub fn new(model: String) -> Self {
        OpenAiChat {
            model,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_timeout(model: String, call_timeout: Duration) -> Self {
        OpenAiChat {
            model,
            call_timeout,
        }
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    async fn complete(&self, system_prompt: &str, prompt: &str) -> Result<String, AiError> {
        let messages = vec![
            ChatCompletionMessage {
                role: ChatCompletionMessageRole::System,
                content: Some(system_prompt.to_string()),
                name: None,
                function_call: None,
                tool_call_id: None,
                tool_calls: None,
            },
            ChatCompletionMessage {
                role: ChatCompletionMessageRole::User,
                content: Some(prompt.to_string()),
                name: None,
                function_call: None,
                tool_call_id: None,
                tool_calls: None,
            },
        ];

        debug!("Sending {} messages to model {}", messages.len(), self.model);

        let completion = timeout(
            self.call_timeout,
            ChatCompletion::builder(&self.model, messages).create(),
        )
        .await
        .map_err(|_| AiError::Timeout)?
        .map_err(|e| AiError::Upstream(e.to_string()))?;

        let response = completion
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default()
            .trim()
            .to_string();

        if response.is_empty() {
            return Err(AiError::EmptyResponse);
        }

        debug!("Model answered with {} chars", response.len());
        Ok(response)
    }
}
