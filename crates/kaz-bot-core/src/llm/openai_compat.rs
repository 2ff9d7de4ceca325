//! OpenAI-compatible provider utilities
//!
//! Shared implementation for providers using the async-openai client.

use super::common::{build_openai_messages, extract_openai_response};
use super::LlmError;
use crate::conversation::ConversationTurn;
use async_openai::error::OpenAIError;
use async_openai::{config::OpenAIConfig, types::chat::CreateChatCompletionRequestArgs, Client};

/// Perform a chat completion using an OpenAI-compatible API
pub async fn chat_completion(
    client: &Client<OpenAIConfig>,
    turns: &[ConversationTurn],
    model_id: &str,
    temperature: f32,
) -> Result<String, LlmError> {
    let messages = build_openai_messages(turns)?;

    let request = CreateChatCompletionRequestArgs::default()
        .model(model_id)
        .messages(messages)
        .temperature(temperature)
        .build()
        .map_err(|e| LlmError::Unknown(e.to_string()))?;

    let response = client
        .chat()
        .create(request)
        .await
        .map_err(map_openai_error)?;

    extract_openai_response(&response)
}

fn map_openai_error(error: OpenAIError) -> LlmError {
    match error {
        OpenAIError::Reqwest(e) => LlmError::NetworkError(e.to_string()),
        other => LlmError::ApiError(other.to_string()),
    }
}
