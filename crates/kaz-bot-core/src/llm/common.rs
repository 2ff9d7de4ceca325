//! Common utilities for LLM providers
//!
//! Helpers for building request messages and parsing responses of
//! OpenAI-compatible APIs.

use super::LlmError;
use crate::conversation::{ConversationTurn, Role};
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionResponse,
};

/// Convert assembled turns into OpenAI chat messages, preserving order
///
/// # Errors
///
/// Returns `LlmError::Unknown` if message building fails.
pub fn build_openai_messages(
    turns: &[ConversationTurn],
) -> Result<Vec<ChatCompletionRequestMessage>, LlmError> {
    turns
        .iter()
        .map(|turn| -> Result<ChatCompletionRequestMessage, LlmError> {
            let message: ChatCompletionRequestMessage = match turn.role {
                Role::System => ChatCompletionRequestSystemMessageArgs::default()
                    .content(turn.content.clone())
                    .build()
                    .map_err(|e| LlmError::Unknown(e.to_string()))?
                    .into(),
                Role::User => ChatCompletionRequestUserMessageArgs::default()
                    .content(turn.content.clone())
                    .build()
                    .map_err(|e| LlmError::Unknown(e.to_string()))?
                    .into(),
                Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                    .content(turn.content.clone())
                    .build()
                    .map_err(|e| LlmError::Unknown(e.to_string()))?
                    .into(),
            };
            Ok(message)
        })
        .collect()
}

/// Extract text content from an OpenAI-compatible chat completion response
///
/// # Errors
///
/// Returns `LlmError::EmptyResponse` if there is no choice or no content.
pub fn extract_openai_response(
    response: &CreateChatCompletionResponse,
) -> Result<String, LlmError> {
    response
        .choices
        .first()
        .and_then(|c| c.message.content.clone())
        .ok_or(LlmError::EmptyResponse)
}
