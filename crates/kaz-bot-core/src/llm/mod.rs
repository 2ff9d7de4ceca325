//! LLM providers and client
//!
//! Provides the provider interface consumed by the completion invoker and the
//! Groq implementation behind it.

mod common;
mod openai_compat;
/// Implementations of specific LLM providers
pub mod providers;

use std::sync::Arc;

use thiserror::Error;

use crate::conversation::ConversationTurn;

/// Errors that can occur during LLM operations
#[derive(Debug, Error)]
pub enum LlmError {
    /// Error returned by the provider's API
    #[error("API error: {0}")]
    ApiError(String),
    /// Error during network communication
    #[error("Network error: {0}")]
    NetworkError(String),
    /// Missing provider configuration or API key
    #[error("Missing client/API key: {0}")]
    MissingConfig(String),
    /// The provider answered without any generated text
    #[error("Empty response from provider")]
    EmptyResponse,
    /// The call did not finish within the configured bound
    #[error("Request timed out after {0}s")]
    Timeout(u64),
    /// Any other unexpected error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

/// Interface for all LLM providers
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate a chat completion for an already assembled conversation
    async fn chat_completion(
        &self,
        turns: &[ConversationTurn],
        model_id: &str,
        temperature: f32,
    ) -> Result<String, LlmError>;
}

/// Builds a provider client bound to a single credential
#[cfg_attr(test, mockall::automock)]
pub trait ProviderFactory: Send + Sync {
    /// Construct a client that authenticates with `api_key`
    ///
    /// # Errors
    ///
    /// Returns an `LlmError` if the client cannot be constructed.
    fn build(&self, api_key: &str) -> Result<Arc<dyn LlmProvider>, LlmError>;
}
