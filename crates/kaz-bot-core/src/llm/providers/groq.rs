use std::sync::Arc;

use crate::conversation::ConversationTurn;
use crate::llm::{openai_compat, LlmError, LlmProvider, ProviderFactory};
use async_openai::{config::OpenAIConfig, Client};
use async_trait::async_trait;

/// Base URL of Groq's OpenAI-compatible API
pub const GROQ_API_BASE: &str = "https://api.groq.com/openai/v1";

/// LLM provider implementation for Groq
pub struct GroqProvider {
    client: Client<OpenAIConfig>,
}

impl GroqProvider {
    /// Create a new Groq provider instance
    ///
    /// # Errors
    ///
    /// Returns `LlmError::MissingConfig` if the key is blank.
    pub fn new(api_key: &str, api_base: &str) -> Result<Self, LlmError> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(LlmError::MissingConfig("empty Groq API key".to_string()));
        }
        let config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(api_base);
        Ok(Self {
            client: Client::with_config(config),
        })
    }
}

#[async_trait]
impl LlmProvider for GroqProvider {
    async fn chat_completion(
        &self,
        turns: &[ConversationTurn],
        model_id: &str,
        temperature: f32,
    ) -> Result<String, LlmError> {
        openai_compat::chat_completion(&self.client, turns, model_id, temperature).await
    }
}

/// Builds a [`GroqProvider`] per credential
#[derive(Debug, Clone)]
pub struct GroqProviderFactory {
    api_base: String,
}

impl GroqProviderFactory {
    /// Factory pointed at the public Groq endpoint
    #[must_use]
    pub fn new() -> Self {
        Self::with_api_base(GROQ_API_BASE)
    }

    /// Factory pointed at a custom OpenAI-compatible endpoint
    #[must_use]
    pub fn with_api_base(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
        }
    }
}

impl Default for GroqProviderFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderFactory for GroqProviderFactory {
    fn build(&self, api_key: &str) -> Result<Arc<dyn LlmProvider>, LlmError> {
        Ok(Arc::new(GroqProvider::new(api_key, &self.api_base)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_key_is_rejected() {
        let factory = GroqProviderFactory::new();
        assert!(matches!(
            factory.build("  "),
            Err(LlmError::MissingConfig(_))
        ));
    }

    #[test]
    fn test_key_builds_client() {
        let factory = GroqProviderFactory::with_api_base("http://127.0.0.1:9/v1");
        assert!(factory.build("gsk_test").is_ok());
    }
}
