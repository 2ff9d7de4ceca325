//! Testing helpers and mock utilities.
//!
//! Provides convenient constructors for mocked LLM providers.

use std::sync::Arc;

use crate::llm::{LlmError, LlmProvider, MockLlmProvider};
use mockall::predicate::*;

/// Create a mock LLM provider that returns `response_text` for every call.
///
/// # Example
///
/// ```rust,ignore
/// use kaz_bot_core::testing::replying_provider;
///
/// let provider = replying_provider("Hello, world!");
/// ```
#[must_use]
pub fn replying_provider(response_text: &'static str) -> Arc<dyn LlmProvider> {
    let mut mock = MockLlmProvider::new();
    mock.expect_chat_completion()
        .with(always(), always(), always())
        .returning(move |_, _, _| Ok(response_text.to_string()));
    Arc::new(mock)
}

/// Create a mock LLM provider that fails exactly `calls` times.
///
/// The expectation is verified when the mock is dropped, so a test using it
/// also checks that no extra attempt was made.
#[must_use]
pub fn failing_provider(calls: usize) -> Arc<dyn LlmProvider> {
    let mut mock = MockLlmProvider::new();
    mock.expect_chat_completion()
        .times(calls)
        .returning(|_, _, _| Err(LlmError::ApiError("429 Too Many Requests".to_string())));
    Arc::new(mock)
}
