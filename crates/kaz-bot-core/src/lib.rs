#![deny(missing_docs)]
//! KAZ bot core library.
//!
//! Conversation reconstruction from channel history and credential-rotating
//! completion calls against the LLM provider.

/// Completion calls with credential rotation.
pub mod completion;
/// Configuration management.
pub mod config;
/// Conversation assembly from channel history.
pub mod conversation;
/// LLM providers and client abstraction.
pub mod llm;

#[cfg(test)]
pub mod testing;
