//! Configuration and settings management
//!
//! Loads core settings from config files and environment variables and
//! defines the model constants.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// Model used for every completion call
pub const DEFAULT_LLM_MODEL: &str = "llama-3.1-8b-instant";
/// Sampling temperature for chat completions
pub const DEFAULT_LLM_TEMPERATURE: f32 = 0.7;
/// Upper bound for a single completion call
pub const DEFAULT_LLM_TIMEOUT_SECS: u64 = 60;
/// Reply sent when the provider could not produce an answer
pub const DEFAULT_FALLBACK_REPLY: &str = "ごめん、ちょっと考え中...";
/// Prefix of the numbered API key variables (`GROQ_API_KEY1`, `GROQ_API_KEY2`, ...)
pub const GROQ_API_KEY_ENV_PREFIX: &str = "GROQ_API_KEY";

/// Builds the layered configuration shared by all crates.
///
/// Sources, lowest priority first: `config/default`, `config/{RUN_MODE}`,
/// `config/local`, `APP__`-prefixed environment, plain environment.
///
/// # Errors
///
/// Returns a `ConfigError` if a present source cannot be parsed.
pub fn build_config() -> Result<Config, ConfigError> {
    let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

    Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
        // This file shouldn't be checked into git
        .add_source(File::with_name("config/local").required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        // Environment::default() maps UPPER_SNAKE_CASE to snake_case,
        // ignore_empty treats empty env vars as unset
        .add_source(Environment::default().ignore_empty(true))
        .build()
}

/// Core settings loaded from environment variables
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CoreSettings {
    /// Comma-separated list of Groq API keys, tried in order
    #[serde(rename = "groq_api_keys")]
    pub groq_api_keys_str: Option<String>,

    /// System preamble sent as the first turn of every conversation
    pub kaz_context: Option<String>,

    /// Model identifier passed to the provider
    #[serde(default = "default_llm_model")]
    pub llm_model: String,

    /// Sampling temperature
    #[serde(default = "default_llm_temperature")]
    pub llm_temperature: f32,

    /// Timeout for one completion call, in seconds
    #[serde(default = "default_llm_timeout_secs")]
    pub llm_timeout_secs: u64,

    /// Reply used when the provider fails
    #[serde(default = "default_fallback_reply")]
    pub fallback_reply: String,

    /// Keys from `GROQ_API_KEY1`, `GROQ_API_KEY2`, ... in any config source
    #[serde(skip)]
    pub numbered_api_keys: Vec<String>,
}

fn default_llm_model() -> String {
    DEFAULT_LLM_MODEL.to_string()
}

const fn default_llm_temperature() -> f32 {
    DEFAULT_LLM_TEMPERATURE
}

const fn default_llm_timeout_secs() -> u64 {
    DEFAULT_LLM_TIMEOUT_SECS
}

fn default_fallback_reply() -> String {
    DEFAULT_FALLBACK_REPLY.to_string()
}

impl Default for CoreSettings {
    fn default() -> Self {
        Self {
            groq_api_keys_str: None,
            kaz_context: None,
            llm_model: default_llm_model(),
            llm_temperature: default_llm_temperature(),
            llm_timeout_secs: default_llm_timeout_secs(),
            fallback_reply: default_fallback_reply(),
            numbered_api_keys: Vec::new(),
        }
    }
}

impl CoreSettings {
    /// Create new settings by loading from environment and files
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use kaz_bot_core::config::CoreSettings;
    ///
    /// let settings = CoreSettings::new().expect("Failed to load configuration");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails or a required value is missing.
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_config(&build_config()?)
    }

    /// Deserialize and validate settings from an already built `Config`.
    ///
    /// Numbered keys are looked up in the same layered table, so they may come
    /// from config files as well as the environment.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if deserialization fails or a required value
    /// is missing.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let mut settings: Self = config.clone().try_deserialize()?;
        settings.numbered_api_keys = numbered_api_keys(GROQ_API_KEY_ENV_PREFIX, |name| {
            // config keys are lowercased by every source
            config.get_string(&name.to_lowercase()).ok()
        });
        settings.validate()?;
        Ok(settings)
    }

    /// Checks the values the bot cannot start without.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Message` naming the first missing value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.groq_api_keys().is_empty() {
            return Err(ConfigError::Message(
                "no Groq API key configured (GROQ_API_KEY1 or GROQ_API_KEYS)".to_string(),
            ));
        }
        if self.system_context().is_none() {
            return Err(ConfigError::Message("KAZ_CONTEXT is not set".to_string()));
        }
        Ok(())
    }

    /// Returns the configured system preamble, unless it is blank
    #[must_use]
    pub fn system_context(&self) -> Option<&str> {
        self.kaz_context
            .as_deref()
            .filter(|s| !s.trim().is_empty())
    }

    /// Returns every configured API key in rotation order.
    ///
    /// Numbered keys come first, followed by the `GROQ_API_KEYS` list.
    /// Duplicates are dropped.
    #[must_use]
    pub fn groq_api_keys(&self) -> Vec<String> {
        let mut keys = self.numbered_api_keys.clone();
        if let Some(list) = &self.groq_api_keys_str {
            keys.extend(parse_key_list(list));
        }
        let mut seen = std::collections::HashSet::new();
        keys.retain(|k| seen.insert(k.clone()));
        keys
    }
}

/// Splits a comma, semicolon or whitespace separated key list.
#[must_use]
pub fn parse_key_list(list: &str) -> Vec<String> {
    list.split(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

/// Reads `{prefix}1`, `{prefix}2`, ... until the first unset or empty slot.
pub fn numbered_api_keys<F>(prefix: &str, lookup: F) -> Vec<String>
where
    F: Fn(&str) -> Option<String>,
{
    (1..)
        .map(|n| lookup(&format!("{prefix}{n}")))
        .take_while(|v| v.as_deref().is_some_and(|s| !s.trim().is_empty()))
        .flatten()
        .map(|s| s.trim().to_string())
        .collect()
}
