//! Discord transport settings.

use config::{Config, ConfigError};
use kaz_bot_core::config::CoreSettings;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Messages fetched from the channel history per reply
pub const DEFAULT_HISTORY_LIMIT: u8 = 8;
/// Upper bound accepted by Discord's message history endpoint
pub const MAX_HISTORY_LIMIT: u8 = 100;
/// Command that flips the mention-required mode
pub const DEFAULT_TOGGLE_COMMAND: &str = "!kaz_toggle_mention";

/// Discord transport settings loaded from environment variables.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DiscordSettings {
    /// Discord bot token.
    #[serde(default)]
    pub discord_token: String,
    /// Only answer messages that mention the bot.
    #[serde(default)]
    pub mention_required: bool,
    /// How many preceding channel messages form the conversation.
    /// Out-of-range values are clamped by [`DiscordSettings::history_limit`].
    #[serde(default = "default_history_limit")]
    pub history_limit: u32,
    /// Exact message content that toggles mention mode.
    #[serde(default = "default_toggle_command")]
    pub toggle_command: String,
}

fn default_history_limit() -> u32 {
    u32::from(DEFAULT_HISTORY_LIMIT)
}

fn default_toggle_command() -> String {
    DEFAULT_TOGGLE_COMMAND.to_string()
}

impl Default for DiscordSettings {
    fn default() -> Self {
        Self {
            discord_token: String::new(),
            mention_required: false,
            history_limit: default_history_limit(),
            toggle_command: default_toggle_command(),
        }
    }
}

impl DiscordSettings {
    /// Create new settings by loading from environment and files.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails or the token is missing.
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_config(kaz_bot_core::config::build_config()?)
    }

    /// Deserialize and validate settings from an already built `Config`.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if deserialization fails or the token is missing.
    pub fn from_config(config: Config) -> Result<Self, ConfigError> {
        let settings: Self = config.try_deserialize()?;
        if settings.discord_token.trim().is_empty() {
            return Err(ConfigError::Message("DISCORD_TOKEN is not set".to_string()));
        }
        Ok(settings)
    }

    /// History limit clamped to what the history endpoint accepts.
    #[must_use]
    pub fn history_limit(&self) -> u8 {
        let clamped = self.history_limit.clamp(1, u32::from(MAX_HISTORY_LIMIT));
        u8::try_from(clamped).unwrap_or(MAX_HISTORY_LIMIT)
    }
}

/// Combined settings used by the Discord transport layer.
#[derive(Clone)]
pub struct BotSettings {
    /// Core settings shared across handlers.
    pub core: Arc<CoreSettings>,
    /// Discord-specific settings.
    pub discord: Arc<DiscordSettings>,
}

impl BotSettings {
    /// Create a new combined settings bundle.
    #[must_use]
    pub fn new(core: CoreSettings, discord: DiscordSettings) -> Self {
        Self {
            core: Arc::new(core),
            discord: Arc::new(discord),
        }
    }
}
