use kaz_bot_core::conversation::RawHistoryEntry;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A Discord user (or bot account)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscordUser {
    /// Snowflake id
    pub id: String,
    /// Account name
    #[serde(default)]
    pub username: String,
    /// Whether the account is a bot
    #[serde(default)]
    pub bot: bool,
}

/// A channel message as delivered by REST and `MESSAGE_CREATE`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscordMessage {
    /// Snowflake id
    pub id: String,
    /// Channel the message was posted in
    pub channel_id: String,
    /// Author of the message
    pub author: DiscordUser,
    /// Text content; empty without the message content intent
    #[serde(default)]
    pub content: String,
    /// Users mentioned in the message
    #[serde(default)]
    pub mentions: Vec<DiscordUser>,
    /// Whether the message pings `@everyone`
    #[serde(default)]
    pub mention_everyone: bool,
}

impl DiscordMessage {
    /// Returns true if the message addresses `user_id`, directly or through
    /// `@everyone`.
    #[must_use]
    pub fn mentions_user(&self, user_id: &str) -> bool {
        self.mention_everyone || self.mentions.iter().any(|u| u.id == user_id)
    }
}

impl From<DiscordMessage> for RawHistoryEntry {
    fn from(msg: DiscordMessage) -> Self {
        Self::new(msg.author.id, msg.content)
    }
}

/// Envelope of every gateway frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayPayload {
    /// Opcode
    pub op: u8,
    /// Event data
    #[serde(default)]
    pub d: Value,
    /// Sequence number, dispatch frames only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,
    /// Event name, dispatch frames only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
}

/// `d` of the Hello frame
#[derive(Debug, Deserialize)]
pub struct Hello {
    /// Heartbeat period in milliseconds
    pub heartbeat_interval: u64,
}

/// `d` of the `READY` dispatch
#[derive(Debug, Deserialize)]
pub struct Ready {
    /// The bot's own account
    pub user: DiscordUser,
}
