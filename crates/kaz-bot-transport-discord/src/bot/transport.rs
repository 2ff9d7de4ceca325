//! Seams between the handler and Discord.
//!
//! The handler only sees these traits; [`DiscordHttp`] implements them over
//! REST with retries, tests implement them in memory.

use super::resilient::{retry_discord_operation, retry_discord_send};
use crate::discord::{DiscordError, DiscordHttp};
use async_trait::async_trait;
use kaz_bot_core::conversation::RawHistoryEntry;

/// Source of recent channel messages
#[async_trait]
pub trait ChannelHistory: Send + Sync {
    /// Up to `limit` messages posted before `before`, newest first.
    async fn recent_messages(
        &self,
        channel_id: &str,
        before: &str,
        limit: u8,
    ) -> Result<Vec<RawHistoryEntry>, DiscordError>;
}

/// Outbound side of a channel
#[async_trait]
pub trait ChannelMessenger: Send + Sync {
    /// Post one message. `content` must already fit the length limit.
    async fn send_message(&self, channel_id: &str, content: &str) -> Result<(), DiscordError>;

    /// Show the typing indicator
    async fn trigger_typing(&self, channel_id: &str) -> Result<(), DiscordError>;
}

#[async_trait]
impl ChannelHistory for DiscordHttp {
    async fn recent_messages(
        &self,
        channel_id: &str,
        before: &str,
        limit: u8,
    ) -> Result<Vec<RawHistoryEntry>, DiscordError> {
        let messages =
            retry_discord_operation(|| self.channel_messages(channel_id, Some(before), limit))
                .await?;
        Ok(messages.into_iter().map(RawHistoryEntry::from).collect())
    }
}

#[async_trait]
impl ChannelMessenger for DiscordHttp {
    async fn send_message(&self, channel_id: &str, content: &str) -> Result<(), DiscordError> {
        retry_discord_send(|| self.create_message(channel_id, content)).await?;
        Ok(())
    }

    async fn trigger_typing(&self, channel_id: &str) -> Result<(), DiscordError> {
        // typing is cosmetic, one attempt is enough
        DiscordHttp::trigger_typing(self, channel_id).await
    }
}
