use super::messaging::send_long_message;
use super::state::MentionMode;
use super::transport::{ChannelHistory, ChannelMessenger};
use crate::config::DiscordSettings;
use crate::discord::DiscordMessage;
use anyhow::{Context, Result};
use kaz_bot_core::completion::CompletionInvoker;
use kaz_bot_core::conversation::{assemble, BotIdentity, RawHistoryEntry};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Discord shows the typing indicator for about ten seconds per trigger
const TYPING_REFRESH: Duration = Duration::from_secs(8);

/// What the handler did with a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Authored by the bot itself
    IgnoredOwn,
    /// Toggle command; carries the new mention-required value
    Toggled(bool),
    /// Mention required but the bot was not mentioned
    NotAddressed,
    /// A reply was posted in this many parts
    Replied(usize),
}

/// Status line posted after the toggle command
#[must_use]
pub fn toggle_status_message(mention_required: bool) -> String {
    let status = if mention_required { "必須" } else { "不要" };
    format!("ボットの返信にメンションが**{status}**になりました。")
}

/// Turns incoming channel messages into replies.
pub struct ChatHandler {
    history: Arc<dyn ChannelHistory>,
    messenger: Arc<dyn ChannelMessenger>,
    invoker: Arc<CompletionInvoker>,
    mention_mode: Arc<MentionMode>,
    settings: Arc<DiscordSettings>,
    system_context: String,
}

impl ChatHandler {
    /// Create a handler. Mention mode starts from `settings.mention_required`.
    #[must_use]
    pub fn new(
        history: Arc<dyn ChannelHistory>,
        messenger: Arc<dyn ChannelMessenger>,
        invoker: Arc<CompletionInvoker>,
        settings: Arc<DiscordSettings>,
        system_context: impl Into<String>,
    ) -> Self {
        let mention_mode = Arc::new(MentionMode::new(settings.mention_required));
        Self {
            history,
            messenger,
            invoker,
            mention_mode,
            settings,
            system_context: system_context.into(),
        }
    }

    /// Mention mode shared by all handler tasks
    #[must_use]
    pub fn mention_mode(&self) -> &MentionMode {
        &self.mention_mode
    }

    /// Handle one `MESSAGE_CREATE` event.
    ///
    /// # Errors
    ///
    /// Returns an error if posting the status message or the reply fails.
    /// Completion failures never surface here; they turn into the fallback
    /// reply.
    #[instrument(skip(self, bot, msg), fields(channel_id = %msg.channel_id, message_id = %msg.id))]
    pub async fn handle_message(&self, bot: &BotIdentity, msg: DiscordMessage) -> Result<Outcome> {
        if bot.is_self(&msg.author.id) {
            return Ok(Outcome::IgnoredOwn);
        }

        if msg.content == self.settings.toggle_command {
            return self.handle_toggle(&msg).await;
        }

        if self.mention_mode.is_required() && !msg.mentions_user(bot.id()) {
            debug!("Mention required, ignoring message");
            return Ok(Outcome::NotAddressed);
        }

        let prompt = bot.mention().strip(&msg.content);
        info!(
            author_id = %msg.author.id,
            prompt_len = prompt.chars().count(),
            "Generating reply"
        );

        let typing = CancellationToken::new();
        self.spawn_typing(&msg.channel_id, typing.clone());
        let _typing_guard = typing.drop_guard();

        let history = self.fetch_history(&msg).await;
        let turns = assemble(&history, &prompt, bot, &self.system_context);
        let reply = self.invoker.invoke(&turns).await;

        let reply = if reply.trim().is_empty() {
            warn!("Empty completion, sending fallback");
            self.invoker.options().fallback_reply.clone()
        } else {
            reply
        };

        let parts = send_long_message(self.messenger.as_ref(), &msg.channel_id, &reply)
            .await
            .context("failed to send reply")?;
        Ok(Outcome::Replied(parts))
    }

    async fn handle_toggle(&self, msg: &DiscordMessage) -> Result<Outcome> {
        let required = self.mention_mode.toggle();
        info!(required, author_id = %msg.author.id, "Mention mode toggled");

        self.messenger
            .send_message(&msg.channel_id, &toggle_status_message(required))
            .await
            .context("failed to send toggle status")?;
        Ok(Outcome::Toggled(required))
    }

    async fn fetch_history(&self, msg: &DiscordMessage) -> Vec<RawHistoryEntry> {
        match self
            .history
            .recent_messages(&msg.channel_id, &msg.id, self.settings.history_limit())
            .await
        {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Failed to fetch channel history, continuing without it");
                Vec::new()
            }
        }
    }

    fn spawn_typing(&self, channel_id: &str, cancel: CancellationToken) {
        let messenger = Arc::clone(&self.messenger);
        let channel_id = channel_id.to_string();

        tokio::spawn(async move {
            loop {
                if let Err(e) = messenger.trigger_typing(&channel_id).await {
                    debug!(error = %e, "Typing indicator failed");
                }
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(TYPING_REFRESH) => {}
                }
            }
        });
    }
}
