//! Conversation reconstruction from channel history.
//!
//! The chat platform's own message history is the bot's only memory. Each
//! incoming prompt is turned into an ordered list of role-tagged turns:
//! the system preamble, the recent channel messages oldest first, and the
//! live prompt last.

use serde::{Deserialize, Serialize};

/// Role of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Fixed preamble, always the first turn
    System,
    /// Input from a human participant
    User,
    /// Earlier output of the bot itself
    Assistant,
}

/// A single role-tagged unit of conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Who produced the content
    pub role: Role,
    /// Text content of the turn
    pub content: String,
}

impl ConversationTurn {
    /// Create a new system turn
    #[must_use]
    pub fn system(content: &str) -> Self {
        Self {
            role: Role::System,
            content: content.to_string(),
        }
    }

    /// Create a new user turn
    #[must_use]
    pub fn user(content: &str) -> Self {
        Self {
            role: Role::User,
            content: content.to_string(),
        }
    }

    /// Create a new assistant turn
    #[must_use]
    pub fn assistant(content: &str) -> Self {
        Self {
            role: Role::Assistant,
            content: content.to_string(),
        }
    }
}

/// One message of the channel history feed.
///
/// Recency is given by the entry's position in the feed, not stored here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawHistoryEntry {
    /// Author identity as reported by the platform
    pub author_id: String,
    /// Raw message text, mentions included
    pub content: String,
}

impl RawHistoryEntry {
    /// Create a new history entry
    #[must_use]
    pub fn new(author_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            author_id: author_id.into(),
            content: content.into(),
        }
    }
}

/// Substrings the platform renders when a message addresses the bot.
///
/// Discord emits `<@ID>` and, for nickname mentions, `<@!ID>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MentionToken {
    plain: String,
    nickname: String,
}

impl MentionToken {
    /// Tokens addressing the user `id`
    #[must_use]
    pub fn for_id(id: &str) -> Self {
        Self {
            plain: format!("<@{id}>"),
            nickname: format!("<@!{id}>"),
        }
    }

    /// Removes every mention of the bot and trims surrounding whitespace.
    #[must_use]
    pub fn strip(&self, text: &str) -> String {
        text.replace(&self.nickname, "")
            .replace(&self.plain, "")
            .trim()
            .to_string()
    }

    /// Returns true if `text` contains either mention variant
    #[must_use]
    pub fn is_mentioned_in(&self, text: &str) -> bool {
        text.contains(&self.plain) || text.contains(&self.nickname)
    }
}

/// Stable identity of the bot account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotIdentity {
    id: String,
    mention: MentionToken,
}

impl BotIdentity {
    /// Identity for the platform user id `id`
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        let mention = MentionToken::for_id(&id);
        Self { id, mention }
    }

    /// Platform user id
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Mention tokens addressing this identity
    #[must_use]
    pub const fn mention(&self) -> &MentionToken {
        &self.mention
    }

    /// Returns true if `author_id` is this bot
    #[must_use]
    pub fn is_self(&self, author_id: &str) -> bool {
        self.id == author_id
    }
}

/// Builds the turn list for one completion call.
///
/// `raw_history` arrives most-recent-first, as the platform's history feed
/// returns it. `current_prompt` is expected to be mention-stripped by the
/// caller and is appended as-is, even when empty. History entries written by
/// the bot become assistant turns verbatim; all other entries are
/// mention-stripped and dropped when nothing is left. No truncation happens
/// here: the output length is bounded by the caller's history limit.
///
/// # Examples
///
/// ```
/// use kaz_bot_core::conversation::{assemble, BotIdentity, ConversationTurn};
///
/// let bot = BotIdentity::new("42");
/// let turns = assemble(&[], "hello", &bot, "ctx");
/// assert_eq!(
///     turns,
///     vec![ConversationTurn::system("ctx"), ConversationTurn::user("hello")]
/// );
/// ```
#[must_use]
pub fn assemble(
    raw_history: &[RawHistoryEntry],
    current_prompt: &str,
    bot: &BotIdentity,
    system_context: &str,
) -> Vec<ConversationTurn> {
    let mut turns = Vec::with_capacity(raw_history.len() + 2);
    turns.push(ConversationTurn::system(system_context));

    for entry in raw_history.iter().rev() {
        if bot.is_self(&entry.author_id) {
            turns.push(ConversationTurn::assistant(&entry.content));
            continue;
        }

        let cleaned = bot.mention().strip(&entry.content);
        if !cleaned.is_empty() {
            turns.push(ConversationTurn::user(&cleaned));
        }
    }

    turns.push(ConversationTurn::user(current_prompt));
    turns
}
