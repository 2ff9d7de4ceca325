//! Reply splitting for Discord's message length limit.

use super::transport::ChannelMessenger;
use crate::discord::DiscordError;
use unicode_segmentation::UnicodeSegmentation;

/// Discord rejects messages over 2000 characters. The margin leaves room for
/// the code fences re-opened across parts.
pub const DISCORD_MESSAGE_LIMIT: usize = 1990;

const CODE_FENCE: &str = "```";

/// Splits `message` into parts of at most `max_chars` characters.
///
/// Parts break on line boundaries. A ``` block cut by a boundary is closed at
/// the end of one part and reopened at the start of the next. Lines longer
/// than the limit are cut between grapheme clusters.
///
/// # Examples
///
/// ```
/// use kaz_bot_transport_discord::bot::messaging::split_long_message;
///
/// let parts = split_long_message(&"line\n".repeat(1000), 1990);
/// assert!(parts.len() > 1);
/// assert!(parts.iter().all(|p| p.chars().count() <= 1990));
/// ```
#[must_use]
pub fn split_long_message(message: &str, max_chars: usize) -> Vec<String> {
    if message.is_empty() {
        return Vec::new();
    }
    if message.chars().count() <= max_chars {
        return vec![message.to_string()];
    }

    let mut splitter = Splitter::new(max_chars);
    for line in message.lines() {
        splitter.push_line(line);
    }
    splitter.finish()
}

struct Splitter {
    max_chars: usize,
    parts: Vec<String>,
    current: String,
    current_chars: usize,
    // chars of the fence reopened at the start of `current`
    prefix_chars: usize,
    in_code_block: bool,
}

impl Splitter {
    const fn new(max_chars: usize) -> Self {
        Self {
            max_chars,
            parts: Vec::new(),
            current: String::new(),
            current_chars: 0,
            prefix_chars: 0,
            in_code_block: false,
        }
    }

    /// Room for `current`, keeping space for a closing fence when needed
    fn budget(&self) -> usize {
        if self.in_code_block {
            self.max_chars.saturating_sub(CODE_FENCE.len())
        } else {
            self.max_chars
        }
    }

    fn has_content(&self) -> bool {
        self.current_chars > self.prefix_chars
    }

    fn append(&mut self, text: &str) {
        self.current.push_str(text);
        self.current.push('\n');
        self.current_chars += text.chars().count() + 1;
    }

    fn reset(&mut self) {
        self.current.clear();
        self.current_chars = 0;
        self.prefix_chars = 0;
    }

    fn close_current(&mut self) {
        if self.in_code_block {
            if !self.current.ends_with('\n') {
                self.current.push('\n');
            }
            self.current.push_str(CODE_FENCE);
        }
        self.parts.push(self.current.trim_end().to_string());
        self.reset();
    }

    fn flush(&mut self) {
        if !self.has_content() {
            return;
        }
        self.close_current();
        if self.in_code_block {
            self.append(CODE_FENCE);
            self.prefix_chars = self.current_chars;
        }
    }

    fn push_line(&mut self, line: &str) {
        let is_fence = line.starts_with(CODE_FENCE);
        let opens_block = is_fence && !self.in_code_block;
        let mut needed = line.chars().count() + 1;
        if opens_block {
            needed += CODE_FENCE.len();
        }
        let reopen_chars = if self.in_code_block {
            CODE_FENCE.len() + 1
        } else {
            0
        };

        if reopen_chars + needed > self.budget() {
            self.push_oversized(line);
            return;
        }

        if self.current_chars + needed > self.budget() {
            self.flush();
            // a closing fence right after a split would leave an empty block
            if is_fence && self.in_code_block {
                self.reset();
                self.in_code_block = false;
                return;
            }
        }
        if is_fence {
            self.in_code_block = !self.in_code_block;
        }
        self.append(line);
    }

    fn push_oversized(&mut self, line: &str) {
        for grapheme in line.graphemes(true) {
            let grapheme_chars = grapheme.chars().count();
            // +1 keeps room for the newline ending the line
            if self.current_chars + grapheme_chars + 1 > self.budget() {
                self.flush();
            }
            self.current.push_str(grapheme);
            self.current_chars += grapheme_chars;
        }
        self.current.push('\n');
        self.current_chars += 1;
    }

    fn finish(mut self) -> Vec<String> {
        if self.has_content() {
            self.close_current();
        }
        self.parts
    }
}

/// Sends `text` as one or more messages, in order.
///
/// # Errors
///
/// Returns the first send error; later parts are not sent.
pub async fn send_long_message(
    messenger: &dyn ChannelMessenger,
    channel_id: &str,
    text: &str,
) -> Result<usize, DiscordError> {
    let parts = split_long_message(text, DISCORD_MESSAGE_LIMIT);
    for part in &parts {
        messenger.send_message(channel_id, part).await?;
    }
    Ok(parts.len())
}
