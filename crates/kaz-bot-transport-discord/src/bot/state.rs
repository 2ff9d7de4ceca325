use std::sync::atomic::{AtomicBool, Ordering};

/// Whether the bot only answers messages that mention it.
///
/// Shared by every handler task; flipped by the toggle command.
#[derive(Debug, Default)]
pub struct MentionMode {
    required: AtomicBool,
}

impl MentionMode {
    /// Start in the given mode
    #[must_use]
    pub const fn new(required: bool) -> Self {
        Self {
            required: AtomicBool::new(required),
        }
    }

    /// Current mode
    #[must_use]
    pub fn is_required(&self) -> bool {
        self.required.load(Ordering::SeqCst)
    }

    /// Flip the mode and return the new value
    pub fn toggle(&self) -> bool {
        !self.required.fetch_xor(true, Ordering::SeqCst)
    }
}
