/// Incoming message handling (toggle command, mention mode, replies)
pub mod handlers;
/// Reply splitting and multi-part sending
pub mod messaging;
/// Retry wrapper for Discord REST calls
pub mod resilient;
/// Runtime state shared across handler tasks
pub mod state;
/// Channel history and messaging seams
pub mod transport;

pub use handlers::{ChatHandler, Outcome};
pub use state::MentionMode;
pub use transport::{ChannelHistory, ChannelMessenger};
