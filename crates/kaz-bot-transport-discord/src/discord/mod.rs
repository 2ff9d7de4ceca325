//! Discord REST and gateway clients
//!
//! Only the pieces the bot needs: reading recent channel messages, posting a
//! message, the typing indicator and the `READY` / `MESSAGE_CREATE` events.

/// REST client (history, send, typing)
pub mod api;
/// Gateway websocket client
pub mod gateway;
/// Wire types shared by REST and gateway
pub mod model;

use std::time::Duration;
use thiserror::Error;

pub use api::DiscordHttp;
pub use gateway::{Gateway, GatewayEvent};
pub use model::{DiscordMessage, DiscordUser};

/// Errors that can occur while talking to Discord
#[derive(Debug, Error)]
pub enum DiscordError {
    /// Error during network communication
    #[error("Network error: {0}")]
    Http(#[from] reqwest::Error),
    /// Non-success status returned by the REST API
    #[error("Discord API error: {status} {body}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body, truncated
        body: String,
    },
    /// 429 with the wait Discord asked for
    #[error("Discord rate limit, retry after {}ms", .retry_after.as_millis())]
    RateLimited {
        /// Delay from the `retry_after` field or header
        retry_after: Duration,
    },
    /// Gateway protocol or websocket failure
    #[error("Gateway error: {0}")]
    Gateway(String),
    /// Error during JSON serialization or deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DiscordError {
    /// Returns true for failures worth retrying on idempotent calls: network
    /// errors, rate limits and server errors.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::RateLimited { .. } => true,
            Self::Gateway(_) | Self::Json(_) => false,
        }
    }

    /// Returns true if the request cannot have been applied, so a
    /// non-idempotent call may be repeated.
    ///
    /// Timeouts and broken connections are excluded: Discord may have created
    /// the message before the answer was lost. A 500 is excluded for the same
    /// reason; 502/503/504 come from the proxy in front of the API.
    #[must_use]
    pub fn is_safe_to_resend(&self) -> bool {
        match self {
            Self::Http(e) => e.is_connect() && !e.is_timeout(),
            Self::Api { status, .. } => matches!(*status, 429 | 502 | 503 | 504),
            Self::RateLimited { .. } => true,
            Self::Gateway(_) | Self::Json(_) => false,
        }
    }

    /// Wait requested by Discord before the next attempt, if any
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}
