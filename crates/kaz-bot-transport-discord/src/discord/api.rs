//! Discord REST client.
//!
//! Covers the three calls the bot makes per reply: read the recent channel
//! history, show the typing indicator and post the answer.

use super::model::DiscordMessage;
use super::DiscordError;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, RETRY_AFTER, USER_AGENT};
use reqwest::{Client as HttpClient, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// Base URL of the Discord REST API, version 10
pub const DISCORD_API_BASE: &str = "https://discord.com/api/v10";
/// Timeout applied to every REST request
pub const DISCORD_HTTP_TIMEOUT_SECS: u64 = 15;
/// Longest error body kept in [`DiscordError::Api`]
const ERROR_BODY_LIMIT: usize = 300;
/// Upper bound for a `retry_after` value taken from a response
const MAX_RETRY_AFTER_SECS: f64 = 3600.0;

/// Authenticated Discord REST client. Cheap to clone.
#[derive(Clone)]
pub struct DiscordHttp {
    client: HttpClient,
    api_base: String,
}

impl DiscordHttp {
    /// Client for the public Discord API
    ///
    /// # Errors
    ///
    /// Returns `DiscordError::Gateway` if the token is not a valid header
    /// value, or `DiscordError::Http` if the HTTP client cannot be built.
    pub fn new(token: &str) -> Result<Self, DiscordError> {
        Self::with_api_base(token, DISCORD_API_BASE)
    }

    /// Client for a custom API base (tests, proxies)
    ///
    /// # Errors
    ///
    /// Same as [`DiscordHttp::new`].
    pub fn with_api_base(token: &str, api_base: &str) -> Result<Self, DiscordError> {
        Self::with_timeout(
            token,
            api_base,
            Duration::from_secs(DISCORD_HTTP_TIMEOUT_SECS),
        )
    }

    /// Client for a custom API base with its own per-request timeout
    ///
    /// # Errors
    ///
    /// Same as [`DiscordHttp::new`].
    pub fn with_timeout(
        token: &str,
        api_base: &str,
        timeout: Duration,
    ) -> Result<Self, DiscordError> {
        let mut auth = HeaderValue::from_str(&format!("Bot {}", token.trim()))
            .map_err(|_| DiscordError::Gateway("token is not a valid header value".to_string()))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!(
                "DiscordBot (kaz-bot, ",
                env!("CARGO_PKG_VERSION"),
                ")"
            )),
        );

        let client = HttpClient::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    /// Up to `limit` messages of a channel, newest first.
    ///
    /// With `before`, only messages older than that message id are returned.
    ///
    /// # Errors
    ///
    /// Returns `DiscordError` on network failure or a non-success status.
    pub async fn channel_messages(
        &self,
        channel_id: &str,
        before: Option<&str>,
        limit: u8,
    ) -> Result<Vec<DiscordMessage>, DiscordError> {
        let url = format!("{}/channels/{channel_id}/messages", self.api_base);
        let mut query = vec![("limit", limit.to_string())];
        if let Some(before) = before {
            query.push(("before", before.to_string()));
        }

        let response = self.client.get(&url).query(&query).send().await?;
        let messages: Vec<DiscordMessage> = check_status(response).await?.json().await?;
        debug!(channel_id, count = messages.len(), "Fetched channel history");
        Ok(messages)
    }

    /// Post `content` to a channel.
    ///
    /// # Errors
    ///
    /// Returns `DiscordError` on network failure or a non-success status.
    pub async fn create_message(
        &self,
        channel_id: &str,
        content: &str,
    ) -> Result<DiscordMessage, DiscordError> {
        let url = format!("{}/channels/{channel_id}/messages", self.api_base);
        let response = self
            .client
            .post(&url)
            .json(&json!({ "content": content }))
            .send()
            .await?;
        Ok(check_status(response).await?.json().await?)
    }

    /// Show the typing indicator in a channel for about ten seconds.
    ///
    /// # Errors
    ///
    /// Returns `DiscordError` on network failure or a non-success status.
    pub async fn trigger_typing(&self, channel_id: &str) -> Result<(), DiscordError> {
        let url = format!("{}/channels/{channel_id}/typing", self.api_base);
        let response = self.client.post(&url).body("").send().await?;
        check_status(response).await?;
        Ok(())
    }
}

async fn check_status(response: Response) -> Result<Response, DiscordError> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let header_retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<f64>().ok());
    let body = response.text().await.unwrap_or_default();

    if status == StatusCode::TOO_MANY_REQUESTS {
        if let Some(retry_after) = parse_retry_after(&body, header_retry_after) {
            return Err(DiscordError::RateLimited { retry_after });
        }
    }
    let status = status.as_u16();

    // Nginx/Cloudflare error pages carry no useful detail
    let trimmed = body.trim_start();
    let is_html = trimmed.starts_with("<!DOCTYPE")
        || trimmed.starts_with("<html")
        || trimmed.starts_with("<HTML");
    let body = if is_html {
        "(server returned HTML error page)".to_string()
    } else {
        body.chars().take(ERROR_BODY_LIMIT).collect()
    };

    Err(DiscordError::Api { status, body })
}

#[derive(Deserialize)]
struct RateLimitBody {
    retry_after: f64,
}

/// Seconds to wait, from the JSON body first and the header second
fn parse_retry_after(body: &str, header: Option<f64>) -> Option<Duration> {
    serde_json::from_str::<RateLimitBody>(body)
        .ok()
        .map(|b| b.retry_after)
        .or(header)
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(|secs| Duration::from_secs_f64(secs.min(MAX_RETRY_AFTER_SECS)))
}
