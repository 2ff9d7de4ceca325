//! Retry wrapper for Discord REST operations.
//!
//! Idempotent reads are retried on any transient failure. Message creation is
//! retried only when Discord cannot have applied the request, so a slow
//! answer never turns into a duplicate reply. Rate limits wait for the
//! `retry_after` Discord sends before the next attempt.

use crate::discord::DiscordError;
use std::future::Future;
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tracing::{debug, warn};

/// Initial backoff between attempts
pub const DISCORD_API_INITIAL_BACKOFF_MS: u64 = 500;
/// Longest backoff between attempts
pub const DISCORD_API_MAX_BACKOFF_MS: u64 = 4000;
/// Retries after the first attempt
pub const DISCORD_API_MAX_RETRIES: usize = 3;
/// Longest rate-limit wait honored before giving up on the wait
pub const DISCORD_API_MAX_RATE_LIMIT_WAIT_SECS: u64 = 30;

/// Run an idempotent `operation`, retrying while it fails with a transient
/// error.
///
/// # Errors
///
/// Returns the last error once retries are exhausted, or the first
/// non-transient error.
pub async fn retry_discord_operation<F, Fut, T>(operation: F) -> Result<T, DiscordError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DiscordError>>,
{
    retry_while(operation, DiscordError::is_transient).await
}

/// Run a non-idempotent `operation` such as posting a message.
///
/// Retries only errors for which [`DiscordError::is_safe_to_resend`] holds.
///
/// # Errors
///
/// Returns the first error that is not safe to resend, or the last error once
/// retries are exhausted.
pub async fn retry_discord_send<F, Fut, T>(operation: F) -> Result<T, DiscordError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DiscordError>>,
{
    retry_while(operation, DiscordError::is_safe_to_resend).await
}

async fn retry_while<F, Fut, T, C>(mut operation: F, condition: C) -> Result<T, DiscordError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DiscordError>>,
    C: FnMut(&DiscordError) -> bool,
{
    let retry_strategy = ExponentialBackoff::from_millis(DISCORD_API_INITIAL_BACKOFF_MS)
        .max_delay(Duration::from_millis(DISCORD_API_MAX_BACKOFF_MS))
        .map(jitter)
        .take(DISCORD_API_MAX_RETRIES);
    let max_wait = Duration::from_secs(DISCORD_API_MAX_RATE_LIMIT_WAIT_SECS);
    let mut attempt = 0;

    let action = || {
        attempt += 1;
        let retries_left = attempt <= DISCORD_API_MAX_RETRIES;
        let call = operation();
        async move {
            let result = call.await;
            let wait = result.as_ref().err().and_then(DiscordError::retry_after);
            if let Some(wait) = wait.filter(|_| retries_left) {
                debug!(wait_ms = wait.as_millis(), "Discord rate limited, waiting");
                tokio::time::sleep(wait.min(max_wait)).await;
            }
            result
        }
    };

    RetryIf::start(retry_strategy, action, condition)
        .await
        .map_err(|e| {
            warn!("Discord API operation failed: {e}");
            e
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_are_retried() {
        let calls = AtomicUsize::new(0);
        let result = retry_discord_operation(|| {
            let attempt = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 2 {
                    Err(DiscordError::Api {
                        status: 503,
                        body: String::new(),
                    })
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert!(matches!(result, Ok(2)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_errors_fail_fast() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), _> = retry_discord_operation(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(DiscordError::Api {
                    status: 403,
                    body: "Missing Access".to_string(),
                })
            }
        })
        .await;

        assert!(matches!(result, Err(DiscordError::Api { status: 403, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_retries() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), _> = retry_discord_operation(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(DiscordError::Api {
                    status: 429,
                    body: String::new(),
                })
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), DISCORD_API_MAX_RETRIES + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_is_not_repeated_after_server_error() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), _> = retry_discord_send(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(DiscordError::Api {
                    status: 500,
                    body: String::new(),
                })
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_is_repeated_when_proxy_rejects() {
        let calls = AtomicUsize::new(0);
        let result = retry_discord_send(|| {
            let attempt = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    Err(DiscordError::Api {
                        status: 502,
                        body: String::new(),
                    })
                } else {
                    Ok(())
                }
            }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_waits_for_retry_after() {
        let calls = AtomicUsize::new(0);
        let started = tokio::time::Instant::now();
        let result = retry_discord_send(|| {
            let attempt = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    Err(DiscordError::RateLimited {
                        retry_after: Duration::from_secs(5),
                    })
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert!(matches!(result, Ok(1)));
        assert!(started.elapsed() >= Duration::from_secs(5));
    }
}
