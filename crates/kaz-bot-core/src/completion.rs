//! Completion calls with credential rotation.
//!
//! [`CompletionInvoker::invoke`] always produces text: either the provider's
//! reply or the configured fallback. A failed call advances the shared
//! [`CredentialPool`] cursor so the *next* call uses another key; the failed
//! turn itself is never retried.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::config::CoreSettings;
use crate::conversation::ConversationTurn;
use crate::llm::{LlmError, LlmProvider, ProviderFactory};

/// A provider API key. `Debug` output never contains the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wrap a raw key
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The raw key, for client construction only
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

/// Keys this short or shorter are masked completely
const MASK_SUFFIX_MIN_LEN: usize = 8;
const MASK_SUFFIX_LEN: usize = 4;

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let len = self.0.chars().count();
        if len <= MASK_SUFFIX_MIN_LEN {
            return f.write_str("Credential(***)");
        }
        let tail: String = self.0.chars().skip(len - MASK_SUFFIX_LEN).collect();
        write!(f, "Credential(***{tail})")
    }
}

/// Ordered, non-empty set of credentials with a shared rotating cursor.
///
/// The cursor is always a valid index. Rotation is the only mutation and is
/// visible to every holder of the pool.
#[derive(Debug)]
pub struct CredentialPool {
    credentials: Vec<Credential>,
    cursor: AtomicUsize,
}

impl CredentialPool {
    /// Create a pool starting at the first credential
    ///
    /// # Errors
    ///
    /// Returns `LlmError::MissingConfig` if `keys` is empty.
    pub fn new<I, S>(keys: I) -> Result<Self, LlmError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let credentials: Vec<Credential> = keys.into_iter().map(Credential::new).collect();
        if credentials.is_empty() {
            return Err(LlmError::MissingConfig(
                "credential pool needs at least one API key".to_string(),
            ));
        }
        Ok(Self {
            credentials,
            cursor: AtomicUsize::new(0),
        })
    }

    /// Number of credentials in the pool
    #[must_use]
    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    /// Always false: a pool cannot be built empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    /// Index of the credential the next call will use
    #[must_use]
    pub fn current_index(&self) -> usize {
        self.cursor.load(Ordering::SeqCst)
    }

    /// Credential at `index`, wrapped modulo the pool size
    #[must_use]
    pub fn get(&self, index: usize) -> &Credential {
        &self.credentials[index % self.credentials.len()]
    }

    /// Advances the cursor past `failed_index` and returns the new position.
    ///
    /// Only moves if the cursor still points at `failed_index`, so concurrent
    /// failures of the same credential rotate once. A single-credential pool
    /// never moves.
    pub fn rotate_from(&self, failed_index: usize) -> usize {
        let len = self.credentials.len();
        if len <= 1 {
            return self.current_index();
        }
        let next = (failed_index + 1) % len;
        match self
            .cursor
            .compare_exchange(failed_index, next, Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(_) => next,
            Err(actual) => actual,
        }
    }
}

/// Fixed parameters of every completion call
#[derive(Debug, Clone)]
pub struct InvokerOptions {
    /// Model identifier sent to the provider
    pub model_id: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Upper bound for one provider call
    pub timeout: Duration,
    /// Text returned whenever the call fails
    pub fallback_reply: String,
}

impl InvokerOptions {
    /// Options taken from loaded settings
    #[must_use]
    pub fn from_settings(settings: &CoreSettings) -> Self {
        Self {
            model_id: settings.llm_model.clone(),
            temperature: settings.llm_temperature,
            timeout: Duration::from_secs(settings.llm_timeout_secs),
            fallback_reply: settings.fallback_reply.clone(),
        }
    }
}

impl Default for InvokerOptions {
    fn default() -> Self {
        Self::from_settings(&CoreSettings::default())
    }
}

struct CachedClient {
    index: usize,
    provider: Arc<dyn LlmProvider>,
}

/// Issues completion calls, rotating credentials on failure.
pub struct CompletionInvoker {
    pool: Arc<CredentialPool>,
    factory: Arc<dyn ProviderFactory>,
    options: InvokerOptions,
    client: RwLock<Option<CachedClient>>,
}

impl CompletionInvoker {
    /// Create an invoker over a shared credential pool
    #[must_use]
    pub fn new(
        pool: Arc<CredentialPool>,
        factory: Arc<dyn ProviderFactory>,
        options: InvokerOptions,
    ) -> Self {
        Self {
            pool,
            factory,
            options,
            client: RwLock::new(None),
        }
    }

    /// The credential pool this invoker rotates
    #[must_use]
    pub fn pool(&self) -> &Arc<CredentialPool> {
        &self.pool
    }

    /// Fixed call parameters
    #[must_use]
    pub const fn options(&self) -> &InvokerOptions {
        &self.options
    }

    /// Obtain a reply for `turns`.
    ///
    /// Returns the provider's text trimmed of surrounding whitespace, or the
    /// fallback reply if client construction or the call failed. On failure
    /// the pool rotates for future calls; this call is not retried.
    #[instrument(skip(self, turns), fields(turns = turns.len()))]
    pub async fn invoke(&self, turns: &[ConversationTurn]) -> String {
        let index = self.pool.current_index();
        let start = std::time::Instant::now();

        match self.try_invoke(index, turns).await {
            Ok(text) => {
                debug!(
                    slot = index,
                    duration_ms = start.elapsed().as_millis(),
                    "Received success response from LLM"
                );
                text.trim().to_string()
            }
            Err(e) => {
                warn!(
                    slot = index,
                    duration_ms = start.elapsed().as_millis(),
                    error = %e,
                    "LLM request failed, replying with fallback"
                );
                self.rotate_after_failure(index).await;
                self.options.fallback_reply.clone()
            }
        }
    }

    async fn try_invoke(
        &self,
        index: usize,
        turns: &[ConversationTurn],
    ) -> Result<String, LlmError> {
        let provider = self.client_for(index).await?;
        let timeout = self.options.timeout;

        tokio::time::timeout(
            timeout,
            provider.chat_completion(turns, &self.options.model_id, self.options.temperature),
        )
        .await
        .map_err(|_| LlmError::Timeout(timeout.as_secs()))?
    }

    async fn client_for(&self, index: usize) -> Result<Arc<dyn LlmProvider>, LlmError> {
        if let Some(cached) = self.client.read().await.as_ref() {
            if cached.index == index {
                return Ok(Arc::clone(&cached.provider));
            }
        }

        let provider = self.factory.build(self.pool.get(index).expose())?;
        *self.client.write().await = Some(CachedClient {
            index,
            provider: Arc::clone(&provider),
        });
        Ok(provider)
    }

    async fn rotate_after_failure(&self, failed_index: usize) {
        if self.pool.len() <= 1 {
            debug!("Single API key configured, not rotating");
            return;
        }

        let next = self.pool.rotate_from(failed_index);
        info!(from = failed_index, to = next, "Switching API key");

        let rebuilt = match self.factory.build(self.pool.get(next).expose()) {
            Ok(provider) => Some(CachedClient {
                index: next,
                provider,
            }),
            Err(e) => {
                warn!(slot = next, error = %e, "Failed to rebuild LLM client");
                None
            }
        };
        *self.client.write().await = rebuilt;
    }
}
