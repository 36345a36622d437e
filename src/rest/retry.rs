//! Rate-limit retry configuration and transport decorator.
//!
//! [`RetryingTransport`] wraps any [`RestTransport`] and retries requests
//! rejected with [`HuginnError::RateLimited`]. A rate-limited request was not
//! processed by the server, so retrying is safe for every verb. Other errors
//! are returned immediately; the core never retries them.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use super::{RestRequest, RestTransport};
use crate::telemetry;
use crate::{HuginnError, Result};

/// Configuration for rate-limit backoff.
///
/// Uses exponential backoff; a server `Retry-After` hint takes precedence:
///
/// ```rust
/// # use huginn::RetryConfig;
/// # use std::time::Duration;
/// let config = RetryConfig::new()
///     .max_attempts(5)
///     .initial_delay(Duration::from_millis(200));
/// ```
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the initial request).
    /// 1 = no retry. Default: 3.
    pub max_attempts: u32,
    /// Base delay before the first retry. Default: 500ms.
    pub initial_delay: Duration,
    /// Maximum delay between retries (caps exponential growth). Default: 30s.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config that disables retries (single attempt).
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Set maximum attempts (including the initial request).
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    /// Set the base delay before the first retry.
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the maximum delay between retries.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    ///
    /// `initial_delay * 2^attempt`, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self
            .initial_delay
            .saturating_mul(2u32.saturating_pow(attempt));
        delay.min(self.max_delay)
    }

    /// Calculate the effective delay, respecting server `retry_after` hints.
    pub fn effective_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        retry_after.unwrap_or_else(|| self.delay_for_attempt(attempt))
    }
}

/// Execute an async operation, retrying rate-limit rejections.
///
/// Up to `config.max_attempts` attempts; any other error is returned as-is.
pub(crate) async fn with_retry<F, Fut, T>(config: &RetryConfig, label: &str, f: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = config.max_attempts.max(1);
    let mut last_err = None;
    for attempt in 0..attempts {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_rate_limited() => {
                if attempt + 1 < attempts {
                    metrics::counter!(telemetry::RETRIES_TOTAL, "method" => label.to_owned())
                        .increment(1);
                    let delay = config.effective_delay(attempt, e.retry_after());
                    warn!(
                        request = label,
                        attempt = attempt + 1,
                        max_attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        "rate limited, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err.unwrap_or(HuginnError::RateLimited { retry_after: None }))
}

/// Decorator that wraps a [`RestTransport`] with rate-limit backoff.
pub struct RetryingTransport {
    inner: Arc<dyn RestTransport>,
    config: RetryConfig,
}

impl RetryingTransport {
    /// Wrap a transport with retry logic.
    pub fn new(inner: Arc<dyn RestTransport>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl RestTransport for RetryingTransport {
    async fn request(&self, request: RestRequest) -> Result<Option<Value>> {
        let label = request.method.as_str();
        with_retry(&self.config, label, || self.inner.request(request.clone())).await
    }
}
