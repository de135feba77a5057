//! Retry utilities for provider calls with exponential backoff.
//!
//! Retried:
//! - Timeouts and connection failures
//! - 5xx server errors, 408 and 429
//!
//! Not retried:
//! - Other 4xx client errors
//! - Parse failures and "city not found"

use std::future::Future;
use std::time::Duration;

use reqwest::StatusCode;

use crate::types::WeatherError;

/// Default retry configuration
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 250;
pub const DEFAULT_MAX_DELAY_MS: u64 = 5000;

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the first retry (doubles each attempt)
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
        }
    }
}

impl RetryConfig {
    pub fn new(max_attempts: u32, initial_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay: Duration::from_millis(initial_delay_ms),
            max_delay: Duration::from_millis(max_delay_ms),
        }
    }

    /// Delay before retry number `retry` (0-based): initial * 2^retry, capped.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let factor = 2u64.saturating_pow(retry);
        let delay_ms = (self.initial_delay.as_millis() as u64).saturating_mul(factor);
        let capped = delay_ms.min(self.max_delay.as_millis() as u64);
        Duration::from_millis(capped)
    }
}

/// Error classification for retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry,
    NoRetry,
}

/// Check if a status code is worth retrying
pub fn is_retryable_status(status: StatusCode) -> RetryDecision {
    if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
    {
        return RetryDecision::Retry;
    }
    RetryDecision::NoRetry
}

/// Map a non-success status to the error taxonomy.
pub fn status_error(status: StatusCode, message: impl Into<String>) -> WeatherError {
    let message = message.into();
    match is_retryable_status(status) {
        RetryDecision::Retry => WeatherError::Transient(format!("{} - {}", status, message)),
        RetryDecision::NoRetry => WeatherError::Provider {
            status: status.as_u16(),
            message,
        },
    }
}

impl From<reqwest::Error> for WeatherError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() || error.is_connect() {
            return WeatherError::Transient(error.to_string());
        }
        if let Some(status) = error.status() {
            return status_error(status, error.to_string());
        }
        if error.is_decode() {
            return WeatherError::Parse(error.to_string());
        }
        if error.is_request() || error.is_builder() {
            return WeatherError::Provider {
                status: 0,
                message: error.to_string(),
            };
        }
        // Body/stream interruptions and anything unclassified
        WeatherError::Transient(error.to_string())
    }
}

/// Run `operation` until it succeeds, fails permanently, or attempts run out.
///
/// `label` only feeds the log lines.
pub async fn with_retry<T, F, Fut>(
    config: &RetryConfig,
    label: &str,
    mut operation: F,
) -> Result<T, WeatherError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, WeatherError>>,
{
    let attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::info!("{} succeeded after {} retries", label, attempt);
                }
                return Ok(value);
            }
            Err(e) if !e.is_retryable() => {
                tracing::debug!("{} failed permanently: {}", label, e);
                return Err(e);
            }
            Err(e) => {
                attempt += 1;
                if attempt >= attempts {
                    tracing::error!("{}: all {} attempts exhausted: {}", label, attempts, e);
                    return Err(e);
                }

                let delay = config.delay_for_retry(attempt - 1);
                tracing::warn!(
                    "{}: attempt {} of {} failed ({}), retrying in {:?}",
                    label,
                    attempt,
                    attempts,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
