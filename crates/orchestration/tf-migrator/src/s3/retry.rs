//! Retry logic for S3 operations.
//!
//! Provides exponential backoff with jitter for transient S3 errors.

use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use rand::Rng;
use std::fmt;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries before giving up.
    pub max_retries: u32,
    /// Initial backoff duration in milliseconds.
    pub initial_backoff_ms: u64,
    /// Maximum backoff duration in milliseconds.
    pub max_backoff_ms: u64,
    /// Whether to add jitter to backoff times.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 10000,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Create a new retry configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of retries.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the initial backoff in milliseconds.
    pub fn with_initial_backoff_ms(mut self, initial_backoff_ms: u64) -> Self {
        self.initial_backoff_ms = initial_backoff_ms;
        self
    }

    /// Set the maximum backoff in milliseconds.
    pub fn with_max_backoff_ms(mut self, max_backoff_ms: u64) -> Self {
        self.max_backoff_ms = max_backoff_ms;
        self
    }

    /// Enable or disable jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Calculate the backoff duration for a given attempt.
    pub fn backoff_duration(&self, attempt: u32) -> Duration {
        let base_ms = self
            .initial_backoff_ms
            .saturating_mul(2u64.saturating_pow(attempt));
        let capped_ms = base_ms.min(self.max_backoff_ms);

        let final_ms = if self.jitter {
            let jitter_range = capped_ms / 4; // 25% jitter
            let jitter = rand::rng().random_range(0..=jitter_range);
            capped_ms.saturating_add(jitter)
        } else {
            capped_ms
        };

        Duration::from_millis(final_ms)
    }
}

/// A failed S3 call reduced to its error code and a printable message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFailure {
    /// Service error code (e.g. `SlowDown`, `InvalidObjectState`)
    pub code: Option<String>,
    /// Full error chain
    pub message: String,
}

impl RemoteFailure {
    pub fn new(code: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            code: code.map(str::to_string),
            message: message.into(),
        }
    }

    /// Capture an SDK error.
    pub fn from_sdk<E, R>(err: SdkError<E, R>) -> Self
    where
        E: ProvideErrorMetadata + std::error::Error + 'static,
        R: fmt::Debug,
    {
        Self {
            code: err.code().map(str::to_string),
            message: DisplayErrorContext(&err).to_string(),
        }
    }

    /// Whether the service reported `code`.
    pub fn has_code(&self, code: &str) -> bool {
        self.code.as_deref() == Some(code)
    }
}

impl fmt::Display for RemoteFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{code}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Error classification for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClassification {
    /// The error is transient and can be retried.
    Retryable,
    /// The error is permanent and should not be retried.
    NonRetryable,
}

/// Classify an S3 error for retry purposes.
///
/// Retryable errors:
/// - HTTP 5xx (server errors)
/// - SlowDown (throttling)
/// - TooManyRequests
/// - Network timeouts
///
/// Non-retryable errors:
/// - HTTP 4xx (client errors) except throttling
/// - AccessDenied, NoSuchKey, NoSuchBucket
/// - InvalidObjectState (object is archived)
/// - RestoreAlreadyInProgress
pub fn classify_error(error: &str) -> ErrorClassification {
    let error_lower = error.to_lowercase();

    if error_lower.contains("slowdown")
        || error_lower.contains("toomanyrequests")
        || error_lower.contains("throttl")
        || error_lower.contains("service unavailable")
        || error_lower.contains("500")
        || error_lower.contains("502")
        || error_lower.contains("503")
        || error_lower.contains("504")
        || error_lower.contains("timeout")
        || error_lower.contains("connection reset")
        || error_lower.contains("connection refused")
    {
        return ErrorClassification::Retryable;
    }

    if error_lower.contains("nosuchkey")
        || error_lower.contains("accessdenied")
        || error_lower.contains("invalidrequest")
        || error_lower.contains("nosuchbucket")
        || error_lower.contains("invalidobjectstate")
        || error_lower.contains("objectnotinactivetier")
        || error_lower.contains("restorealreadyinprogress")
        || error_lower.contains("403")
        || error_lower.contains("404")
        || error_lower.contains("400")
    {
        return ErrorClassification::NonRetryable;
    }

    // Unknown errors are retried
    ErrorClassification::Retryable
}

/// Execute an async operation with retry logic.
///
/// Returns the result of the operation, or the last error if all retries failed.
pub async fn with_retry<F, Fut, T, E>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let mut attempt = 0;
    loop {
        let e = match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => e,
        };

        if classify_error(&e.to_string()) == ErrorClassification::NonRetryable {
            warn!(
                operation = operation_name,
                attempt = attempt,
                error = %e,
                "Non-retryable error"
            );
            return Err(e);
        }

        if attempt >= config.max_retries {
            warn!(
                operation = operation_name,
                attempt = attempt,
                error = %e,
                "Retries exhausted"
            );
            return Err(e);
        }

        let backoff = config.backoff_duration(attempt);
        warn!(
            operation = operation_name,
            attempt = attempt,
            error = %e,
            backoff_ms = backoff.as_millis(),
            "Retryable error, backing off"
        );
        sleep(backoff).await;
        attempt += 1;
    }
}
