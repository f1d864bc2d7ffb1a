//! Per-chunk retry policy with exponential backoff.
//!
//! When a chunk fetch fails the error is classified into a [`FailureType`]:
//! transient failures retry with exponential backoff plus jitter, permanent
//! failures escalate immediately, and rate-limited responses honor the
//! server's `Retry-After` when one is present.

use std::time::Duration;

use rand::Rng;
use tracing::debug;

use super::error::TransferError;

/// Default base delay for the first retry.
const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);

/// Default delay cap.
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(16);

/// Backoff multiplier (doubles each attempt).
const BACKOFF_MULTIPLIER: f64 = 2.0;

/// Maximum jitter added to each delay.
const MAX_JITTER: Duration = Duration::from_millis(250);

/// Maximum honored Retry-After value; larger values are clamped.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(120);

/// Classification of a chunk fetch failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// May succeed on retry: timeouts, connection drops, 5xx, 408.
    Transient,
    /// Will not succeed on retry: 4xx (except 408/429), local IO, bad URL.
    Permanent,
    /// HTTP 429; retry after the server-indicated or backoff delay.
    RateLimited,
}

/// Decision on whether to retry a failed chunk attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the given delay.
    Retry {
        /// How long to wait before the next attempt.
        delay: Duration,
        /// The upcoming attempt number (1-indexed).
        attempt: u32,
    },
    /// Give up and escalate.
    GiveUp {
        /// Human-readable reason.
        reason: String,
    },
}

/// Retry policy governing one chunk's attempts.
#[derive(Debug, Clone)]
pub struct ChunkRetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl ChunkRetryPolicy {
    /// Creates a policy with the given attempt budget and default delays.
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }

    /// Returns the configured attempt budget.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Decides whether the attempt that just failed should be retried.
    ///
    /// `attempt` is the 1-indexed attempt that failed. Rate-limited failures
    /// prefer the server's `Retry-After` (clamped) over computed backoff.
    #[must_use]
    pub fn decide(&self, error: &TransferError, attempt: u32) -> RetryDecision {
        let failure = classify_failure(error);

        if failure == FailureType::Permanent {
            return RetryDecision::GiveUp {
                reason: "permanent failure".to_string(),
            };
        }

        if attempt >= self.max_attempts {
            return RetryDecision::GiveUp {
                reason: format!("retry budget ({}) exhausted", self.max_attempts),
            };
        }

        let delay = match (failure, retry_after_of(error)) {
            (FailureType::RateLimited, Some(server_delay)) => {
                debug!(delay_ms = server_delay.as_millis(), "honoring Retry-After");
                server_delay.min(MAX_RETRY_AFTER)
            }
            _ => self.backoff_delay(attempt),
        };

        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }

    /// `min(base * 2^(attempt-1), max) + jitter`.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = f64::from(attempt.saturating_sub(1));
        let raw_ms = self.base_delay.as_millis() as f64 * BACKOFF_MULTIPLIER.powf(exponent);
        let capped_ms = raw_ms.min(self.max_delay.as_millis() as f64);
        let jitter_ms = rand::thread_rng().gen_range(0..=MAX_JITTER.as_millis() as u64);
        Duration::from_millis(capped_ms as u64) + Duration::from_millis(jitter_ms)
    }
}

impl Default for ChunkRetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Classifies a transfer error for retry purposes.
///
/// | Error | Type |
/// |-------|------|
/// | Timeout, mid-stream network drop | Transient |
/// | 408, 5xx | Transient |
/// | 429 | RateLimited |
/// | other 4xx, IO, invalid URL, merge/integrity | Permanent |
#[must_use]
pub fn classify_failure(error: &TransferError) -> FailureType {
    match error {
        TransferError::Timeout { .. }
        | TransferError::Network { .. }
        | TransferError::Stalled { .. } => FailureType::Transient,
        TransferError::HttpStatus { status, .. } => match *status {
            408 => FailureType::Transient,
            429 => FailureType::RateLimited,
            s if (500..600).contains(&s) => FailureType::Transient,
            _ => FailureType::Permanent,
        },
        _ => FailureType::Permanent,
    }
}

fn retry_after_of(error: &TransferError) -> Option<Duration> {
    match error {
        TransferError::HttpStatus {
            retry_after: Some(value),
            ..
        } => parse_retry_after(value),
        _ => None,
    }
}

/// Parses a `Retry-After` header value: delta-seconds or an HTTP-date.
#[must_use]
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let when = httpdate::parse_http_date(value).ok()?;
    when.duration_since(std::time::SystemTime::now()).ok()
}
