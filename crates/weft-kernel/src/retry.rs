//! Retry policy.
//!
//! [`RetryPolicy`] envelopes a fallible async operation with bounded
//! attempts, configurable backoff, cancellation awareness and a retry hook.
//!
//! Cancellation and deadline errors are never retried — they always
//! propagate. Other errors are retryable when the pattern list is empty or
//! when the error text contains one of the configured substrings
//! (case-insensitive).

use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Delay growth curve between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    /// Every wait is `initial_delay`.
    Constant,
    /// Wait `k × initial_delay` after the k-th failed attempt.
    Linear,
    /// Wait `initial_delay × 2^(k−1)` after the k-th failed attempt.
    #[default]
    Exponential,
}

/// Bounded-retry configuration.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use weft_kernel::retry::{BackoffStrategy, RetryPolicy};
///
/// let policy = RetryPolicy {
///     max_attempts: 3,
///     initial_delay: Duration::from_millis(10),
///     max_delay: Duration::from_secs(1),
///     backoff: BackoffStrategy::Exponential,
///     retryable_errors: vec!["timeout".to_string()],
/// };
///
/// assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(20));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum invocations of the operation. 0 or 1 means no retry.
    pub max_attempts: u32,
    /// Base delay before the first retry.
    #[serde(with = "duration_ms")]
    pub initial_delay: Duration,
    /// Upper bound on any single wait.
    #[serde(with = "duration_ms")]
    pub max_delay: Duration,
    /// Delay growth curve.
    pub backoff: BackoffStrategy,
    /// Substrings that mark an error as retryable. Empty means every error
    /// is retryable (cancellation and deadline excepted).
    #[serde(default)]
    pub retryable_errors: Vec<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff: BackoffStrategy::Exponential,
            retryable_errors: Vec::new(),
        }
    }
}

impl RetryPolicy {
    /// Policy that retries every retryable error up to `max_attempts` with
    /// exponential backoff.
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// Delay before the next attempt after the k-th failed attempt (k ≥ 1),
    /// capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let delay = match self.backoff {
            BackoffStrategy::Constant => self.initial_delay,
            BackoffStrategy::Linear => self.initial_delay.saturating_mul(attempt),
            BackoffStrategy::Exponential => {
                // Cap the shift so the multiplier cannot overflow.
                let shift = (attempt - 1).min(31);
                self.initial_delay.saturating_mul(1u32 << shift)
            }
        };
        delay.min(self.max_delay)
    }

    /// Whether the error qualifies for another attempt.
    pub fn is_retryable(&self, error: &EngineError) -> bool {
        if error.is_cancellation() {
            return false;
        }
        if self.retryable_errors.is_empty() {
            return true;
        }
        let text = error.to_string().to_lowercase();
        self.retryable_errors
            .iter()
            .any(|p| text.contains(&p.to_lowercase()))
    }

    /// Run `op` under this policy.
    ///
    /// Invokes the operation up to `max_attempts` times. Between failed
    /// attempts the envelope calls `on_retry(attempt, error, delay)` and then
    /// waits the computed delay while honoring `cancel`; cancellation
    /// observed before or during the wait aborts with
    /// [`EngineError::Cancelled`]. When every attempt fails on a retryable
    /// error the last error is wrapped in
    /// [`EngineError::RetriesExhausted`]; non-retryable errors propagate
    /// unchanged.
    pub async fn execute<T, F, Fut, H>(
        &self,
        cancel: &CancellationToken,
        mut on_retry: H,
        mut op: F,
    ) -> EngineResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = EngineResult<T>>,
        H: FnMut(u32, &EngineError, Duration),
    {
        let max_attempts = self.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }

            let error = match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if !self.is_retryable(&error) {
                return Err(error);
            }
            if attempt == max_attempts {
                return Err(EngineError::RetriesExhausted {
                    attempts: max_attempts,
                    last: error.to_string(),
                });
            }

            let delay = self.delay_for_attempt(attempt);
            debug!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "retrying after failed attempt"
            );
            on_retry(attempt, &error, delay);

            tokio::select! {
                _ = cancel.cancelled() => return Err(EngineError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        // max_attempts ≥ 1, so the loop always returns.
        Err(EngineError::Cancelled)
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(d)?;
        Ok(Duration::from_millis(ms))
    }
}

// ============================================================================
// Tests
// ============================================================================
