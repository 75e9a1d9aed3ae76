//! Bounded retries for individual network steps.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Why a [`RetryingStep`] gave up.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RetryError {
    #[error("{step} failed after {attempts} attempts")]
    Exhausted { step: String, attempts: u32 },

    #[error("{step} cancelled")]
    Cancelled { step: String },
}

/// Runs one step until it succeeds, runs out of attempts or is cancelled.
///
/// An attempt reports success with `Some`. Attempts run back to back; the
/// cancellation token is checked before every attempt and raced against the
/// attempt in flight.
pub struct RetryingStep {
    step: String,
    attempts: u32,
    cancel: CancellationToken,
}

impl RetryingStep {
    /// Creates a step allowing `attempts` attempts (at least one).
    pub fn new(step: impl Into<String>, attempts: u32, cancel: CancellationToken) -> Self {
        Self {
            step: step.into(),
            attempts: attempts.max(1),
            cancel,
        }
    }

    /// Runs `attempt`, passing the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, mut attempt: F) -> Result<T, RetryError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Option<T>>,
    {
        for n in 1..=self.attempts {
            if self.cancel.is_cancelled() {
                return Err(self.cancelled());
            }

            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(self.cancelled()),
                result = attempt(n) => result,
            };

            match result {
                Some(value) => return Ok(value),
                None => debug!(step = %self.step, attempt = n, "attempt failed"),
            }
        }

        warn!(step = %self.step, attempts = self.attempts, "retries exhausted");
        Err(RetryError::Exhausted {
            step: self.step.clone(),
            attempts: self.attempts,
        })
    }

    fn cancelled(&self) -> RetryError {
        RetryError::Cancelled {
            step: self.step.clone(),
        }
    }
}

/// Delay before completion retry number `retry` (1-based): 1 s, 2 s, 4 s...
///
/// A network error (no response at all) retries immediately.
pub fn completion_backoff(retry: u32, network_error: bool) -> Duration {
    if network_error {
        return Duration::ZERO;
    }
    let exponent = retry.saturating_sub(1).min(16);
    Duration::from_secs(1u64 << exponent)
}
