//! Linear-backoff retry for remote calls.
//!
//! Attempt `n` (1-based) that fails transiently is followed by a sleep of
//! `base_delay * n`. Non-transient errors are returned immediately.

use std::time::Duration;

use fieldsync_core::RetryConfig;

use crate::error::RemoteError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
        }
    }
}

impl RetryPolicy {
    /// No delay between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay slept after failed attempt `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }

    /// Run `op` until it succeeds, fails non-transiently, or the attempt
    /// budget is spent. At least one attempt is always made.
    pub fn run<T>(
        &self,
        what: &str,
        op: impl FnMut() -> Result<T, RemoteError>,
    ) -> Result<T, RemoteError> {
        self.run_with_sleep(what, op, std::thread::sleep)
    }

    pub(crate) fn run_with_sleep<T>(
        &self,
        what: &str,
        mut op: impl FnMut() -> Result<T, RemoteError>,
        mut sleep: impl FnMut(Duration),
    ) -> Result<T, RemoteError> {
        let max = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < max => {
                    let delay = self.delay_after(attempt);
                    tracing::debug!(
                        call = what,
                        attempt,
                        max_attempts = max,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "remote call failed, retrying"
                    );
                    sleep(delay);
                    attempt += 1;
                }
                Err(err) => {
                    if err.is_transient() {
                        tracing::warn!(call = what, attempts = attempt, error = %err, "retry budget exhausted");
                    }
                    return Err(err);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
