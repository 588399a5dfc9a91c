//! Retry wrapper applied to every collaborator call.
//!
//! Only [`FailureKind::Transient`] failures are retried. Backoff doubles per
//! attempt and is capped at `max_backoff_ms`.

use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::collab::CallError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts per call, including the first. Zero behaves as one.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
        }
    }
}

impl RetryPolicy {
    /// Retry up to `max_attempts` times with no delay between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
        }
    }

    /// Delay after the given (1-based) failed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = 2u64.saturating_pow(attempt.saturating_sub(1));
        let ms = self
            .initial_backoff_ms
            .saturating_mul(exponent)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }

    /// Run `op` until it succeeds, fails non-transiently, or attempts run out.
    pub fn run<T>(
        &self,
        label: &str,
        mut op: impl FnMut() -> Result<T, CallError>,
    ) -> Result<T, CallError> {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if err.kind.is_retryable() && attempt < attempts => {
                    let delay = self.delay_for(attempt);
                    log::warn!(
                        "{} retry {}/{} in {:?} ({})",
                        label,
                        attempt,
                        attempts - 1,
                        delay,
                        err.message
                    );
                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }
                    attempt += 1;
                }
                Err(err) if err.kind.is_retryable() && attempts > 1 => {
                    return Err(CallError::new(
                        err.kind,
                        format!("{} (gave up after {} attempts)", err.message, attempts),
                    ));
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::FailureKind;
    use std::cell::Cell;

    #[test]
    fn transient_failures_are_retried_until_success() {
        let calls = Cell::new(0);
        let result = RetryPolicy::immediate(3).run("fetch", || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(CallError::transient("503"))
            } else {
                Ok(42)
            }
        });
        assert_eq!(result, Ok(42));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn exhausted_retries_keep_transient_kind() {
        let calls = Cell::new(0);
        let err = RetryPolicy::immediate(4)
            .run("fetch", || -> Result<(), CallError> {
                calls.set(calls.get() + 1);
                Err(CallError::transient("timeout"))
            })
            .unwrap_err();
        assert_eq!(calls.get(), 4);
        assert_eq!(err.kind, FailureKind::Transient);
        assert!(err.message.contains("gave up after 4 attempts"));
    }

    #[test]
    fn auth_and_validation_are_not_retried() {
        for failure in [CallError::auth("401"), CallError::validation("400")] {
            let calls = Cell::new(0);
            let err = RetryPolicy::immediate(5)
                .run("update", || -> Result<(), CallError> {
                    calls.set(calls.get() + 1);
                    Err(failure.clone())
                })
                .unwrap_err();
            assert_eq!(calls.get(), 1);
            assert_eq!(err, failure);
        }
    }

    #[test]
    fn zero_attempts_still_calls_once() {
        let calls = Cell::new(0);
        let _ = RetryPolicy::immediate(0).run("x", || -> Result<(), CallError> {
            calls.set(calls.get() + 1);
            Err(CallError::transient("boom"))
        });
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 6,
            initial_backoff_ms: 500,
            max_backoff_ms: 3_000,
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1_000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(2_000));
        assert_eq!(policy.delay_for(4), Duration::from_millis(3_000));
        assert_eq!(policy.delay_for(40), Duration::from_millis(3_000));
    }
}
