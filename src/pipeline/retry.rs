use std::future::Future;
use std::time::Duration;

use crate::config::RetrySettings;
use crate::error::Result;

/// Bounded exponential backoff that only retries transient errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&RetrySettings::default())
    }
}

impl RetryPolicy {
    pub fn new(min_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            min_delay,
            max_delay: max_delay.max(min_delay),
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn from_settings(settings: &RetrySettings) -> Self {
        let unit = Duration::from_millis(settings.unit_ms);
        Self::new(
            unit.saturating_mul(settings.min_delay),
            unit.saturating_mul(settings.max_delay),
            settings.max_attempts,
        )
    }

    /// Wait before retry `retry` (1-based): `min * 2^(retry - 1)` held
    /// within `[min, max]`.
    pub fn delay(self: &Self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1).min(31));
        self.min_delay
            .saturating_mul(factor)
            .min(self.max_delay)
            .max(self.min_delay)
    }

    /// Run `operation` until it succeeds, fails with a non-transient error or
    /// runs out of attempts. The operation gets the 1-based attempt number.
    /// Returns the last result and the number of attempts made.
    pub async fn retry<T, F, Fut>(self: &Self, label: &str, mut operation: F) -> (Result<T>, u32)
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(value) => return (Ok(value), attempt),
                Err(e) if !e.is_transient() => return (Err(e), attempt),
                Err(e) if attempt >= self.max_attempts => {
                    log::error!("{label}: giving up after {attempt} attempts");
                    return (Err(e), attempt);
                }
                Err(e) => {
                    let backoff = self.delay(attempt);
                    log::warn!(
                        "{label}: attempt {attempt} failed ({e}), retrying in {:.1}s",
                        backoff.as_secs_f64()
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::Mutex;
    use tokio::time::Instant;

    fn units(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::new(units(2), units(20), 5)
    }

    #[test]
    fn test_delay_schedule() {
        let policy = policy();
        let delays: Vec<_> = (1..=7).map(|n| policy.delay(n).as_secs()).collect();
        assert_eq!(delays, vec![2, 4, 8, 16, 20, 20, 20]);
        assert_eq!(policy.delay(u32::MAX), units(20));
    }

    #[test]
    fn test_from_settings_uses_unit_length() {
        let settings = RetrySettings {
            min_delay: 2,
            max_delay: 20,
            unit_ms: 500,
            max_attempts: 3,
        };
        let policy = RetryPolicy::from_settings(&settings);
        assert_eq!(policy.min_delay, Duration::from_secs(1));
        assert_eq!(policy.max_delay, Duration::from_secs(10));
        assert_eq!(policy.max_attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_transient_failures_then_success() {
        let started = Instant::now();
        let calls = Mutex::new(vec![]);

        let (result, attempts) = policy()
            .retry("G1", |attempt| {
                calls.lock().unwrap().push(started.elapsed());
                async move {
                    if attempt <= 2 {
                        Err(Error::from_status("drive", 503, "backend error"))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(attempts, 3);
        let calls = calls.into_inner().unwrap();
        assert!(calls[1] - calls[0] >= units(2));
        assert!(calls[2] - calls[1] >= units(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_errors_are_not_retried() {
        let (result, attempts) = policy()
            .retry("G1", |_| async { Err::<(), _>(Error::not_found("glacier", "G1")) })
            .await;
        assert!(result.unwrap_err().is_not_found());
        assert_eq!(attempts, 1);

        let (result, attempts) = policy()
            .retry("G1", |_| async { Err::<(), _>(Error::from_status("drive", 401, "")) })
            .await;
        assert!(result.unwrap_err().is_fatal());
        assert_eq!(attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempts_are_bounded() {
        let started = Instant::now();
        let (result, attempts) = policy()
            .retry("G1", |_| async { Err::<(), _>(Error::from_status("ee", 429, "")) })
            .await;
        assert!(result.unwrap_err().is_transient());
        assert_eq!(attempts, 5);
        // 2 + 4 + 8 + 16 units between five attempts
        assert!(started.elapsed() >= units(30));
    }
}
