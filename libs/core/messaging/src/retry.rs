//! Exponential backoff with a bounded attempt count.

use crate::config::RetryPolicy;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// A failed attempt that is about to be retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryAttempt {
    /// 1-based number of the attempt that failed
    pub attempt: u32,

    /// Retry budget of the policy in effect
    pub max_retries: u32,

    /// Delay before the next attempt
    pub delay: Duration,

    /// Rendered error of the failed attempt
    pub error: String,
}

/// Receives retry events from the backoff loop.
pub trait RetryObserver: Send + Sync {
    /// Called after a failed attempt, before the backoff delay starts.
    fn on_retry(&self, attempt: &RetryAttempt);

    /// Called once when the retry budget is spent.
    fn on_exhausted(&self, _attempts: u32, _error: &str) {}
}

/// Default observer that writes retry events to `tracing`.
#[derive(Debug, Clone, Default)]
pub struct TracingObserver;

impl RetryObserver for TracingObserver {
    fn on_retry(&self, attempt: &RetryAttempt) {
        warn!(
            attempt = attempt.attempt,
            max_retries = attempt.max_retries,
            delay_ms = attempt.delay.as_millis() as u64,
            error = %attempt.error,
            "Connection attempt failed, retrying"
        );
    }

    fn on_exhausted(&self, attempts: u32, error: &str) {
        warn!(attempts, error = %error, "Connection retries exhausted");
    }
}

/// Shared observer handle.
pub type SharedObserver = Arc<dyn RetryObserver>;

/// Retry an async operation with exponential backoff.
///
/// Makes at most `policy.max_retries + 1` attempts. Every failure except the
/// last is reported to `observer`; the last error is returned unchanged.
///
/// # Example
/// ```ignore
/// let policy = RetryPolicy::new().with_max_retries(5);
/// retry_with_backoff(|| client.connect(), &policy, &TracingObserver).await?;
/// ```
pub async fn retry_with_backoff<F, Fut, T, E>(
    mut operation: F,
    policy: &RetryPolicy,
    observer: &dyn RetryObserver,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt: u32 = 0;
    let mut interval = policy.initial_interval.min(policy.max_interval);

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!(retries = attempt, "Operation succeeded after retries");
                }
                return Ok(result);
            }
            Err(e) => {
                attempt += 1;

                if attempt > policy.max_retries {
                    observer.on_exhausted(attempt, &e.to_string());
                    return Err(e);
                }

                let delay =
                    apply_jitter(interval, policy.randomization_factor).min(policy.max_interval);
                observer.on_retry(&RetryAttempt {
                    attempt,
                    max_retries: policy.max_retries,
                    delay,
                    error: e.to_string(),
                });

                tokio::time::sleep(delay).await;

                interval = next_interval(interval, policy);
            }
        }
    }
}

/// Grow `current` by the policy multiplier, capped at `max_interval`.
fn next_interval(current: Duration, policy: &RetryPolicy) -> Duration {
    let grown = current.as_nanos() as f64 * policy.multiplier;
    if !grown.is_finite() || grown >= policy.max_interval.as_nanos() as f64 {
        policy.max_interval
    } else {
        Duration::from_nanos(grown as u64)
    }
}

/// Spread `delay` uniformly over `delay * (1 ± factor)`.
fn apply_jitter(delay: Duration, factor: f64) -> Duration {
    use std::collections::hash_map::RandomState;
    use std::hash::BuildHasher;

    if factor <= 0.0 || delay.is_zero() {
        return delay;
    }
    let factor = factor.min(1.0);

    // 0.0 ..= 1.0
    let unit = (RandomState::new().hash_one(std::time::SystemTime::now()) % 1001) as f64 / 1000.0;
    let scale = 1.0 - factor + 2.0 * factor * unit;

    Duration::from_secs_f64(delay.as_secs_f64() * scale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct RecordingObserver {
        attempts: Mutex<Vec<RetryAttempt>>,
        exhausted: AtomicU32,
    }

    impl RetryObserver for RecordingObserver {
        fn on_retry(&self, attempt: &RetryAttempt) {
            self.attempts.lock().unwrap().push(attempt.clone());
        }

        fn on_exhausted(&self, attempts: u32, _error: &str) {
            self.exhausted.store(attempts, Ordering::SeqCst);
        }
    }

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new()
            .with_max_retries(max_retries)
            .with_initial_interval(Duration::from_millis(1))
            .without_jitter()
    }

    #[tokio::test]
    async fn test_retry_success_first_attempt() {
        let counter = &AtomicU32::new(0);
        let observer = RecordingObserver::default();

        let result = retry_with_backoff(
            || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>("connected")
            },
            &fast_policy(3),
            &observer,
        )
        .await;

        assert_eq!(result.unwrap(), "connected");
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(observer.attempts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retry_success_after_failures() {
        let counter = &AtomicU32::new(0);
        let observer = RecordingObserver::default();

        let result = retry_with_backoff(
            || async move {
                let count = counter.fetch_add(1, Ordering::SeqCst);
                if count < 2 {
                    Err(format!("attempt {}", count + 1))
                } else {
                    Ok("connected")
                }
            },
            &fast_policy(5),
            &observer,
        )
        .await;

        assert_eq!(result.unwrap(), "connected");
        assert_eq!(counter.load(Ordering::SeqCst), 3);

        let attempts = observer.attempts.lock().unwrap();
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[0].attempt, 1);
        assert_eq!(attempts[0].error, "attempt 1");
        assert_eq!(attempts[1].attempt, 2);
        assert_eq!(attempts[1].max_retries, 5);
        assert_eq!(observer.exhausted.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_retry_max_retries_exceeded() {
        for max_retries in [0, 1, 4] {
            let counter = &AtomicU32::new(0);
            let observer = RecordingObserver::default();

            let result = retry_with_backoff(
                || async move {
                    let count = counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(format!("failure {}", count + 1))
                },
                &fast_policy(max_retries),
                &observer,
            )
            .await;

            assert_eq!(result.unwrap_err(), format!("failure {}", max_retries + 1));
            assert_eq!(counter.load(Ordering::SeqCst), max_retries + 1);
            assert_eq!(observer.attempts.lock().unwrap().len() as u32, max_retries);
            assert_eq!(observer.exhausted.load(Ordering::SeqCst), max_retries + 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_exponential_backoff_delays() {
        let observer = RecordingObserver::default();
        let policy = RetryPolicy::new()
            .with_max_retries(4)
            .with_initial_interval(Duration::from_millis(100))
            .with_multiplier(2.0)
            .with_max_interval(Duration::from_millis(300))
            .without_jitter();

        let _ = retry_with_backoff(|| async { Err::<(), _>("fail") }, &policy, &observer).await;

        let delays: Vec<u64> = observer
            .attempts
            .lock()
            .unwrap()
            .iter()
            .map(|a| a.delay.as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![100, 200, 300, 300]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delays_never_exceed_max_interval() {
        let observer = RecordingObserver::default();
        let policy = RetryPolicy::new()
            .with_max_retries(40)
            .with_initial_interval(Duration::from_millis(500))
            .with_max_interval(Duration::from_millis(100));
        assert!(policy.randomization_factor > 0.0);

        let _ = retry_with_backoff(|| async { Err::<(), _>("fail") }, &policy, &observer).await;

        let attempts = observer.attempts.lock().unwrap();
        assert_eq!(attempts.len(), 40);
        for attempt in attempts.iter() {
            assert!(
                attempt.delay <= Duration::from_millis(100),
                "attempt {} waited {:?}",
                attempt.attempt,
                attempt.delay
            );
        }
    }

    #[test]
    fn test_apply_jitter_bounds() {
        let delay = Duration::from_millis(1000);
        for _ in 0..20 {
            let jittered = apply_jitter(delay, 0.5);
            assert!(jittered >= Duration::from_millis(500));
            assert!(jittered <= Duration::from_millis(1500));
        }
    }

    #[test]
    fn test_apply_jitter_disabled() {
        let delay = Duration::from_millis(1000);
        assert_eq!(apply_jitter(delay, 0.0), delay);
    }
}
