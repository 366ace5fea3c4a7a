//! Generic exponential-backoff retry helper used by every LLM-calling
//! component (§4.3's "up to N attempts... exponential backoff" discipline).

use std::time::Duration;

/// Classifies an attempt's failure as retryable or terminal. Non-transient
/// failures are returned immediately after the first attempt, matching
/// §4.3's "non-transient errors are returned after the first attempt".
pub trait Transient {
    fn is_transient(&self) -> bool;
}

impl Transient for crate::error::FabricError {
    fn is_transient(&self) -> bool {
        crate::error::FabricError::is_transient(self)
    }
}

/// Retry `attempt` up to `max_attempts` times with exponential backoff
/// starting at `base_delay` and capped at `max_delay`, stopping early on a
/// non-transient error.
pub async fn retry_with_backoff<T, E, F, Fut>(
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    mut attempt: F,
) -> Result<T, E>
where
    E: Transient,
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let mut delay = base_delay;
    let mut last_err = None;

    for attempt_number in 1..=max_attempts.max(1) {
        match attempt(attempt_number).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let transient = err.is_transient();
                last_err = Some(err);
                if !transient || attempt_number == max_attempts {
                    break;
                }
                tokio::time::sleep(delay).await;
                delay = std::cmp::min(delay * 2, max_delay);
            }
        }
    }

    Err(last_err.expect("loop runs at least once"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, PartialEq)]
    struct Flaky(bool);
    impl Transient for Flaky {
        fn is_transient(&self) -> bool {
            self.0
        }
    }

    #[tokio::test]
    async fn stops_after_first_non_transient_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), Flaky> = retry_with_backoff(
            3,
            Duration::from_millis(1),
            Duration::from_millis(2),
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(Flaky(false)) }
            },
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_errors_up_to_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), Flaky> = retry_with_backoff(
            3,
            Duration::from_millis(1),
            Duration::from_millis(2),
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(Flaky(true)) }
            },
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn succeeds_on_a_later_attempt() {
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(3, Duration::from_millis(1), Duration::from_millis(2), |n| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(Flaky(true))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
