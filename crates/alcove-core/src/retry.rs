//! Retry policy for fallible async operations
//!
//! The policy is a standalone value (one delay per attempt) composed around
//! the operation, so the schedule is independently testable and reusable
//! instead of living as a sleep loop inside the ingestion call.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// A fixed attempt schedule: `delays[i]` is the pause before attempt `i`.
///
/// The number of delays is the number of attempts; after the final attempt
/// fails, its error propagates unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    delays: Vec<Duration>,
}

impl RetryPolicy {
    /// Build a policy from an explicit delay schedule.
    ///
    /// An empty schedule is normalized to a single immediate attempt.
    pub fn new(delays: Vec<Duration>) -> Self {
        if delays.is_empty() {
            return Self {
                delays: vec![Duration::ZERO],
            };
        }
        Self { delays }
    }

    /// The ingestion schedule: immediate first attempt, then retries after
    /// 5, 15, and 45 seconds (~65s worst case across four attempts).
    pub fn ingestion() -> Self {
        Self::new(vec![
            Duration::ZERO,
            Duration::from_secs(5),
            Duration::from_secs(15),
            Duration::from_secs(45),
        ])
    }

    /// Total number of attempts this policy makes
    pub fn attempts(&self) -> usize {
        self.delays.len()
    }

    /// Run `op` under this policy.
    ///
    /// Each attempt is logged with its 1-based index, success or failure.
    /// The closure receives the attempt index for instrumentation.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<T, E>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let total = self.delays.len();
        let mut last_err: Option<E> = None;

        for (index, delay) in self.delays.iter().enumerate() {
            if !delay.is_zero() {
                tokio::time::sleep(*delay).await;
            }
            let attempt = index + 1;
            match op(attempt).await {
                Ok(value) => {
                    debug!(attempt, total, "Attempt succeeded");
                    return Ok(value);
                }
                Err(err) => {
                    warn!(attempt, total, error = %err, "Attempt failed");
                    last_err = Some(err);
                }
            }
        }

        // delays is never empty, so at least one attempt ran
        Err(last_err.expect("retry policy made at least one attempt"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    #[tokio::test]
    async fn first_success_short_circuits() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let result: Result<i32, String> = RetryPolicy::ingestion()
            .run(|_| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(42)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_schedule_returns_last_error() {
        let start = Instant::now();
        let attempt_offsets: Arc<std::sync::Mutex<Vec<Duration>>> =
            Arc::new(std::sync::Mutex::new(Vec::new()));
        let offsets = attempt_offsets.clone();

        let result: Result<(), String> = RetryPolicy::ingestion()
            .run(|attempt| {
                let offsets = offsets.clone();
                async move {
                    offsets.lock().unwrap().push(start.elapsed());
                    Err(format!("boom {}", attempt))
                }
            })
            .await;

        assert_eq!(result.unwrap_err(), "boom 4");

        let offsets = attempt_offsets.lock().unwrap();
        assert_eq!(offsets.len(), 4);
        // Attempts land at 0, 5, 20, and 65 seconds (cumulative 0/5/15/45)
        assert_eq!(offsets[0], Duration::ZERO);
        assert_eq!(offsets[1], Duration::from_secs(5));
        assert_eq!(offsets[2], Duration::from_secs(20));
        assert_eq!(offsets[3], Duration::from_secs(65));
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_mid_schedule() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let result: Result<&str, &str> = RetryPolicy::ingestion()
            .run(|attempt| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    if attempt < 3 {
                        Err("transient")
                    } else {
                        Ok("recovered")
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), "recovered");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn empty_schedule_normalizes_to_one_attempt() {
        assert_eq!(RetryPolicy::new(vec![]).attempts(), 1);
        assert_eq!(RetryPolicy::ingestion().attempts(), 4);
    }
}
