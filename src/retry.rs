//! Bounded retry with exponential backoff and jitter (spec §5 "Cancellation & timeouts").
//!
//! Every external call (HTTP adapter, JSON-RPC) goes through [`with_retry`], which wraps a
//! fallible async operation with a per-attempt timeout and a capped number of attempts.
//! This is the "single retry combinator parameterized by attempt count and per-attempt
//! timeout" called for in spec §9's design notes, modeled as a plain `Result`-returning
//! function rather than the `go(fn, {timeoutMs, retries})` continuation style of the
//! reference implementation.

use rand::Rng;
use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;

/// Default per-attempt timeout, matching `TIMEOUT_MS` in spec §6.
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;
/// Default maximum number of attempts (spec §5: "maximum 2 attempts").
pub const DEFAULT_MAX_ATTEMPTS: u32 = 2;

const BACKOFF_BASE_MS: u64 = 100;
const BACKOFF_CAP_MS: u64 = 500;
const BACKOFF_FACTOR: u64 = 2;

/// Parameters for [`with_retry`].
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub timeout: Duration,
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// The outcome of a call that ran out of attempts.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The per-attempt timeout elapsed on every attempt.
    TimedOut,
    /// The operation returned an error on every attempt; carries the last error.
    Exhausted(E),
}

impl<E: std::fmt::Display> std::fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetryError::TimedOut => write!(f, "timed out on every attempt"),
            RetryError::Exhausted(e) => write!(f, "exhausted retries: {e}"),
        }
    }
}

/// Computes the backoff delay before attempt `attempt_index` (0-based: the delay before the
/// *second* attempt is `backoff_delay(0)`), with full jitter applied on top of the
/// exponential base.
fn backoff_delay(attempt_index: u32) -> Duration {
    let exp = BACKOFF_BASE_MS.saturating_mul(BACKOFF_FACTOR.saturating_pow(attempt_index));
    let capped = exp.min(BACKOFF_CAP_MS);
    let jittered = rand::rng().random_range(0..=capped);
    Duration::from_millis(jittered)
}

/// Runs `op` up to `config.max_attempts` times, each attempt bounded by `config.timeout`,
/// with exponential backoff (cap 500ms, base 100ms, factor 2, full jitter) between attempts.
///
/// Returns the first successful result, or [`RetryError`] describing the last failure once
/// attempts are exhausted. A single work unit's exhaustion must never affect others calling
/// `with_retry` concurrently — this function touches no shared state.
pub async fn with_retry<F, Fut, T, E>(config: RetryConfig, mut op: F) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Debug,
{
    let mut last_error: Option<RetryError<E>> = None;
    for attempt in 0..config.max_attempts {
        if attempt > 0 {
            tokio::time::sleep(backoff_delay(attempt - 1)).await;
        }
        match tokio::time::timeout(config.timeout, op()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(error)) => last_error = Some(RetryError::Exhausted(error)),
            Err(_elapsed) => last_error = Some(RetryError::TimedOut),
        }
    }
    Err(last_error.expect("max_attempts is always >= 1"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_immediately_without_retrying() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, RetryError<&str>> = with_retry(RetryConfig::default(), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<u32, &str>(42)
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_once_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, RetryError<String>> =
            with_retry(RetryConfig::default(), || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    Err("api call failed".to_string())
                } else {
                    Ok(7)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn exhausts_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig {
            timeout: Duration::from_millis(50),
            max_attempts: 2,
        };
        let result: Result<u32, RetryError<String>> = with_retry(config, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err("still failing".to_string())
        })
        .await;
        assert!(matches!(result, Err(RetryError::Exhausted(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
