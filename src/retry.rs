//! Bounded retry with exponential backoff and jitter.
//!
//! The retry policy is plain configuration so callers and tests decide how many attempts a
//! read-modify-write cycle gets and how long to wait between them.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{error, warn};

use crate::constants;
use crate::model::Error;

#[derive(Clone, Debug, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Upper bound for the delay between attempts
    pub max_delay: Duration,
    /// Multiplier applied to the delay after every failed attempt
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: constants::CONFLICT_RETRY_ATTEMPTS,
            initial_delay: Duration::from_millis(constants::CONFLICT_RETRY_DELAY_MS),
            max_delay: Duration::from_millis(constants::CONFLICT_RETRY_MAX_DELAY_MS),
            backoff_multiplier: constants::CONFLICT_RETRY_BACKOFF,
        }
    }
}

impl RetryConfig {
    pub fn with_max_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: attempts,
            ..Default::default()
        }
    }

    /// Retries without waiting, used to force conflicts deterministically
    pub fn immediate(attempts: u32) -> Self {
        Self {
            max_attempts: attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }
}

/// Runs `operation` until it succeeds, fails with an error `should_retry` rejects, or
/// `max_attempts` is reached. The last error is returned unchanged.
pub async fn retry_with_backoff<F, Fut, T, E, P>(
    config: &RetryConfig,
    operation_name: &str,
    should_retry: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0u32;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if !should_retry(&e) => return Err(e),
            Err(e) => {
                if attempt >= config.max_attempts {
                    error!(operation = %operation_name, attempt, error = %e, "Operation failed after max retries");
                    return Err(e);
                }

                let jitter = rand::thread_rng().gen_range(0.9..1.1);
                let jittered_delay = Duration::from_secs_f64(delay.as_secs_f64() * jitter);

                warn!(
                    operation = %operation_name,
                    attempt,
                    error = %e,
                    delay_ms = jittered_delay.as_millis(),
                    "Operation failed, retrying"
                );

                tokio::time::sleep(jittered_delay).await;

                delay = Duration::from_secs_f64(
                    (delay.as_secs_f64() * config.backoff_multiplier).min(config.max_delay.as_secs_f64()),
                );
            }
        }
    }
}

/// Retries a read-modify-write cycle while the API server reports update conflicts.
///
/// Any other error aborts immediately. When the attempts run out on a conflict, the conflict
/// is surfaced as `ConflictRetriesExhausted`.
pub async fn retry_on_conflict<F, Fut, T>(config: &RetryConfig, operation_name: &str, operation: F) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    retry_with_backoff(config, operation_name, Error::is_conflict, operation)
        .await
        .map_err(|e| {
            if e.is_conflict() {
                Error::ConflictRetriesExhausted {
                    attempts: config.max_attempts,
                    source: Box::new(e),
                }
            } else {
                e
            }
        })
}
