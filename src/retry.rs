//! Retry with exponential backoff and jitter.
//!
//! Reconciliation never retries internally; failed passes are requeued by the
//! controller. This is only for startup calls that must complete before the
//! controller can run, such as listing ACM to fill the identity cache.
//!
//! # Example
//!
//! ```ignore
//! use cert_importer::retry::{retry_with_backoff, RetryPolicy};
//!
//! let page = retry_with_backoff(&RetryPolicy::with_max_attempts(5), "list_certificates", || {
//!     api.list_certificates(token.clone())
//! })
//! .await?;
//! ```

use std::time::Duration;

use rand::Rng;
use tracing::{error, warn};

/// Backoff schedule for a retried operation
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Total attempts including the first; at least one attempt is always made
    pub max_attempts: u32,
    /// Delay after the first failure
    pub initial_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
    /// Factor applied to the delay after each failure
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Default schedule with the given attempt budget
    pub fn with_max_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: attempts,
            ..Default::default()
        }
    }

    /// Delay before attempt `attempt + 1`, without jitter
    ///
    /// `attempt` counts from 1 (the first failed attempt).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::from_secs_f64(secs.min(self.max_delay.as_secs_f64()))
    }
}

/// Run an async operation until it succeeds or the attempt budget is spent.
///
/// Each delay is jittered to 0.5x-1.5x of [`RetryPolicy::delay_for`].
/// Returns the last error once `max_attempts` is reached.
pub async fn retry_with_backoff<F, Fut, T, E>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        let err = match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => e,
        };

        if attempt >= max_attempts {
            error!(
                operation = %operation_name,
                attempt,
                error = %err,
                "operation failed after max retries"
            );
            return Err(err);
        }

        let jitter = rand::thread_rng().gen_range(0.5..1.5);
        let delay = policy.delay_for(attempt).mul_f64(jitter);

        warn!(
            operation = %operation_name,
            attempt,
            error = %err,
            delay_ms = delay.as_millis() as u64,
            "operation failed, retrying"
        );

        tokio::time::sleep(delay).await;
    }
}
