//! Behavior shared by every adapter: bounded retry with exponential
//! backoff, a per-attempt timeout, and the cost calculator.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use super::{AdapterError, TransportReply};

/// Retry and timeout parameters for adapter transport calls.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Backoff multiplier applied per attempt.
    pub multiplier: f64,
    /// Budget for each individual attempt.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            multiplier: 2.0,
            attempt_timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Backoff delay before retrying after `attempt` (1-based) failed.
    fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = self.multiplier.powi(i32::try_from(exponent).unwrap_or(i32::MAX));
        let secs = self.initial_delay.as_secs_f64() * factor;
        Duration::try_from_secs_f64(secs).unwrap_or(self.initial_delay)
    }
}

/// Whether a failed attempt is worth repeating. Transport drops, timeouts,
/// rate limiting, and server errors are; client errors are not.
fn retryable(error: &AdapterError) -> bool {
    match error {
        AdapterError::Transport(_) | AdapterError::Timeout(_) => true,
        AdapterError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
        _ => false,
    }
}

/// Run `attempt` under the policy's timeout, retrying retryable failures
/// with exponential backoff, and return the successful reply body.
///
/// # Errors
///
/// Returns the non-retryable error as-is, or
/// [`AdapterError::RetriesExhausted`] once the attempt budget is spent.
pub async fn execute_with_retry<F, Fut>(
    policy: &RetryPolicy,
    mut attempt: F,
) -> Result<String, AdapterError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<TransportReply, AdapterError>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut last_error = String::new();

    for current in 1..=attempts {
        let outcome = match tokio::time::timeout(policy.attempt_timeout, attempt()).await {
            Ok(result) => result,
            Err(_) => Err(AdapterError::Timeout(
                u64::try_from(policy.attempt_timeout.as_millis()).unwrap_or(u64::MAX),
            )),
        };

        match outcome {
            Ok(reply) if reply.is_success() => return Ok(reply.body),
            Ok(reply) => {
                let error = AdapterError::HttpStatus {
                    status: reply.status,
                    body: super::sanitize_error_body(&reply.body),
                };
                if !retryable(&error) {
                    return Err(error);
                }
                last_error = error.to_string();
            }
            Err(error) => {
                if !retryable(&error) {
                    return Err(error);
                }
                last_error = error.to_string();
            }
        }

        if current < attempts {
            let delay = policy.delay_after(current);
            let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
            debug!(attempt = current, delay_ms, "retrying provider call");
            tokio::time::sleep(delay).await;
        }
    }

    Err(AdapterError::RetriesExhausted {
        attempts,
        last_error,
    })
}

/// Cost of one call in USD, rounded to six decimal places. Rates are USD
/// per million tokens.
pub fn compute_cost(input_tokens: u32, output_tokens: u32, input_rate: f64, output_rate: f64) -> f64 {
    let input = f64::from(input_tokens) / 1_000_000.0 * input_rate;
    let output = f64::from(output_tokens) / 1_000_000.0 * output_rate;
    ((input + output) * 1_000_000.0).round() / 1_000_000.0
}
