use crate::core::config::RetryConfig;
use crate::core::error::AppError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Immutable retry configuration for one invocation. A config-driven default
/// exists; callers may override per call site.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub backoff_multiplier: f64,
    pub max_delay: Duration,
    /// Zero keeps the backoff sequence deterministic.
    pub jitter: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        RetryPolicy {
            max_attempts: config.max_attempts.max(1),
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            backoff_multiplier: config.backoff_multiplier,
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter: Duration::from_millis(config.jitter_ms),
        }
    }

    /// Sleep before retry number `retry` (1-based):
    /// `min(initial_delay * multiplier^(retry-1), max_delay)`.
    fn delay_for(&self, retry: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(retry.saturating_sub(1) as i32);
        let millis = (self.initial_delay.as_millis() as f64 * factor)
            .min(self.max_delay.as_millis() as f64);
        let mut delay = Duration::from_millis(millis as u64);
        if !self.jitter.is_zero() {
            let extra = rand::thread_rng().gen_range(0..=self.jitter.as_millis() as u64);
            delay += Duration::from_millis(extra);
        }
        delay
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::from_config(&RetryConfig::default())
    }
}

/// Successful result of a retried unit of work, with the number of retries
/// consumed, for observability.
#[derive(Debug)]
pub struct RetrySuccess<T> {
    pub value: T,
    pub retry_count: u32,
}

/// Run `op` under the policy. Only retryable failures (per
/// `AppError::is_retryable`) consume further attempts; terminal errors abort
/// immediately. On exhaustion the last error is returned, annotated with the
/// attempt count, message intact.
pub async fn run_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    mut op: F,
) -> Result<RetrySuccess<T>, AppError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let mut attempt = 1u32;
    loop {
        match op(attempt).await {
            Ok(value) => {
                return Ok(RetrySuccess {
                    value,
                    retry_count: attempt - 1,
                })
            }
            Err(err) if !err.is_retryable() => {
                return Err(err.with_retry_count(attempt - 1));
            }
            Err(err) if attempt >= policy.max_attempts => {
                let mut err = err.with_retry_count(attempt - 1);
                err.add_context("attempts", &attempt.to_string());
                return Err(err);
            }
            Err(err) => {
                let delay = policy.delay_for(attempt);
                warn!(
                    attempt = attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retryable failure, backing off"
                );
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
