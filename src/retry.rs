use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use backoff::ExponentialBackoffBuilder;

/// Exponential backoff: the delay after attempt `n` (zero based) is
/// `base_delay * 2^n`, and at most `max_attempts` calls are made.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(1000),
        }
    }
}

#[derive(Debug)]
pub enum RetryError<E> {
    /// Every attempt failed with a retryable error.
    Exhausted { attempts: u32, last: E },
    /// A non-retryable error ended the loop.
    Permanent(E),
}

pub async fn retry_with_backoff<T, E, Op, Fut, P>(
    policy: RetryPolicy,
    is_retryable: P,
    mut operation: Op,
) -> Result<T, RetryError<E>>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let backoff = ExponentialBackoffBuilder::new()
        .with_initial_interval(policy.base_delay)
        .with_multiplier(2.0)
        .with_randomization_factor(0.0)
        .with_max_interval(
            policy
                .base_delay
                .checked_mul(2u32.saturating_pow(max_attempts))
                .unwrap_or(Duration::MAX),
        )
        .with_max_elapsed_time(None)
        .build();

    let is_retryable = &is_retryable;
    let mut attempts = 0u32;

    let result = backoff::future::retry_notify(
        backoff,
        || {
            attempts += 1;
            let attempt = attempts;
            let fut = operation();
            async move {
                match fut.await {
                    Ok(value) => Ok(value),
                    Err(err) if attempt < max_attempts && is_retryable(&err) => {
                        Err(backoff::Error::transient(err))
                    }
                    Err(err) => Err(backoff::Error::permanent(err)),
                }
            }
        },
        |err: E, delay: Duration| {
            tracing::warn!("{}; retrying in {}ms", err, delay.as_millis());
        },
    )
    .await;

    result.map_err(|err| {
        if is_retryable(&err) {
            RetryError::Exhausted {
                attempts: max_attempts,
                last: err,
            }
        } else {
            RetryError::Permanent(err)
        }
    })
}
