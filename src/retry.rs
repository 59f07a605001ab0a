//! Rate-limit retry loop for the Google Trends fetch.

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use std::future::Future;
use std::time::Duration;

use crate::error::{AppError, FetchError};
use crate::search::{SearchProvider, TrendsResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Doubling schedule without jitter: base, 2*base, 4*base, ...
    fn schedule(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.base_delay)
            .with_randomization_factor(0.0)
            .with_multiplier(2.0)
            .with_max_interval(Duration::from_secs(u32::MAX as u64))
            .with_max_elapsed_time(None)
            .build()
    }
}

fn retry_notify_handler(attempt: u32, wait: Duration) {
    tracing::warn!(
        attempt,
        "Google Trends rate-limited. Sleeping {:.0}s before retrying...",
        wait.as_secs_f32()
    );
}

/// Run `op` until it succeeds, fails with something other than `RateLimited`,
/// or has been rate limited `max_attempts` times. Each rate limit is followed by
/// a sleep, including the last one, so the worst case blocks for the whole schedule.
pub async fn retry_on_rate_limit<T, F, Fut>(
    policy: RetryPolicy,
    mut op: F,
    mut notify: impl FnMut(u32, Duration),
) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let mut schedule = policy.schedule();
    let mut attempt = 0;
    while attempt < policy.max_attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(FetchError::RateLimited) => {
                let wait = schedule.next_backoff().unwrap_or(policy.base_delay);
                notify(attempt, wait);
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
            Err(other) => return Err(AppError::SearchFailed(other)),
        }
    }
    tracing::error!("Google Trends fetch failed after {} attempts", attempt);
    Err(AppError::TrendsRateLimited { attempts: attempt })
}

/// Fetch the rising/top related queries, backing off while rate limited.
#[tracing::instrument(skip(provider))]
pub async fn fetch_trends_with_backoff(
    provider: &dyn SearchProvider,
    policy: RetryPolicy,
) -> Result<TrendsResult, AppError> {
    retry_on_rate_limit(policy, || provider.trends(), retry_notify_handler).await
}
