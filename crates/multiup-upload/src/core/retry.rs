use std::time::Duration;

use crate::error::ErrorKind;

/// Calculate the delay before a retry pass using exponential backoff.
///
/// The delay formula is: `base * 2^retry_count`
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use multiup_upload::retry_delay;
///
/// // First retry: base * 2^0 = base
/// assert_eq!(retry_delay(0, Duration::from_millis(100)), Duration::from_millis(100));
///
/// // Second retry: base * 2^1 = base * 2
/// assert_eq!(retry_delay(1, Duration::from_millis(100)), Duration::from_millis(200));
/// ```
pub fn retry_delay(retry_count: u32, base: Duration) -> Duration {
    let multiplier = 2_u32.saturating_pow(retry_count);
    base.saturating_mul(multiplier)
}

/// What to do with a task whose attempt just failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Queue for the next pass without waiting.
    RetryImmediately,
    /// Drop the cached token and re-run the attempt now.
    RetryWithRefresh,
    /// Queue for the next pass after at least this delay.
    RetryWithBackoff(Duration),
    Fail,
}

/// Pure mapping from a classified failure to a [`RetryDecision`].
///
/// `passes_used` counts the retry passes already spent on the task (0 during
/// the first pass). A stale-authentication failure earns one refresh per
/// task regardless of the pass budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff_base: Duration) -> Self {
        Self {
            max_retries,
            backoff_base,
        }
    }

    pub fn decide(
        &self,
        kind: ErrorKind,
        stale_auth: bool,
        passes_used: u32,
        already_refreshed: bool,
    ) -> RetryDecision {
        match kind {
            ErrorKind::Validation | ErrorKind::Cancelled => return RetryDecision::Fail,
            _ if (stale_auth || kind == ErrorKind::Authentication) && !already_refreshed => {
                return RetryDecision::RetryWithRefresh;
            }
            _ => {}
        }

        let budget_left = passes_used < self.max_retries;
        match kind {
            ErrorKind::Network | ErrorKind::Server if budget_left => {
                RetryDecision::RetryWithBackoff(retry_delay(passes_used, self.backoff_base))
            }
            ErrorKind::Timeout if budget_left => RetryDecision::RetryImmediately,
            _ => RetryDecision::Fail,
        }
    }
}
