//! Retry with exponential backoff
//!
//! Read-only calls retry every transient failure. Writes retry only a
//! refused connection, where nothing was sent, so a commit is never applied
//! twice.
//! Every wait races the cancellation token.

use std::future::Future;
use std::time::Duration;

use graphsync_core::config::RemoteConfig;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::RemoteError;

/// Whether a request may safely be repeated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// No server-side effect; retry any transient failure
    ReadOnly,
    /// Has server-side effects; retry only unprocessed requests
    Write,
}

/// Bounded exponential backoff
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RemoteConfig::default())
    }
}

impl From<&RemoteConfig> for RetryPolicy {
    fn from(cfg: &RemoteConfig) -> Self {
        Self {
            max_retries: cfg.max_retries,
            base_delay: Duration::from_millis(cfg.base_delay_ms),
            max_delay: Duration::from_millis(cfg.max_delay_ms),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based): `base * 2^attempt`, capped
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    fn should_retry(&self, class: RetryClass, err: &RemoteError) -> bool {
        match class {
            RetryClass::ReadOnly => err.is_transient(),
            RetryClass::Write => err.is_unprocessed(),
        }
    }

    fn delay_for(&self, attempt: u32, err: &RemoteError) -> Duration {
        match err {
            RemoteError::TooManyRequests { retry_after } => (*retry_after).min(self.max_delay),
            _ => self.backoff(attempt),
        }
    }
}

/// Run `f` until it succeeds, fails permanently, exhausts the policy or is cancelled
///
/// # Errors
/// The last error from `f`, or `RemoteError::Cancelled`
pub async fn with_retry<F, Fut, T>(
    policy: &RetryPolicy,
    operation: &str,
    class: RetryClass,
    cancel: &CancellationToken,
    mut f: F,
) -> Result<T, RemoteError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RemoteError>>,
{
    let mut attempt = 0u32;
    loop {
        if cancel.is_cancelled() {
            return Err(RemoteError::Cancelled);
        }

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RemoteError::Cancelled),
            r = f() => r,
        };

        match result {
            Ok(value) => {
                if attempt > 0 {
                    info!(operation, attempt, "Request succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if attempt < policy.max_retries && policy.should_retry(class, &err) => {
                let delay = policy.delay_for(attempt, &err);
                warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient error, retrying"
                );
                tokio::select! {
                    _ = cancel.cancelled() => return Err(RemoteError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Parse the `Retry-After` header value
///
/// Accepts integer seconds or an HTTP date. Falls back to `default`.
pub fn parse_retry_after(value: &str, default: Duration) -> Duration {
    if let Ok(seconds) = value.trim().parse::<u64>() {
        return Duration::from_secs(seconds);
    }

    if let Ok(date) = chrono::DateTime::parse_from_rfc2822(value.trim()) {
        let now = chrono::Utc::now();
        let target = date.with_timezone(&chrono::Utc);
        if target > now {
            if let Some(secs) = (target - now)
                .num_seconds()
                .try_into()
                .ok()
                .filter(|&s: &u64| s <= 3600)
            {
                return Duration::from_secs(secs);
            }
        }
    }

    warn!(value, "Could not parse Retry-After header, using default");
    default
}
