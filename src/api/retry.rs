//! Bounded retry with backoff and credential refresh
//!
//! Every remote call in the crawler is wrapped by [`with_retry`]. Only two
//! error classes are transient: a rate limit (HTTP 412), which is retried
//! with exponential backoff against a bounded attempt budget, and a
//! credential expiry (code -352), which triggers at most one refresh and an
//! immediate retry that does not consume the budget. Everything else is
//! treated as permanent and aborts the call.

use std::future::Future;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::api::BiliClient;
use crate::Result;

/// Retry policy applied to one remote call site.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts against a rate-limited endpoint
    pub max_retries: u32,
    /// Backoff before the second attempt; doubles on every further one
    pub initial_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_wait: Duration::from_secs(3),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_wait: Duration) -> Self {
        Self {
            max_retries,
            initial_wait,
        }
    }
}

/// Transient per-call state: remaining attempts and the current backoff.
struct RetryState {
    attempts_left: u32,
    wait: Duration,
}

impl RetryState {
    fn new(policy: &RetryPolicy) -> Self {
        Self {
            attempts_left: policy.max_retries,
            wait: policy.initial_wait,
        }
    }

    /// Consumes one attempt and returns the wait to apply before the next,
    /// doubling the interval for the one after.
    fn backoff(&mut self) -> Duration {
        let wait = self.wait;
        self.wait = self.wait.saturating_mul(2);
        self.attempts_left = self.attempts_left.saturating_sub(1);
        wait
    }
}

/// Executes a remote operation with bounded retry.
///
/// Returns the operation's value, or `None` once the retry budget is
/// exhausted, the refresh fails, or a permanent error occurs. Callers treat
/// `None` as "no data" and move on; the pagination layer treats it as
/// end-of-stream.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    client: &BiliClient,
    operation: &str,
    op: F,
) -> Option<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut state = RetryState::new(policy);
    let mut refreshed = false;

    loop {
        match op().await {
            Ok(value) => return Some(value),

            Err(e) if e.is_credential_expired() => {
                if refreshed {
                    error!(operation, "credential expired again after a refresh, aborting");
                    return None;
                }
                warn!(operation, "credential expired (-352), refreshing");
                match client.refresh_credential().await {
                    Ok(()) => {
                        info!(operation, "credential refreshed, retrying request");
                        refreshed = true;
                    }
                    Err(refresh_error) => {
                        error!(
                            operation,
                            error = %refresh_error,
                            "failed to refresh credential, aborting"
                        );
                        return None;
                    }
                }
            }

            Err(e) if e.is_rate_limited() => {
                let wait = state.backoff();
                if state.attempts_left == 0 {
                    error!(
                        operation,
                        attempts = policy.max_retries,
                        "retry budget exhausted"
                    );
                    return None;
                }
                warn!(
                    operation,
                    wait_secs = wait.as_secs_f64(),
                    attempts_left = state.attempts_left,
                    "rate-limited (412), backing off"
                );
                tokio::time::sleep(wait).await;
            }

            Err(e) => {
                error!(operation, error = %e, "unexpected API error, aborting");
                return None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiConfig;
    use crate::credential::CredentialStore;
    use crate::HarvestError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn test_client() -> BiliClient {
        let config = ApiConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            ..ApiConfig::default()
        };
        BiliClient::new(&config, Arc::new(CredentialStore::anonymous())).unwrap()
    }

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(max_retries, Duration::from_millis(10))
    }

    #[test]
    fn test_backoff_doubles_from_initial_wait() {
        let policy = RetryPolicy::new(5, Duration::from_secs(3));
        let mut state = RetryState::new(&policy);

        assert_eq!(state.backoff(), Duration::from_secs(3));
        assert_eq!(state.backoff(), Duration::from_secs(6));
        assert_eq!(state.backoff(), Duration::from_secs(12));
        assert_eq!(state.backoff(), Duration::from_secs(24));
        assert_eq!(state.attempts_left, 1);
    }

    #[tokio::test]
    async fn test_success_returns_immediately() {
        let client = test_client();
        let calls = AtomicU32::new(0);

        let result = with_retry(&fast_policy(5), &client, "op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, HarvestError>(7) }
        })
        .await;

        assert_eq!(result, Some(7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_exhausts_exactly_max_retries() {
        let client = test_client();
        let calls = AtomicU32::new(0);

        let result: Option<()> = with_retry(&fast_policy(3), &client, "op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(HarvestError::RateLimited) }
        })
        .await;

        assert_eq!(result, None);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_rate_limit_then_success_consumes_budget() {
        let client = test_client();
        let calls = AtomicU32::new(0);

        let result = with_retry(&fast_policy(5), &client, "op", || {
            let attempt = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 2 {
                    Err(HarvestError::RateLimited)
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(result, Some(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_aborts_without_retry() {
        let client = test_client();
        let calls = AtomicU32::new(0);

        let result: Option<()> = with_retry(&fast_policy(5), &client, "op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(HarvestError::Api {
                    code: -404,
                    message: "not found".to_string(),
                })
            }
        })
        .await;

        assert_eq!(result, None);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expiry_without_refresh_token_is_terminal() {
        // Anonymous store: the refresh is impossible, so a single -352 ends
        // the call without consuming retry budget on backoff.
        let client = test_client();
        let calls = AtomicU32::new(0);

        let result: Option<()> = with_retry(&fast_policy(5), &client, "op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(HarvestError::CredentialExpired) }
        })
        .await;

        assert_eq!(result, None);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
