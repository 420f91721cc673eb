//! External seams: price feed and execution gateway, plus the bounded
//! retry policy every call to them goes through.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, warn};

use crate::config::ExecutionConfig;
use crate::domain::{OrderAck, OrderRequest};
use crate::error::{DeployError, Result};

fn unsupported(feature: &str, source: &str) -> DeployError {
    DeployError::Validation(format!("{} is not implemented by '{}'", feature, source))
}

/// Live price source
#[async_trait]
pub trait PriceFeed: Send + Sync {
    fn name(&self) -> &str;

    async fn get_last_price(&self, symbol: &str) -> Result<Decimal>;

    /// Previous session close, used as the dip reference.
    async fn previous_close(&self, _symbol: &str) -> Result<Decimal> {
        Err(unsupported("previous_close", self.name()))
    }
}

/// Broker order entry
#[async_trait]
pub trait ExecutionGateway: Send + Sync {
    fn name(&self) -> &str;

    async fn place_order(&self, request: &OrderRequest) -> Result<OrderAck>;

    async fn margin_available(&self, symbol: &str) -> Result<bool>;

    async fn cancel_order(&self, order_id: &str) -> Result<()>;

    /// Account equity as reported by the broker.
    async fn account_equity(&self) -> Result<Decimal> {
        Err(unsupported("account_equity", self.name()))
    }
}

/// Per-call timeout, capped attempts and exponential backoff
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub timeout: Duration,
    /// First attempt plus retries
    pub max_attempts: u32,
    pub backoff_base: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ExecutionConfig) -> Self {
        Self {
            timeout: config.timeout(),
            max_attempts: config.max_retries.saturating_add(1),
            backoff_base: Duration::from_millis(config.backoff_base_ms),
        }
    }

    /// Delay after the failed attempt with zero-based index `retry`.
    pub fn backoff(&self, retry: u32) -> Duration {
        self.backoff_base.saturating_mul(1u32 << retry.min(16))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ExecutionConfig::default())
    }
}

/// All attempts failed
#[derive(Debug)]
pub struct RetryExhausted {
    pub attempts: u32,
    pub last_error: DeployError,
}

/// Run `op` until it succeeds or the policy gives up.
///
/// Each attempt is bounded by `policy.timeout`; a timed-out attempt counts
/// as a failure. Errors that are not retryable end the loop at once.
pub async fn execute_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    what: &str,
    mut op: F,
) -> std::result::Result<T, RetryExhausted>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let outcome = match timeout(policy.timeout, op(attempt)).await {
            Ok(result) => result,
            Err(_) => Err(DeployError::Timeout(format!(
                "{} exceeded {}ms",
                what,
                policy.timeout.as_millis()
            ))),
        };

        match outcome {
            Ok(value) => {
                if attempt > 1 {
                    debug!(what, attempt, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) => {
                if attempt >= policy.max_attempts || !e.is_retryable() {
                    error!(what, attempts = attempt, error = %e, "Giving up");
                    return Err(RetryExhausted {
                        attempts: attempt,
                        last_error: e,
                    });
                }
                let delay = policy.backoff(attempt - 1);
                warn!(
                    what,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Attempt failed, retrying"
                );
                sleep(delay).await;
            }
        }
    }
}

/// Last price with retries. Exhaustion maps to `FeedUnavailable`.
pub async fn last_price(feed: &dyn PriceFeed, symbol: &str, policy: &RetryPolicy) -> Result<Decimal> {
    execute_with_retry(policy, "get_last_price", |_| feed.get_last_price(symbol))
        .await
        .map_err(|e| DeployError::FeedUnavailable {
            symbol: symbol.to_string(),
            reason: format!("{} after {} attempts", e.last_error, e.attempts),
        })
}

/// Place an order with retries. Exhaustion maps to `ExecutionFailure`.
///
/// A timed-out attempt may still have reached the venue, so it is
/// cancelled by client order id before the next attempt.
pub async fn place_order(
    gateway: &dyn ExecutionGateway,
    request: &OrderRequest,
    policy: &RetryPolicy,
) -> Result<OrderAck> {
    let result = execute_with_retry(policy, "place_order", |attempt| async move {
        if attempt > 1 {
            if let Err(e) = gateway.cancel_order(&request.client_order_id).await {
                debug!(client_order_id = %request.client_order_id, error = %e, "Pre-retry cancel failed");
            }
        }
        gateway.place_order(request).await
    })
    .await;

    result.map_err(|e| DeployError::ExecutionFailure {
        symbol: request.symbol.clone(),
        attempts: e.attempts,
        reason: e.last_error.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_millis(50),
            max_attempts,
            backoff_base: Duration::from_millis(1),
        }
    }

    #[test]
    fn three_retries_mean_four_attempts() {
        let policy = RetryPolicy::from_config(&ExecutionConfig::default());
        assert_eq!(policy.max_attempts, 4);
    }

    #[test]
    fn backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(400));
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result = execute_with_retry(&fast_policy(3), "flaky", move |_| {
            let c = c.clone();
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(DeployError::Timeout("slow venue".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let result: std::result::Result<(), _> =
            execute_with_retry(&fast_policy(3), "always", |_| async {
                Err(DeployError::FeedUnavailable {
                    symbol: "NIFTYBEES".into(),
                    reason: "down".into(),
                })
            })
            .await;
        let err = result.unwrap_err();
        assert_eq!(err.attempts, 3);
    }

    #[tokio::test]
    async fn slow_attempt_times_out() {
        let result: std::result::Result<(), _> =
            execute_with_retry(&fast_policy(1), "slow", |_| async {
                sleep(Duration::from_millis(500)).await;
                Ok(())
            })
            .await;
        assert!(matches!(
            result.unwrap_err().last_error,
            DeployError::Timeout(_)
        ));
    }

    #[tokio::test]
    async fn fatal_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: std::result::Result<(), _> =
            execute_with_retry(&fast_policy(3), "fatal", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(DeployError::InvariantViolation("x".into())) }
            })
            .await;
        assert_eq!(result.unwrap_err().attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn permanent_rejection_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: std::result::Result<(), _> =
            execute_with_retry(&fast_policy(4), "rejected", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(DeployError::Validation("lot size".into())) }
            })
            .await;
        let err = result.unwrap_err();
        assert_eq!(err.attempts, 1);
        assert!(matches!(err.last_error, DeployError::Validation(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
