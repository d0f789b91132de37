use chain_core::RpcError;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// How a failed attempt should be treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// HTTP 429 from the node - back off the longest
    RateLimited,
    /// 5xx or connection failure
    Unavailable,
    /// The attempt exceeded its deadline
    TimedOut,
    /// Anything a retry cannot fix (bad params, not found, decode errors)
    Fatal,
}

/// Backoff schedule per failure class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub rate_limit_delays_ms: Vec<u64>,
    pub unavailable_delays_ms: Vec<u64>,
    pub timeout_delays_ms: Vec<u64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            rate_limit_delays_ms: vec![500, 1000, 2000],
            unavailable_delays_ms: vec![250, 500, 1000],
            timeout_delays_ms: vec![250, 500],
        }
    }
}

impl RetryConfig {
    /// Single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            rate_limit_delays_ms: Vec::new(),
            unavailable_delays_ms: Vec::new(),
            timeout_delays_ms: Vec::new(),
        }
    }

    /// Delay before retry number `retry` (0-based), or None to give up
    fn delay_for(&self, retry: u32, class: RetryClass) -> Option<Duration> {
        let delays = match class {
            RetryClass::RateLimited => &self.rate_limit_delays_ms,
            RetryClass::Unavailable => &self.unavailable_delays_ms,
            RetryClass::TimedOut => &self.timeout_delays_ms,
            RetryClass::Fatal => return None,
        };
        // Past the end of a schedule, keep using its last step
        delays
            .get(retry as usize)
            .or_else(|| delays.last())
            .map(|&ms| Duration::from_millis(ms))
    }
}

/// Map a JSON-RPC transport failure onto a backoff schedule
pub fn classify_rpc_error(err: &RpcError) -> RetryClass {
    match err {
        RpcError::Http { status: 429 } => RetryClass::RateLimited,
        RpcError::Http { status } if *status >= 500 => RetryClass::Unavailable,
        RpcError::Transport(_) => RetryClass::Unavailable,
        RpcError::Timeout { .. } => RetryClass::TimedOut,
        _ => RetryClass::Fatal,
    }
}

/// Run `operation` until it succeeds, fails fatally, or retries run out.
///
/// `label` identifies the operation in logs (e.g. `eth_getTransactionByHash 0xabc..`).
pub async fn retry_with_backoff<F, Fut, T, E>(
    label: &str,
    config: &RetryConfig,
    mut operation: F,
    classify: impl Fn(&E) -> RetryClass,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut retry = 0u32;

    loop {
        match operation().await {
            Ok(value) => {
                if retry > 0 {
                    debug!("[{}] succeeded after {} retries", label, retry);
                }
                return Ok(value);
            }
            Err(err) => {
                let class = classify(&err);
                if class == RetryClass::Fatal {
                    debug!("[{}] non-retryable failure: {}", label, err);
                    return Err(err);
                }
                if retry >= config.max_retries {
                    warn!("[{}] giving up after {} attempts: {}", label, retry + 1, err);
                    return Err(err);
                }
                let Some(delay) = config.delay_for(retry, class) else {
                    warn!("[{}] no backoff configured for {:?}: {}", label, class, err);
                    return Err(err);
                };

                warn!(
                    "[{}] attempt {}/{} failed ({:?}): {} - retrying in {}ms",
                    label,
                    retry + 1,
                    config.max_retries + 1,
                    class,
                    err,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
                retry += 1;
            }
        }
    }
}
