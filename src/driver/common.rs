//! Polling utilities shared by the driver and the page agent
//!
//! Every wait in this crate is bounded: a poll either produces a value within
//! its budget or collapses to a caller-supplied fallback. Nothing throws on
//! timeout.

use std::future::Future;
use std::time::{Duration, Instant};

/// Configuration for polling operations
#[derive(Clone)]
pub struct PollConfig {
    pub timeout: Duration,
    pub interval: Duration,
}

impl PollConfig {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(10_000),
            interval: Duration::from_millis(250),
        }
    }
}

/// Calls `check_fn` repeatedly until it returns `true` or the budget runs out.
///
/// Returns `true` if the condition was met, `false` on timeout. The check is
/// always attempted at least once, even with a zero budget.
pub async fn wait_until<F, Fut>(check_fn: F, config: &PollConfig) -> bool
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = Instant::now();
    loop {
        if check_fn().await {
            return true;
        }
        if start.elapsed() >= config.timeout {
            return false;
        }
        tokio::time::sleep(config.interval).await;
    }
}

/// Calls `probe_fn` repeatedly until it yields a value or the budget runs out.
///
/// Errors from individual probes are swallowed; a flaky tick is
/// indistinguishable from a not-ready one. Returns `None` on exhaustion so
/// callers can substitute their sentinel.
pub async fn poll_value<T, F, Fut>(probe_fn: F, config: &PollConfig) -> Option<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = anyhow::Result<Option<T>>>,
{
    let start = Instant::now();
    loop {
        match probe_fn().await {
            Ok(Some(value)) => return Some(value),
            Ok(None) => {}
            Err(e) => log::debug!("poll probe error (retrying): {e:#}"),
        }
        if start.elapsed() >= config.timeout {
            return None;
        }
        tokio::time::sleep(config.interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn wait_until_succeeds_before_timeout() {
        let calls = AtomicU32::new(0);
        let config = PollConfig::new(Duration::from_millis(500), Duration::from_millis(1));
        let ok = wait_until(
            || async { calls.fetch_add(1, Ordering::SeqCst) >= 2 },
            &config,
        )
        .await;
        assert!(ok);
        assert!(calls.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    async fn wait_until_times_out() {
        let config = PollConfig::new(Duration::from_millis(20), Duration::from_millis(5));
        let ok = wait_until(|| async { false }, &config).await;
        assert!(!ok);
    }

    #[tokio::test]
    async fn poll_value_returns_none_on_exhaustion() {
        let config = PollConfig::new(Duration::from_millis(20), Duration::from_millis(5));
        let got: Option<String> = poll_value(|| async { Ok(None) }, &config).await;
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn poll_value_survives_probe_errors() {
        let calls = AtomicU32::new(0);
        let config = PollConfig::new(Duration::from_millis(500), Duration::from_millis(1));
        let got = poll_value(
            || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    anyhow::bail!("transient");
                }
                Ok(Some("token".to_string()))
            },
            &config,
        )
        .await;
        assert_eq!(got.as_deref(), Some("token"));
    }
}
