pub mod probe;
pub mod render;
pub mod serve;
pub mod snapshot;
pub mod start;

use std::future::Future;
use std::time::Duration;

use log::warn;
use tokio::runtime::Runtime;
use workflow_metrics_core::MetricsSeries;
use workflow_metrics_server::{FetchError, MetricsClient};

/// Where `start`/`serve` listen by default.
pub const DEFAULT_URL: &str = "http://localhost:7777";

/// Attempt count and exponential delay between snapshot fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub initial: Duration,
    pub max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial: Duration::from_millis(500),
            max: Duration::from_secs(4),
        }
    }
}

impl RetryPolicy {
    /// Delay after failed attempt `attempt` (1-based): initial, 2x, 4x ... capped at `max`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial.saturating_mul(factor).min(self.max)
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy runs out of attempts.
pub async fn retry_fetch<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < attempts => {
                let delay = policy.delay(attempt);
                warn!("attempt {attempt}/{attempts} failed: {e}; retrying in {delay:?}");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Fetch a snapshot from `url` with the default retry policy.
pub async fn fetch_snapshot(url: &str, timeout_sec: u64) -> Result<MetricsSeries, FetchError> {
    let client = MetricsClient::new(url, Duration::from_secs(timeout_sec))?;
    retry_fetch(&RetryPolicy::default(), || client.fetch()).await
}

/// Tokio runtime for a command, or exit with an error.
pub fn runtime() -> Runtime {
    match Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to start async runtime: {e}");
            std::process::exit(1);
        }
    }
}
