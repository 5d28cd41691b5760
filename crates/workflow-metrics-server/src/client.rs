//! Client side of the snapshot endpoint.

use std::time::Duration;

use log::debug;
use thiserror::Error;

use workflow_metrics_core::{MetricsSeries, SnapshotError, parse_snapshot};

use crate::METRICS_PATH;

/// Request budget used when the caller passes a zero timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Why a snapshot could not be fetched.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("timed out after {0:?} fetching metrics")]
    Timeout(Duration),

    #[error("network error fetching metrics: {0}")]
    Network(#[source] reqwest::Error),

    #[error("failed to fetch metrics: {status} {reason}")]
    Status { status: u16, reason: String },

    #[error("invalid metrics snapshot: {0}")]
    Snapshot(#[from] SnapshotError),
}

impl FetchError {
    /// Timeouts, transport failures and 5xx responses may succeed on retry.
    /// Client errors and undecodable bodies will not.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Timeout(_) | FetchError::Network(_) => true,
            FetchError::Status { status, .. } => *status >= 500,
            FetchError::Snapshot(_) => false,
        }
    }
}

/// Fetches [`MetricsSeries`] snapshots from a running sampler.
pub struct MetricsClient {
    http: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl MetricsClient {
    /// Client for the sampler at `base_url`, e.g. `http://localhost:7777`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, FetchError> {
        let timeout = if timeout.is_zero() {
            DEFAULT_TIMEOUT
        } else {
            timeout
        };

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(FetchError::Network)?;

        Ok(Self {
            http,
            url: format!("{}{}", base_url.trim_end_matches('/'), METRICS_PATH),
            timeout,
        })
    }

    /// Full URL of the snapshot endpoint.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// GET the snapshot and decode it.
    ///
    /// The whole exchange, body included, is bounded by the client timeout.
    pub async fn fetch(&self) -> Result<MetricsSeries, FetchError> {
        match tokio::time::timeout(self.timeout, self.fetch_body()).await {
            Ok(body) => {
                let body = body?;
                debug!("fetched {} bytes from {}", body.len(), self.url);
                Ok(parse_snapshot(&body)?)
            }
            Err(_) => Err(FetchError::Timeout(self.timeout)),
        }
    }

    async fn fetch_body(&self) -> Result<String, FetchError> {
        let response = self
            .http
            .get(&self.url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or_default().to_string(),
            });
        }

        response.text().await.map_err(|e| self.classify(e))
    }

    fn classify(&self, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else {
            FetchError::Network(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_base_and_path() {
        let c = MetricsClient::new("http://localhost:7777/", Duration::from_secs(1)).unwrap();
        assert_eq!(c.url(), "http://localhost:7777/metrics");
        let c = MetricsClient::new("http://127.0.0.1:9000", Duration::from_secs(1)).unwrap();
        assert_eq!(c.url(), "http://127.0.0.1:9000/metrics");
    }

    #[test]
    fn test_zero_timeout_uses_default() {
        let c = MetricsClient::new("http://localhost:7777", Duration::ZERO).unwrap();
        assert_eq!(c.timeout(), DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_retryable_classification() {
        assert!(FetchError::Timeout(DEFAULT_TIMEOUT).is_retryable());
        let server = FetchError::Status {
            status: 503,
            reason: "Service Unavailable".into(),
        };
        assert!(server.is_retryable());
        let missing = FetchError::Status {
            status: 404,
            reason: "Not Found".into(),
        };
        assert!(!missing.is_retryable());
        let bad = FetchError::from(parse_snapshot("{").unwrap_err());
        assert!(!bad.is_retryable());
    }

    #[test]
    fn test_status_error_message() {
        let err = FetchError::Status {
            status: 500,
            reason: "Internal Server Error".into(),
        };
        assert_eq!(
            err.to_string(),
            "failed to fetch metrics: 500 Internal Server Error"
        );
    }
}
