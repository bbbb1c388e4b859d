//! Gateways and the client seam used by the availability monitor, the
//! rollout verifier, and the fallback resolver.

use std::collections::VecDeque;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::snapshot::ContentAddress;

/// A content gateway: where to fetch, which region it serves, and which
/// pinning service backs it (when known).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gateway {
    pub url: String,
    pub region: String,
    pub pinning_service_id: Option<String>,
}

/// Mutable health state for one gateway: rolling outcome and latency
/// windows plus the consecutive-failure availability flag.
#[derive(Debug, Clone)]
pub struct GatewayHealth {
    window: usize,
    outcomes: VecDeque<bool>,
    latencies_ms: VecDeque<f64>,
    pub available: bool,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub last_check: Option<DateTime<Utc>>,
}

impl GatewayHealth {
    pub fn new(window: usize) -> Self {
        Self {
            window,
            outcomes: VecDeque::with_capacity(window),
            latencies_ms: VecDeque::with_capacity(window),
            available: true,
            consecutive_failures: 0,
            consecutive_successes: 0,
            last_check: None,
        }
    }

    /// Record one probe or request outcome. Availability flips down after
    /// `failure_threshold` consecutive failures and back up after
    /// `recovery_threshold` consecutive successes.
    pub fn record(
        &mut self,
        success: bool,
        latency_ms: Option<f64>,
        failure_threshold: u32,
        recovery_threshold: u32,
    ) {
        if self.outcomes.len() == self.window {
            self.outcomes.pop_front();
        }
        self.outcomes.push_back(success);
        if let Some(latency) = latency_ms {
            if self.latencies_ms.len() == self.window {
                self.latencies_ms.pop_front();
            }
            self.latencies_ms.push_back(latency);
        }
        self.last_check = Some(Utc::now());

        if success {
            self.consecutive_failures = 0;
            self.consecutive_successes += 1;
            if !self.available && self.consecutive_successes >= recovery_threshold {
                self.available = true;
            }
        } else {
            self.consecutive_successes = 0;
            self.consecutive_failures += 1;
            if self.available && self.consecutive_failures >= failure_threshold {
                self.available = false;
            }
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.outcomes.is_empty() {
            return 1.0;
        }
        self.outcomes.iter().filter(|s| **s).count() as f64 / self.outcomes.len() as f64
    }

    /// Latency percentile over the rolling window (nearest-rank).
    pub fn latency_percentile(&self, percentile: f64) -> Option<f64> {
        if self.latencies_ms.is_empty() {
            return None;
        }
        let mut sorted: Vec<f64> = self.latencies_ms.iter().copied().collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let rank = ((percentile / 100.0) * sorted.len() as f64).ceil() as usize;
        Some(sorted[rank.clamp(1, sorted.len()) - 1])
    }

    #[inline]
    pub fn p50(&self) -> Option<f64> {
        self.latency_percentile(50.0)
    }

    #[inline]
    pub fn p95(&self) -> Option<f64> {
        self.latency_percentile(95.0)
    }

    #[inline]
    pub fn p99(&self) -> Option<f64> {
        self.latency_percentile(99.0)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("gateway timeout")]
    Timeout,
    #[error("gateway returned HTTP {0}")]
    Http(u16),
    #[error("network error: {0}")]
    Network(String),
    /// Bytes fetched but their hash does not match the content address.
    #[error("content mismatch for {0}")]
    ContentMismatch(String),
}

/// Transport seam: probe and fetch a content address through one gateway.
#[async_trait]
pub trait GatewayClient: Send + Sync {
    /// Bounded-timeout HEAD-style probe.
    async fn probe(&self, gateway_url: &str, cid: &ContentAddress) -> Result<(), GatewayError>;

    /// Fetch the content bytes. Implementations must verify the returned
    /// bytes against the address.
    async fn fetch(&self, gateway_url: &str, cid: &ContentAddress)
        -> Result<Vec<u8>, GatewayError>;
}

/// HTTP gateway client: `GET/HEAD {gateway}/ipfs/{cid}`.
#[cfg(feature = "net")]
pub struct HttpGatewayClient {
    client: reqwest::Client,
}

#[cfg(feature = "net")]
impl HttpGatewayClient {
    pub fn new(timeout: std::time::Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    fn content_url(gateway_url: &str, cid: &ContentAddress) -> String {
        format!("{}/ipfs/{}", gateway_url.trim_end_matches('/'), cid)
    }

    fn map_error(e: reqwest::Error) -> GatewayError {
        if e.is_timeout() {
            GatewayError::Timeout
        } else {
            GatewayError::Network(e.to_string())
        }
    }
}

#[cfg(feature = "net")]
#[async_trait]
impl GatewayClient for HttpGatewayClient {
    async fn probe(&self, gateway_url: &str, cid: &ContentAddress) -> Result<(), GatewayError> {
        let response = self
            .client
            .head(Self::content_url(gateway_url, cid))
            .send()
            .await
            .map_err(Self::map_error)?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(GatewayError::Http(response.status().as_u16()))
        }
    }

    async fn fetch(
        &self,
        gateway_url: &str,
        cid: &ContentAddress,
    ) -> Result<Vec<u8>, GatewayError> {
        let response = self
            .client
            .get(Self::content_url(gateway_url, cid))
            .send()
            .await
            .map_err(Self::map_error)?;
        if !response.status().is_success() {
            return Err(GatewayError::Http(response.status().as_u16()));
        }
        let bytes = response.bytes().await.map_err(Self::map_error)?.to_vec();
        if !cid.matches(&bytes) {
            return Err(GatewayError::ContentMismatch(cid.to_string()));
        }
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn availability_flips_on_thresholds() {
        let mut health = GatewayHealth::new(10);
        assert!(health.available);
        health.record(false, None, 3, 2);
        health.record(false, None, 3, 2);
        assert!(health.available);
        health.record(false, None, 3, 2);
        assert!(!health.available);
        health.record(true, Some(40.0), 3, 2);
        assert!(!health.available);
        health.record(true, Some(42.0), 3, 2);
        assert!(health.available);
    }

    #[test]
    fn window_bounds_success_rate() {
        let mut health = GatewayHealth::new(4);
        for _ in 0..4 {
            health.record(false, None, 100, 2);
        }
        assert_eq!(health.success_rate(), 0.0);
        for _ in 0..4 {
            health.record(true, Some(10.0), 100, 2);
        }
        // Window of 4: failures have rolled out.
        assert_eq!(health.success_rate(), 1.0);
    }

    #[test]
    fn percentiles_nearest_rank() {
        let mut health = GatewayHealth::new(100);
        for latency in [10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0, 90.0, 100.0] {
            health.record(true, Some(latency), 3, 2);
        }
        assert_eq!(health.p50(), Some(50.0));
        assert_eq!(health.p95(), Some(100.0));
        assert_eq!(health.latency_percentile(10.0), Some(10.0));
    }
}
