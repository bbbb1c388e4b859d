//! Active gateway health monitoring.
//!
//! Probes every known gateway on a fixed cadence with a bounded-timeout
//! request for a canary content address, maintains per-gateway rolling
//! windows, and answers SLA questions over closed time windows. Runs
//! independently of pipeline execution; readers of the health board see
//! eventually-consistent values.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::MonitorConfig;
use crate::gateway::{Gateway, GatewayClient, GatewayHealth};
use crate::snapshot::ContentAddress;

/// Shared read-mostly health state, keyed by gateway URL. The monitor is
/// the only writer; per-gateway records serialize under the lock so rolling
/// windows stay coherent.
pub type HealthBoard = Arc<RwLock<HashMap<String, GatewayHealth>>>;

/// Read-only view of one gateway's health.
#[derive(Debug, Clone, Serialize)]
pub struct GatewayHealthView {
    pub url: String,
    pub region: String,
    pub available: bool,
    pub success_rate: f64,
    pub consecutive_failures: u32,
    pub p50_ms: Option<f64>,
    pub p95_ms: Option<f64>,
    pub p99_ms: Option<f64>,
}

/// One probe outcome, retained for window-based SLA accounting.
#[derive(Debug, Clone)]
struct ProbeRecord {
    at: DateTime<Utc>,
    success: bool,
}

/// SLA check result over a closed window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlaReport {
    pub target: f64,
    pub observed: f64,
    pub probes: usize,
    pub met: bool,
}

pub struct AvailabilityMonitor {
    config: MonitorConfig,
    client: Arc<dyn GatewayClient>,
    gateways: Vec<Gateway>,
    canary: ContentAddress,
    board: HealthBoard,
    probes: Mutex<Vec<ProbeRecord>>,
}

impl AvailabilityMonitor {
    pub fn new(
        config: MonitorConfig,
        client: Arc<dyn GatewayClient>,
        gateways: Vec<Gateway>,
        canary: ContentAddress,
    ) -> Self {
        let board: HealthBoard = Arc::new(RwLock::new(
            gateways
                .iter()
                .map(|g| (g.url.clone(), GatewayHealth::new(config.window_size)))
                .collect(),
        ));
        Self { config, client, gateways, canary, board, probes: Mutex::new(Vec::new()) }
    }

    /// Shared handle for readers (the fallback resolver).
    pub fn board(&self) -> HealthBoard {
        Arc::clone(&self.board)
    }

    #[inline]
    pub fn gateways(&self) -> &[Gateway] {
        &self.gateways
    }

    /// Probe every gateway once. Returns how many probes succeeded.
    pub async fn probe_all(&self) -> usize {
        let timeout = std::time::Duration::from_secs(self.config.probe_timeout_secs);
        let mut successes = 0usize;
        for gateway in &self.gateways {
            let started = Instant::now();
            let outcome =
                tokio::time::timeout(timeout, self.client.probe(&gateway.url, &self.canary)).await;
            let success = matches!(outcome, Ok(Ok(())));
            let latency_ms = success.then(|| started.elapsed().as_secs_f64() * 1000.0);

            {
                let mut board = self.board.write();
                let health = board
                    .entry(gateway.url.clone())
                    .or_insert_with(|| GatewayHealth::new(self.config.window_size));
                health.record(
                    success,
                    latency_ms,
                    self.config.failure_threshold,
                    self.config.recovery_threshold,
                );
            }
            self.probes.lock().push(ProbeRecord { at: Utc::now(), success });
            if success {
                successes += 1;
            } else {
                debug!(gateway = %gateway.url, "probe failed");
            }
        }
        successes
    }

    /// Periodic probe loop. Runs until the task is aborted.
    pub async fn run(&self) {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(
            self.config.healthcheck_interval_secs,
        ));
        loop {
            interval.tick().await;
            let successes = self.probe_all().await;
            info!(successes, gateways = self.gateways.len(), "probe round complete");
        }
    }

    /// Current health views, one per gateway.
    pub fn health_snapshot(&self) -> Vec<GatewayHealthView> {
        let board = self.board.read();
        self.gateways
            .iter()
            .filter_map(|gateway| {
                board.get(&gateway.url).map(|health| GatewayHealthView {
                    url: gateway.url.clone(),
                    region: gateway.region.clone(),
                    available: health.available,
                    success_rate: health.success_rate(),
                    consecutive_failures: health.consecutive_failures,
                    p50_ms: health.p50(),
                    p95_ms: health.p95(),
                    p99_ms: health.p99(),
                })
            })
            .collect()
    }

    /// Global availability over a closed window: successful probes divided
    /// by total probes in the window. 1.0 when no probes landed in it.
    pub fn global_availability(&self, window: Duration) -> f64 {
        let cutoff = Utc::now() - window;
        let probes = self.probes.lock();
        let in_window: Vec<&ProbeRecord> = probes.iter().filter(|p| p.at >= cutoff).collect();
        if in_window.is_empty() {
            return 1.0;
        }
        in_window.iter().filter(|p| p.success).count() as f64 / in_window.len() as f64
    }

    /// SLA check: does observed availability over the window meet the
    /// target? Never fatal to the pipeline; may gate future rollouts.
    pub fn sla_check(&self, target: f64, window: Duration) -> SlaReport {
        let cutoff = Utc::now() - window;
        let probes = self.probes.lock();
        let in_window: Vec<&ProbeRecord> = probes.iter().filter(|p| p.at >= cutoff).collect();
        let observed = if in_window.is_empty() {
            1.0
        } else {
            in_window.iter().filter(|p| p.success).count() as f64 / in_window.len() as f64
        };
        SlaReport { target, observed, probes: in_window.len(), met: observed >= target }
    }
}
