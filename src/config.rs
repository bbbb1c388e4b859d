use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// One rollout phase: the regions it publishes to, the settle delay before
/// verification, and the gateway success ratio required to advance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolloutPhase {
    pub regions: Vec<String>,
    #[serde(default = "default_phase_delay_secs")]
    pub delay_secs: u64,
    #[serde(default = "default_min_success_ratio")]
    pub min_success_ratio: f64,
}

fn default_phase_delay_secs() -> u64 {
    30
}

fn default_min_success_ratio() -> f64 {
    0.8
}

/// Replication fan-out and retry budgets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationConfig {
    /// Pinning services contacted per region.
    pub replication_factor_per_region: usize,
    /// Minimum successful providers per region.
    pub quorum_per_region: usize,
    /// Per-provider retry budget.
    pub upload_retry_attempts: u32,
    /// Base backoff delay, doubled per attempt.
    pub retry_base_delay_ms: u64,
    /// Consecutive failures before a provider's circuit opens.
    pub circuit_breaker_threshold: u32,
    /// Cooldown before an open circuit admits a half-open trial.
    pub circuit_breaker_cooldown_secs: u64,
    /// Per-upload deadline.
    pub upload_timeout_secs: u64,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            replication_factor_per_region: 3,
            quorum_per_region: 2,
            upload_retry_attempts: 3,
            retry_base_delay_ms: 250,
            circuit_breaker_threshold: 3,
            circuit_breaker_cooldown_secs: 60,
            upload_timeout_secs: 60,
        }
    }
}

/// Staged rollout schedule and verification sampling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RolloutConfig {
    pub phases: Vec<RolloutPhase>,
    /// Gateways sampled per region during phase verification.
    pub verification_sample_size: usize,
    /// Whether a failed phase triggers rollback (vs. abort in place).
    pub rollback_enabled: bool,
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self {
            phases: vec![
                RolloutPhase {
                    regions: vec!["americas".into()],
                    delay_secs: 30,
                    min_success_ratio: 0.8,
                },
                RolloutPhase {
                    regions: vec!["europe".into()],
                    delay_secs: 30,
                    min_success_ratio: 0.8,
                },
                RolloutPhase {
                    regions: vec!["asia_pacific".into()],
                    delay_secs: 30,
                    min_success_ratio: 0.8,
                },
            ],
            verification_sample_size: 3,
            rollback_enabled: true,
        }
    }
}

/// Availability monitor cadence and window sizes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Probe cadence in seconds.
    pub healthcheck_interval_secs: u64,
    /// Per-probe deadline.
    pub probe_timeout_secs: u64,
    /// Rolling outcome window per gateway.
    pub window_size: usize,
    /// Consecutive failures before a gateway is marked unavailable.
    pub failure_threshold: u32,
    /// Consecutive successes before it is re-marked available.
    pub recovery_threshold: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            healthcheck_interval_secs: 300,
            probe_timeout_secs: 10,
            window_size: 100,
            failure_threshold: 3,
            recovery_threshold: 2,
        }
    }
}

/// Fallback resolver caches and retry budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Success cache lifetime in seconds.
    pub cache_ttl_secs: u64,
    /// Failure cache lifetime in seconds.
    pub failure_window_secs: u64,
    /// Total sequential attempts across all tiers.
    pub max_attempts: u32,
    /// Base backoff between tier advances.
    pub backoff_base_ms: u64,
    /// Success cache capacity.
    pub cache_capacity: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 3600,
            failure_window_secs: 300,
            max_attempts: 8,
            backoff_base_ms: 200,
            cache_capacity: 4096,
        }
    }
}

/// Immutable configuration for one pipeline run. Constructed once and passed
/// by reference into every component.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Calendar-quarter snapshot tag, e.g. "2026Q3".
    pub snapshot_version: String,
    /// Semantic score below which a dataset is rejected.
    pub semantic_score_threshold: i32,
    /// Degrees of slack when testing bbox containment.
    pub bbox_tolerance_deg: f64,
    /// Douglas-Peucker epsilon in degrees.
    pub simplification_tolerance_deg: f64,
    /// Coordinate rounding digits.
    pub coordinate_precision_digits: u32,
    /// Acceptable deviation from reference counts.
    pub count_validator_tolerance: usize,
    pub replication: ReplicationConfig,
    pub rollout: RolloutConfig,
    pub monitor: MonitorConfig,
    pub resolver: ResolverConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            snapshot_version: "0000Q0".into(),
            semantic_score_threshold: 30,
            bbox_tolerance_deg: 0.1,
            simplification_tolerance_deg: 0.0001,
            coordinate_precision_digits: 6,
            count_validator_tolerance: 2,
            replication: ReplicationConfig::default(),
            rollout: RolloutConfig::default(),
            monitor: MonitorConfig::default(),
            resolver: ResolverConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Read config from a JSON file; missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;
        serde_json::from_slice(&bytes)
            .with_context(|| format!("failed to parse config: {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_stable() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.replication.replication_factor_per_region, 3);
        assert_eq!(cfg.replication.quorum_per_region, 2);
        assert_eq!(cfg.replication.upload_retry_attempts, 3);
        assert_eq!(cfg.replication.circuit_breaker_threshold, 3);
        assert_eq!(cfg.monitor.healthcheck_interval_secs, 300);
        assert_eq!(cfg.resolver.cache_ttl_secs, 3600);
        assert_eq!(cfg.resolver.failure_window_secs, 300);
        assert_eq!(cfg.simplification_tolerance_deg, 0.0001);
        assert_eq!(cfg.coordinate_precision_digits, 6);
        assert_eq!(cfg.count_validator_tolerance, 2);
        assert_eq!(cfg.semantic_score_threshold, 30);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: PipelineConfig =
            serde_json::from_str(r#"{"snapshot_version":"2026Q3"}"#).unwrap();
        assert_eq!(cfg.snapshot_version, "2026Q3");
        assert_eq!(cfg.replication.quorum_per_region, 2);
    }
}
