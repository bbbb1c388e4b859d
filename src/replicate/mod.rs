//! Regional replication: publish each artifact to multiple independent
//! pinning providers per region, with retries, per-provider circuit
//! breaking, and a quorum policy over matching content addresses.

mod circuit;

pub use circuit::{CircuitBreaker, CircuitState};

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::config::ReplicationConfig;
use crate::snapshot::ContentAddress;

/// Static metadata a provider declares about itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderMetadata {
    pub id: String,
    pub supported_regions: Vec<String>,
    pub per_gb_cost: f64,
    pub free_tier_gb: f64,
}

/// A durable replica confirmed by one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaDescriptor {
    pub provider_id: String,
    pub region: String,
    pub content_address: ContentAddress,
    pub bytes: usize,
}

/// Pin status as reported by a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PinStatus {
    pub pinned: bool,
    pub replicas: u32,
    pub last_seen: Option<DateTime<Utc>>,
}

/// Provider failure taxonomy. The retry and circuit policies dispatch on
/// the kind, so it is typed rather than stringly.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// Retryable with backoff.
    #[error("network timeout")]
    Timeout,
    /// Fatal for this provider; do not retry.
    #[error("authentication failed")]
    Authentication,
    /// Fatal for this provider and trips its circuit immediately.
    #[error("quota exceeded")]
    QuotaExceeded,
    /// Fatal for the whole run: the artifact itself was refused.
    #[error("content rejected: {0}")]
    ContentRejected(String),
    /// Retried once, then fatal for this provider.
    #[error("unknown provider error: {0}")]
    Unknown(String),
}

impl ProviderError {
    fn retry_budget(&self, configured: u32) -> u32 {
        match self {
            ProviderError::Timeout => configured,
            ProviderError::Unknown(_) => 1,
            _ => 0,
        }
    }
}

/// Upload metadata passed alongside the artifact bytes.
#[derive(Debug, Clone)]
pub struct UploadMetadata {
    pub name: String,
    pub region: String,
}

/// Abstract pinning capability. Concrete providers are plug-ins; the core
/// names none of them.
#[async_trait]
pub trait PinningService: Send + Sync {
    fn metadata(&self) -> &ProviderMetadata;

    async fn upload(
        &self,
        artifact: &[u8],
        meta: UploadMetadata,
    ) -> Result<ReplicaDescriptor, ProviderError>;

    async fn status(&self, content_address: &ContentAddress) -> Result<PinStatus, ProviderError>;

    async fn healthcheck(&self) -> bool;

    /// Best-effort unpin used during rollback; content addressing makes
    /// deletion non-authoritative.
    async fn unpin(&self, content_address: &ContentAddress) -> Result<(), ProviderError>;
}

/// One artifact to replicate: path, expected address, bytes.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub path: String,
    pub cid: ContentAddress,
    pub bytes: Arc<[u8]>,
}

impl Artifact {
    pub fn new(path: impl Into<String>, bytes: Vec<u8>) -> Self {
        let cid = ContentAddress::for_bytes(&bytes);
        Self { path: path.into(), cid, bytes: Arc::from(bytes) }
    }
}

/// Replication state per artifact × provider × region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ReplicaState {
    Pending,
    InProgress,
    Succeeded { content_address: ContentAddress, bytes: usize },
    Failed { error: String },
}

/// Full record of one provider's participation in a region upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicaAttempt {
    pub artifact_path: String,
    pub provider_id: String,
    pub region: String,
    pub state: ReplicaState,
    pub attempts: u32,
}

/// Outcome of replicating one artifact into one region.
#[derive(Debug, Clone)]
pub struct RegionReplication {
    pub region: String,
    pub artifact_path: String,
    pub replicas: Vec<ReplicaDescriptor>,
    pub attempts: Vec<ReplicaAttempt>,
}

#[derive(Debug, Error)]
pub enum ReplicationError {
    #[error("no providers available for region {region}")]
    NoProviders { region: String },
    #[error("region {region} reached {succeeded} of {quorum} required providers for {artifact}")]
    QuorumNotMet {
        region: String,
        artifact: String,
        succeeded: usize,
        quorum: usize,
        attempts: Vec<ReplicaAttempt>,
    },
    /// Providers disagree about the stored address: either a broken
    /// provider or non-deterministic serialization. Fatal either way.
    #[error("content address mismatch in region {region} for {artifact}: {got} != {expected}")]
    CidMismatch {
        region: String,
        artifact: String,
        expected: ContentAddress,
        got: ContentAddress,
    },
    #[error("artifact {artifact} rejected by provider {provider}: {detail}")]
    ContentRejected {
        artifact: String,
        provider: String,
        detail: String,
    },
}

/// Fan-out replication coordinator. Circuit state is shared across uploads
/// and keyed by provider × region.
pub struct ReplicationService {
    config: ReplicationConfig,
    providers: Vec<Arc<dyn PinningService>>,
    circuits: Mutex<BTreeMap<(String, String), CircuitBreaker>>,
}

impl ReplicationService {
    pub fn new(config: ReplicationConfig, providers: Vec<Arc<dyn PinningService>>) -> Self {
        Self { config, providers, circuits: Mutex::new(BTreeMap::new()) }
    }

    #[inline]
    pub fn config(&self) -> &ReplicationConfig {
        &self.config
    }

    pub fn providers(&self) -> &[Arc<dyn PinningService>] {
        &self.providers
    }

    fn circuit_allows(&self, provider_id: &str, region: &str) -> bool {
        let mut circuits = self.circuits.lock();
        circuits
            .entry((provider_id.to_string(), region.to_string()))
            .or_insert_with(|| {
                CircuitBreaker::new(
                    format!("{provider_id}@{region}"),
                    self.config.circuit_breaker_threshold,
                    self.config.circuit_breaker_cooldown_secs,
                )
            })
            .is_allowed()
    }

    fn circuit_record(&self, provider_id: &str, region: &str, success: bool, trip: bool) {
        let mut circuits = self.circuits.lock();
        let breaker = circuits
            .entry((provider_id.to_string(), region.to_string()))
            .or_insert_with(|| {
                CircuitBreaker::new(
                    format!("{provider_id}@{region}"),
                    self.config.circuit_breaker_threshold,
                    self.config.circuit_breaker_cooldown_secs,
                )
            });
        if trip {
            breaker.trip();
        } else if success {
            breaker.record_success();
        } else {
            breaker.record_failure();
        }
    }

    pub fn circuit_state(&self, provider_id: &str, region: &str) -> Option<CircuitState> {
        self.circuits
            .lock()
            .get(&(provider_id.to_string(), region.to_string()))
            .map(|b| b.state())
    }

    /// Replicate one artifact into one region: fan out to up to
    /// `replication_factor_per_region` providers, retry per budget, enforce
    /// cross-provider address consistency, and require quorum.
    pub async fn replicate(
        &self,
        artifact: &Artifact,
        region: &str,
    ) -> Result<RegionReplication, ReplicationError> {
        let eligible: Vec<Arc<dyn PinningService>> = self
            .providers
            .iter()
            .filter(|p| p.metadata().supported_regions.iter().any(|r| r == region))
            .filter(|p| self.circuit_allows(&p.metadata().id, region))
            .take(self.config.replication_factor_per_region)
            .cloned()
            .collect();
        if eligible.is_empty() {
            return Err(ReplicationError::NoProviders { region: region.to_string() });
        }

        let mut tasks = JoinSet::new();
        for provider in eligible {
            let artifact = artifact.clone();
            let region = region.to_string();
            let retry_attempts = self.config.upload_retry_attempts;
            let base_delay = self.config.retry_base_delay_ms;
            let timeout = std::time::Duration::from_secs(self.config.upload_timeout_secs);
            tasks.spawn(async move {
                upload_with_retry(provider, artifact, region, retry_attempts, base_delay, timeout)
                    .await
            });
        }

        let mut attempts = Vec::new();
        let mut replicas: Vec<ReplicaDescriptor> = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let (attempt, outcome) = joined.expect("upload task panicked");
            match &outcome {
                Ok(descriptor) => {
                    self.circuit_record(&attempt.provider_id, region, true, false);
                    replicas.push(descriptor.clone());
                }
                Err(error) => {
                    let trip = matches!(error, ProviderError::QuotaExceeded);
                    self.circuit_record(&attempt.provider_id, region, false, trip);
                    if let ProviderError::ContentRejected(detail) = error {
                        return Err(ReplicationError::ContentRejected {
                            artifact: artifact.path.clone(),
                            provider: attempt.provider_id.clone(),
                            detail: detail.clone(),
                        });
                    }
                    warn!(
                        provider = %attempt.provider_id,
                        region,
                        artifact = %artifact.path,
                        %error,
                        "provider upload failed"
                    );
                }
            }
            attempts.push(attempt);
        }

        // Cross-provider consistency: every returned address must equal the
        // locally computed one.
        for replica in &replicas {
            if replica.content_address != artifact.cid {
                return Err(ReplicationError::CidMismatch {
                    region: region.to_string(),
                    artifact: artifact.path.clone(),
                    expected: artifact.cid.clone(),
                    got: replica.content_address.clone(),
                });
            }
        }

        if replicas.len() < self.config.quorum_per_region {
            return Err(ReplicationError::QuorumNotMet {
                region: region.to_string(),
                artifact: artifact.path.clone(),
                succeeded: replicas.len(),
                quorum: self.config.quorum_per_region,
                attempts,
            });
        }

        debug!(
            region,
            artifact = %artifact.path,
            replicas = replicas.len(),
            "region replication succeeded"
        );
        Ok(RegionReplication {
            region: region.to_string(),
            artifact_path: artifact.path.clone(),
            replicas,
            attempts,
        })
    }

    /// Best-effort unpin across every configured provider.
    pub async fn unpin_everywhere(&self, cid: &ContentAddress) {
        for provider in &self.providers {
            if let Err(error) = provider.unpin(cid).await {
                debug!(provider = %provider.metadata().id, %error, "unpin failed (best effort)");
            }
        }
    }
}

/// Single-provider upload with exponential backoff. The retry budget
/// depends on the failure kind.
async fn upload_with_retry(
    provider: Arc<dyn PinningService>,
    artifact: Artifact,
    region: String,
    retry_attempts: u32,
    base_delay_ms: u64,
    timeout: std::time::Duration,
) -> (ReplicaAttempt, Result<ReplicaDescriptor, ProviderError>) {
    let provider_id = provider.metadata().id.clone();
    let mut attempt_count = 0u32;
    let mut last_error;

    loop {
        attempt_count += 1;
        let meta = UploadMetadata { name: artifact.path.clone(), region: region.clone() };
        let outcome = match tokio::time::timeout(timeout, provider.upload(&artifact.bytes, meta))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout),
        };

        match outcome {
            Ok(descriptor) => {
                let attempt = ReplicaAttempt {
                    artifact_path: artifact.path.clone(),
                    provider_id,
                    region,
                    state: ReplicaState::Succeeded {
                        content_address: descriptor.content_address.clone(),
                        bytes: descriptor.bytes,
                    },
                    attempts: attempt_count,
                };
                return (attempt, Ok(descriptor));
            }
            Err(error) => {
                let budget = error.retry_budget(retry_attempts);
                if attempt_count > budget {
                    last_error = error;
                    break;
                }
                let delay = base_delay_ms.saturating_mul(1 << (attempt_count - 1).min(16));
                tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            }
        }
    }

    let attempt = ReplicaAttempt {
        artifact_path: artifact.path.clone(),
        provider_id,
        region,
        state: ReplicaState::Failed { error: last_error.to_string() },
        attempts: attempt_count,
    };
    (attempt, Err(last_error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FlakyPlan, MockPinningService};

    fn config() -> ReplicationConfig {
        ReplicationConfig {
            retry_base_delay_ms: 1,
            upload_timeout_secs: 5,
            ..ReplicationConfig::default()
        }
    }

    fn artifact() -> Artifact {
        Artifact::new("country/US/merkle.bin", b"tree-bytes".to_vec())
    }

    #[tokio::test]
    async fn quorum_of_healthy_providers_succeeds() {
        let providers: Vec<Arc<dyn PinningService>> = vec![
            MockPinningService::healthy("pin-a", &["americas"]),
            MockPinningService::healthy("pin-b", &["americas"]),
            MockPinningService::healthy("pin-c", &["americas"]),
        ];
        let service = ReplicationService::new(config(), providers);
        let outcome = service.replicate(&artifact(), "americas").await.unwrap();
        assert_eq!(outcome.replicas.len(), 3);
        assert!(outcome
            .replicas
            .iter()
            .all(|r| r.content_address == artifact().cid));
    }

    #[tokio::test]
    async fn one_dead_provider_still_meets_quorum() {
        let providers: Vec<Arc<dyn PinningService>> = vec![
            MockPinningService::healthy("pin-a", &["americas"]),
            MockPinningService::failing("pin-b", &["americas"], ProviderError::Authentication),
            MockPinningService::healthy("pin-c", &["americas"]),
        ];
        let service = ReplicationService::new(config(), providers);
        let outcome = service.replicate(&artifact(), "americas").await.unwrap();
        assert_eq!(outcome.replicas.len(), 2);
        let failed = outcome
            .attempts
            .iter()
            .find(|a| a.provider_id == "pin-b")
            .unwrap();
        assert!(matches!(failed.state, ReplicaState::Failed { .. }));
        // Authentication is not retried.
        assert_eq!(failed.attempts, 1);
    }

    #[tokio::test]
    async fn below_quorum_is_an_error() {
        let providers: Vec<Arc<dyn PinningService>> = vec![
            MockPinningService::healthy("pin-a", &["americas"]),
            MockPinningService::failing("pin-b", &["americas"], ProviderError::Timeout),
            MockPinningService::failing("pin-c", &["americas"], ProviderError::Timeout),
        ];
        let service = ReplicationService::new(config(), providers);
        let error = service.replicate(&artifact(), "americas").await.unwrap_err();
        match error {
            ReplicationError::QuorumNotMet { succeeded, quorum, .. } => {
                assert_eq!(succeeded, 1);
                assert_eq!(quorum, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn timeouts_retry_with_backoff_then_succeed() {
        let flaky = MockPinningService::flaky(
            "pin-a",
            &["americas"],
            FlakyPlan { failures_before_success: 2, error: ProviderError::Timeout },
        );
        let providers: Vec<Arc<dyn PinningService>> = vec![
            flaky.clone(),
            MockPinningService::healthy("pin-b", &["americas"]),
        ];
        let service = ReplicationService::new(config(), providers);
        let outcome = service.replicate(&artifact(), "americas").await.unwrap();
        assert_eq!(outcome.replicas.len(), 2);
        let retried = outcome
            .attempts
            .iter()
            .find(|a| a.provider_id == "pin-a")
            .unwrap();
        assert_eq!(retried.attempts, 3);
    }

    #[tokio::test]
    async fn cid_mismatch_is_fatal() {
        let providers: Vec<Arc<dyn PinningService>> = vec![
            MockPinningService::healthy("pin-a", &["americas"]),
            MockPinningService::corrupting("pin-b", &["americas"]),
        ];
        let service = ReplicationService::new(config(), providers);
        let error = service.replicate(&artifact(), "americas").await.unwrap_err();
        assert!(matches!(error, ReplicationError::CidMismatch { .. }));
    }

    #[tokio::test]
    async fn quota_trips_circuit_and_routes_around() {
        let providers: Vec<Arc<dyn PinningService>> = vec![
            MockPinningService::failing("pin-a", &["americas"], ProviderError::QuotaExceeded),
            MockPinningService::healthy("pin-b", &["americas"]),
            MockPinningService::healthy("pin-c", &["americas"]),
        ];
        let service = ReplicationService::new(config(), providers);
        let _ = service.replicate(&artifact(), "americas").await.unwrap();
        assert_eq!(
            service.circuit_state("pin-a", "americas"),
            Some(CircuitState::Open)
        );
        // Second round skips the tripped provider entirely.
        let outcome = service.replicate(&artifact(), "americas").await.unwrap();
        assert!(outcome.attempts.iter().all(|a| a.provider_id != "pin-a"));
    }

    #[tokio::test]
    async fn unknown_region_has_no_providers() {
        let providers: Vec<Arc<dyn PinningService>> =
            vec![MockPinningService::healthy("pin-a", &["europe"])];
        let service = ReplicationService::new(config(), providers);
        assert!(matches!(
            service.replicate(&artifact(), "americas").await,
            Err(ReplicationError::NoProviders { .. })
        ));
    }
}
