//! Staged rollout: phase-by-phase global publication with inter-phase
//! verification and automatic rollback.
//!
//! The active manifest pointer never references an unfinished rollout: it
//! advances only after the rollout reaches `completed`, and rollback
//! atomically restores its pre-rollout value. Unpinning during rollback is
//! best-effort because content addressing makes deletion non-authoritative.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::RolloutConfig;
use crate::error::RunError;
use crate::gateway::{Gateway, GatewayClient};
use crate::replicate::{Artifact, ReplicationService};
use crate::snapshot::{ContentAddress, SnapshotBundle};

/// Rollout lifecycle. Phases index from 1 in display form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RolloutState {
    Created,
    PhaseUploading { phase: usize },
    PhaseVerifying { phase: usize },
    Completed,
    RollingBack,
    RolledBack,
    Aborted,
}

/// Verification outcome for one phase.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseReport {
    pub phase: usize,
    pub regions: Vec<String>,
    pub artifacts_published: usize,
    pub gateways_sampled: usize,
    pub gateways_ok: usize,
    pub success_ratio: f64,
    pub passed: bool,
}

/// Structured record of a finished (or failed) rollout.
#[derive(Debug, Clone, Serialize)]
pub struct RolloutReport {
    pub manifest_cid: ContentAddress,
    pub state: RolloutState,
    pub phases: Vec<PhaseReport>,
    pub pointer_advanced: bool,
    pub pointer_reverted: bool,
    pub failure_detail: Option<String>,
}

/// The single mutable pointer clients resolve to find the active snapshot.
/// Set must be atomic: readers observe either the old or the new value.
pub trait ActivePointer: Send + Sync {
    fn get(&self) -> Result<Option<ContentAddress>>;
    fn set(&self, cid: Option<&ContentAddress>) -> Result<()>;
}

/// In-memory pointer for tests and embedded use.
#[derive(Default)]
pub struct MemPointer {
    value: Mutex<Option<ContentAddress>>,
}

impl MemPointer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(cid: ContentAddress) -> Self {
        Self { value: Mutex::new(Some(cid)) }
    }
}

impl ActivePointer for MemPointer {
    fn get(&self) -> Result<Option<ContentAddress>> {
        Ok(self.value.lock().clone())
    }

    fn set(&self, cid: Option<&ContentAddress>) -> Result<()> {
        *self.value.lock() = cid.cloned();
        Ok(())
    }
}

/// File-backed pointer: the address is staged to a sibling file and renamed
/// into place, so readers never see a torn write.
pub struct FilePointer {
    path: PathBuf,
}

impl FilePointer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ActivePointer for FilePointer {
    fn get(&self) -> Result<Option<ContentAddress>> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(ContentAddress::parse(contents.trim())?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).context("failed to read active pointer"),
        }
    }

    fn set(&self, cid: Option<&ContentAddress>) -> Result<()> {
        match cid {
            None => {
                if self.path.exists() {
                    std::fs::remove_file(&self.path).context("failed to clear active pointer")?;
                }
                Ok(())
            }
            Some(cid) => {
                let staging = self.path.with_extension("staging");
                std::fs::write(&staging, format!("{cid}\n"))
                    .context("failed to stage active pointer")?;
                std::fs::rename(&staging, &self.path)
                    .context("failed to swing active pointer")?;
                Ok(())
            }
        }
    }
}

/// Cooperative cancellation flag checked at phase boundaries.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct RolloutCoordinator<'a> {
    config: &'a RolloutConfig,
    replication: &'a ReplicationService,
    gateways: &'a [Gateway],
    client: Arc<dyn GatewayClient>,
    pointer: &'a dyn ActivePointer,
}

impl<'a> RolloutCoordinator<'a> {
    pub fn new(
        config: &'a RolloutConfig,
        replication: &'a ReplicationService,
        gateways: &'a [Gateway],
        client: Arc<dyn GatewayClient>,
        pointer: &'a dyn ActivePointer,
    ) -> Self {
        Self { config, replication, gateways, client, pointer }
    }

    /// Execute the staged rollout of a packaged snapshot. On success the
    /// active pointer advances to the new manifest; on failure it is left
    /// (or restored) at its pre-rollout value and the error carries the
    /// process exit semantics.
    pub async fn execute(
        &self,
        bundle: &SnapshotBundle,
        cancel: &CancelFlag,
    ) -> Result<RolloutReport, RunError> {
        let previous = self
            .pointer
            .get()
            .map_err(|e| RunError::Replication(e.to_string()))?;
        let artifacts: Vec<Artifact> = bundle
            .files
            .iter()
            .map(|(path, bytes)| Artifact::new(path.clone(), bytes.clone()))
            .collect();

        let mut report = RolloutReport {
            manifest_cid: bundle.manifest_cid.clone(),
            state: RolloutState::Created,
            phases: Vec::new(),
            pointer_advanced: false,
            pointer_reverted: false,
            failure_detail: None,
        };
        let mut published: Vec<ContentAddress> = Vec::new();

        for (number, phase) in self.config.phases.iter().enumerate() {
            let phase_number = number + 1;
            if cancel.is_cancelled() {
                return self.abort(report, previous, &published, "cancelled before phase").await;
            }

            report.state = RolloutState::PhaseUploading { phase: phase_number };
            info!(phase = phase_number, regions = ?phase.regions, "phase upload starting");
            for region in &phase.regions {
                for artifact in &artifacts {
                    if cancel.is_cancelled() {
                        return self
                            .abort(report, previous, &published, "cancelled mid-phase")
                            .await;
                    }
                    match self.replication.replicate(artifact, region).await {
                        Ok(_) => published.push(artifact.cid.clone()),
                        Err(error) => {
                            warn!(phase = phase_number, region, %error, "phase upload failed");
                            return self
                                .fail(report, previous, &published, error.to_string())
                                .await;
                        }
                    }
                }
            }

            // Settle delay before sampling gateways.
            tokio::time::sleep(std::time::Duration::from_secs(phase.delay_secs)).await;

            report.state = RolloutState::PhaseVerifying { phase: phase_number };
            let phase_report = self
                .verify_phase(phase_number, &phase.regions, phase.min_success_ratio, bundle, artifacts.len())
                .await;
            let passed = phase_report.passed;
            let ratio = phase_report.success_ratio;
            report.phases.push(phase_report);
            if !passed {
                warn!(phase = phase_number, ratio, "phase verification failed");
                return self
                    .fail(
                        report,
                        previous,
                        &published,
                        format!("phase {phase_number} verification ratio {ratio:.2}"),
                    )
                    .await;
            }
            info!(phase = phase_number, ratio, "phase verified");
        }

        // Terminal state first; only then may the pointer advance.
        report.state = RolloutState::Completed;
        self.pointer
            .set(Some(&bundle.manifest_cid))
            .map_err(|e| RunError::Replication(e.to_string()))?;
        report.pointer_advanced = true;
        info!(manifest = %bundle.manifest_cid, "rollout completed, pointer advanced");
        Ok(report)
    }

    /// Sample gateways in the phase's regions and confirm they return bytes
    /// matching the manifest's content address.
    async fn verify_phase(
        &self,
        phase: usize,
        regions: &[String],
        min_success_ratio: f64,
        bundle: &SnapshotBundle,
        artifacts_published: usize,
    ) -> PhaseReport {
        let mut sampled = 0usize;
        let mut ok = 0usize;
        for region in regions {
            let in_region = self
                .gateways
                .iter()
                .filter(|g| &g.region == region)
                .take(self.config.verification_sample_size);
            for gateway in in_region {
                sampled += 1;
                match self.client.fetch(&gateway.url, &bundle.manifest_cid).await {
                    Ok(bytes) if bundle.manifest_cid.matches(&bytes) => ok += 1,
                    Ok(_) | Err(_) => {}
                }
            }
        }
        // No gateways to sample counts as failure: nothing confirmed.
        let success_ratio = if sampled == 0 { 0.0 } else { ok as f64 / sampled as f64 };
        PhaseReport {
            phase,
            regions: regions.to_vec(),
            artifacts_published,
            gateways_sampled: sampled,
            gateways_ok: ok,
            success_ratio,
            passed: success_ratio >= min_success_ratio,
        }
    }

    /// Failed phase: roll back when enabled, otherwise surface the
    /// replication failure directly.
    async fn fail(
        &self,
        mut report: RolloutReport,
        previous: Option<ContentAddress>,
        published: &[ContentAddress],
        detail: String,
    ) -> Result<RolloutReport, RunError> {
        report.failure_detail = Some(detail.clone());
        if !self.config.rollback_enabled {
            report.state = RolloutState::Aborted;
            return Err(RunError::Replication(detail));
        }
        report.state = RolloutState::RollingBack;
        self.rollback(&mut report, previous, published).await;
        report.state = RolloutState::RolledBack;
        emit_failure_report(&report);
        Err(RunError::RolledBack(detail))
    }

    /// Cancellation: transition to aborted and invoke rollback.
    async fn abort(
        &self,
        mut report: RolloutReport,
        previous: Option<ContentAddress>,
        published: &[ContentAddress],
        detail: &str,
    ) -> Result<RolloutReport, RunError> {
        report.failure_detail = Some(detail.to_string());
        self.rollback(&mut report, previous, published).await;
        report.state = RolloutState::Aborted;
        emit_failure_report(&report);
        Err(RunError::Aborted(detail.to_string()))
    }

    /// Best-effort unpin of everything this rollout published, then restore
    /// the previous active pointer.
    async fn rollback(
        &self,
        report: &mut RolloutReport,
        previous: Option<ContentAddress>,
        published: &[ContentAddress],
    ) {
        for cid in published {
            self.replication.unpin_everywhere(cid).await;
        }
        let current = self.pointer.get().ok().flatten();
        if current != previous {
            if self.pointer.set(previous.as_ref()).is_ok() {
                report.pointer_reverted = true;
            }
        }
        // The pointer never advanced mid-rollout, so equality means it
        // already holds its pre-rollout value.
        warn!(unpinned = published.len(), "rollback finished (best effort)");
    }
}

/// Structured failure record for operators; the error itself carries only
/// the summary line.
fn emit_failure_report(report: &RolloutReport) {
    match serde_json::to_string(report) {
        Ok(json) => warn!(report = %json, "rollout failure report"),
        Err(e) => warn!(error = %e, "failed to serialize rollout failure report"),
    }
}
