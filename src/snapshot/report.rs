//! Run and provenance reporting: every rejection, excluded feature, warning,
//! conflict, and provider failure from a run, plus the per-country
//! provenance artifact.

use serde::{Deserialize, Serialize};

use crate::event::PipelineEvent;
use crate::provenance::{PipelineWarning, ProvenanceRecord, ValidatorOutcome};
use crate::shard::ConflictRecord;
use crate::types::{DistrictId, QualityTier};

/// Per-dataset outcome in the run report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetReport {
    pub title: String,
    pub response_hash: String,
    pub jurisdiction: String,
    pub accepted: bool,
    /// Stable rejection code when the dataset was dropped.
    pub rejection_reason: Option<String>,
    pub validator_outcomes: Vec<ValidatorOutcome>,
    pub warnings: Vec<PipelineWarning>,
    /// (feature index, rejection code) for features excluded individually.
    pub excluded_features: Vec<(usize, String)>,
    pub district_count: usize,
}

/// Aggregate counters surfaced in the manifest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvenanceSummary {
    pub datasets_ingested: usize,
    pub datasets_accepted: usize,
    pub datasets_rejected: usize,
    pub features_excluded: usize,
    pub districts_committed: usize,
    pub warnings: usize,
}

/// Everything a run did, whether or not it published.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub snapshot_version: String,
    pub published: bool,
    /// Hex global root when a commitment was built.
    pub global_root: Option<String>,
    pub summary: ProvenanceSummary,
    pub datasets: Vec<DatasetReport>,
    pub conflicts: Vec<ConflictRecord>,
    pub events: Vec<PipelineEvent>,
}

impl RunReport {
    /// Human-readable rendering for operators; the JSON form is canonical.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "snapshot {}: {}\n",
            self.snapshot_version,
            if self.published { "published" } else { "not published" }
        ));
        if let Some(root) = &self.global_root {
            out.push_str(&format!("global root: {root}\n"));
        }
        out.push_str(&format!(
            "datasets: {} ingested, {} accepted, {} rejected; {} features excluded; {} districts committed; {} warnings\n",
            self.summary.datasets_ingested,
            self.summary.datasets_accepted,
            self.summary.datasets_rejected,
            self.summary.features_excluded,
            self.summary.districts_committed,
            self.summary.warnings,
        ));
        for dataset in &self.datasets {
            if let Some(reason) = &dataset.rejection_reason {
                out.push_str(&format!("  rejected {} ({}): {reason}\n", dataset.title, dataset.jurisdiction));
            }
            for (idx, reason) in &dataset.excluded_features {
                out.push_str(&format!("  excluded feature {idx} of {}: {reason}\n", dataset.title));
            }
        }
        for conflict in &self.conflicts {
            out.push_str(&format!(
                "  conflict on {} ({:?}): {} superseded {}\n",
                conflict.jurisdiction,
                conflict.universal_type,
                conflict.winner_response_hash,
                conflict.superseded_response_hash,
            ));
        }
        out
    }
}

/// One district's provenance row in `country/<CC>/provenance.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistrictProvenance {
    pub district_id: DistrictId,
    pub quality: QualityTier,
    pub provenance: ProvenanceRecord,
    pub validator_outcomes: Vec<ValidatorOutcome>,
}

/// Per-country provenance artifact.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CountryProvenance {
    pub districts: Vec<DistrictProvenance>,
}
