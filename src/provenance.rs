use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{AuthorityTier, JurisdictionPath};

/// How the raw bytes were obtained from the upstream endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionMethod {
    RestQuery,
    BulkDownload,
    PortalExport,
    Manual,
}

/// Upstream quality flags declared or observed at acquisition time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityFlag {
    StaleVintage,
    PartialExtent,
    UndeclaredCrs,
    MixedGeometryTypes,
    TruncatedResponse,
}

/// Typed record of source, authority, timing, and hashes attached to every
/// dataset. Immutable once created; propagates unchanged through all stages
/// and is serialized alongside every artifact.
///
/// `response_hash` must be stable across re-runs given identical upstream
/// bytes; it doubles as the deterministic conflict tiebreak.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceRecord {
    pub source_url: String,
    pub authority_tier: AuthorityTier,
    pub jurisdiction: JurisdictionPath,
    pub observation_timestamp: DateTime<Utc>,
    pub acquisition_method: AcquisitionMethod,
    /// SHA-256 of the raw upstream response bytes, lowercase hex.
    pub response_hash: String,
    pub http_status: u16,
    pub declared_feature_count: Option<usize>,
    pub declared_geometry_type: Option<String>,
    pub declared_crs: Option<String>,
    #[serde(default)]
    pub quality_flags: Vec<QualityFlag>,
}

/// Stable enumerated code for every exclusion the pipeline can make.
///
/// Codes render as `family:detail` where a detail exists; the rendered form
/// is the contract with the run report and must not change meaning between
/// releases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum RejectionReason {
    /// Semantic score fell below threshold.
    SemanticScoreBelowThreshold { score: i32, threshold: i32 },
    /// A forced-reject keyword matched the dataset title or fields.
    NegativeKeyword(String),
    /// Geometry falls outside the claimed jurisdiction bounds.
    OutsideJurisdictionBounds,
    /// Feature bbox fit within tolerance but its centroid fell outside.
    CentroidOutsideJurisdiction,
    /// Feature bboxes span multiple first-level subdivisions.
    CrossJurisdictionContamination,
    /// Declared CRS missing or not in the supported table.
    UnknownCrs(String),
    /// Geometry missing or not polygonal.
    MalformedGeometry,
    /// Ring had fewer than four points after cleaning.
    DegenerateRing,
    /// Self-intersection survived the single repair attempt.
    TopologyRepairFailed,
    /// Every feature in the dataset was individually rejected.
    AllFeaturesRejected,
    /// A lower (better) authority tier supplied the same jurisdiction.
    LowerAuthoritySuperseded,
    /// Administrative overlay excluded from the commitment.
    UtilityOverlayExcluded,
}

impl RejectionReason {
    /// Stable code string, e.g. `negative_keyword:canopy`.
    pub fn code(&self) -> String {
        match self {
            RejectionReason::SemanticScoreBelowThreshold { score, threshold } => {
                format!("semantic_score_below_threshold:{score}<{threshold}")
            }
            RejectionReason::NegativeKeyword(kw) => format!("negative_keyword:{kw}"),
            RejectionReason::OutsideJurisdictionBounds => "outside_jurisdiction_bounds".into(),
            RejectionReason::CentroidOutsideJurisdiction => "centroid_outside_jurisdiction".into(),
            RejectionReason::CrossJurisdictionContamination => {
                "cross_jurisdiction_contamination".into()
            }
            RejectionReason::UnknownCrs(crs) => format!("unknown_crs:{crs}"),
            RejectionReason::MalformedGeometry => "malformed_geometry".into(),
            RejectionReason::DegenerateRing => "degenerate_ring".into(),
            RejectionReason::TopologyRepairFailed => "topology_repair_failed".into(),
            RejectionReason::AllFeaturesRejected => "all_features_rejected".into(),
            RejectionReason::LowerAuthoritySuperseded => "lower_authority_superseded".into(),
            RejectionReason::UtilityOverlayExcluded => "utility_overlay_excluded".into(),
        }
    }
}

/// Advisory warning that never blocks a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipelineWarning {
    /// Normalized count deviates from the authoritative reference count.
    ReferenceCountMismatch {
        expected: usize,
        actual: usize,
        tolerance: usize,
    },
    /// Simplification broke topology; original geometry kept for a feature.
    SimplificationBackoff { feature_index: usize },
    /// A feature needed a topology repair that succeeded.
    TopologyRepaired { feature_index: usize },
    /// No reference count exists for the jurisdiction.
    NoReferenceCount,
}

/// Outcome of one validation stage over one dataset, preserved in the
/// dataset's provenance trail and the run report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatorOutcome {
    pub stage: String,
    pub passed: bool,
    /// Stage-specific score: semantic score or geographic confidence.
    pub score: Option<i32>,
    pub reasons: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_codes_are_stable() {
        assert_eq!(
            RejectionReason::NegativeKeyword("canopy".into()).code(),
            "negative_keyword:canopy"
        );
        assert_eq!(
            RejectionReason::CrossJurisdictionContamination.code(),
            "cross_jurisdiction_contamination"
        );
        assert_eq!(
            RejectionReason::LowerAuthoritySuperseded.code(),
            "lower_authority_superseded"
        );
    }
}
