//! End-to-end offline pipeline: validate → normalize → identity → shard →
//! index → commit → package.
//!
//! Datasets are processed data-parallel; the stages within one dataset are
//! strictly sequential. Everything after normalization is a deterministic
//! serial reduction, so the final global root depends only on the set of
//! accepted districts, never on discovery order or worker scheduling.

use std::collections::BTreeMap;

use chrono::Utc;
use rayon::prelude::*;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::district::{canonical_geometry_bytes, canonical_name, geometry_bbox, NormalizedDistrict};
use crate::error::RunError;
use crate::event::{event, stage, EventOutcome, EventSink};
use crate::identity::{district_id, IdentityBuilder};
use crate::index::SpatialIndex;
use crate::merkle::build_commitment;
use crate::normalize::Normalizer;
use crate::provenance::{PipelineWarning, RejectionReason, ValidatorOutcome};
use crate::raw::RawDataset;
use crate::reference::ReferenceData;
use crate::shard::{build_shards, resolve_conflicts, ConflictRecord, DatasetCandidate};
use crate::snapshot::{
    package, CountryProvenance, DatasetReport, DistrictProvenance, PackageInputs,
    ProvenanceSummary, RunReport, SnapshotBundle,
};
use crate::types::{CountryCode, QualityTier, UniversalType};
use crate::validate::{CountValidator, GeographicValidator, SemanticValidator};

/// Result of a pipeline run. `bundle` is None for a no-op run (nothing
/// committed); the report is produced either way.
pub struct PipelineOutcome {
    pub report: RunReport,
    pub bundle: Option<SnapshotBundle>,
}

pub struct Pipeline<'a> {
    config: &'a PipelineConfig,
    refs: &'a ReferenceData,
    events: &'a dyn EventSink,
}

/// A dataset that cleared validation and normalization, with its report.
struct ProcessedDataset {
    report: DatasetReport,
    candidate: Option<DatasetCandidate>,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a PipelineConfig, refs: &'a ReferenceData, events: &'a dyn EventSink) -> Self {
        Self { config, refs, events }
    }

    /// Run the offline pipeline over already-acquired datasets.
    pub fn run(&self, datasets: Vec<RawDataset>) -> Result<PipelineOutcome, RunError> {
        let ingested = datasets.len();
        info!(datasets = ingested, "pipeline run starting");

        // Data-parallel per-dataset stages; order of results follows input.
        let processed: Vec<ProcessedDataset> = datasets
            .par_iter()
            .map(|dataset| self.process_dataset(dataset))
            .collect();

        let mut reports = Vec::with_capacity(processed.len());
        let mut candidates = Vec::new();
        for outcome in processed {
            if let Some(candidate) = outcome.candidate {
                candidates.push(candidate);
            }
            reports.push(outcome.report);
        }

        // Multi-source federation: one winner per (jurisdiction, type).
        let (winners, superseded, conflicts) = resolve_conflicts(candidates);
        for (loser, reason) in &superseded {
            self.events.emit(event(
                stage::SHARD,
                loser.provenance.response_hash.clone(),
                EventOutcome::Rejected,
                reason.code(),
            ));
            if let Some(report) = reports
                .iter_mut()
                .find(|r| r.response_hash == loser.provenance.response_hash)
            {
                report.accepted = false;
                report.rejection_reason = Some(reason.code());
                report.district_count = 0;
            }
        }

        // Identity check over the winning set; collisions abort the run.
        let mut identity = IdentityBuilder::new();
        let mut committed: Vec<NormalizedDistrict> = Vec::new();
        let mut excluded_utility = 0usize;
        for candidate in &winners {
            for district in &candidate.districts {
                let assignment = identity.assign(
                    &district.jurisdiction,
                    &district.canonical_name,
                    &district.canonical_geometry_bytes(),
                )?;
                if matches!(assignment, crate::identity::Assignment::Duplicate(_)) {
                    continue;
                }
                if district.quality.commits() {
                    committed.push(district.clone());
                } else {
                    excluded_utility += 1;
                    self.events.emit(event(
                        stage::IDENTITY,
                        district.district_id.to_hex(),
                        EventOutcome::Rejected,
                        RejectionReason::UtilityOverlayExcluded.code(),
                    ));
                }
            }
        }

        let summary = ProvenanceSummary {
            datasets_ingested: ingested,
            datasets_accepted: reports.iter().filter(|r| r.accepted).count(),
            datasets_rejected: reports.iter().filter(|r| !r.accepted).count(),
            features_excluded: reports.iter().map(|r| r.excluded_features.len()).sum::<usize>()
                + excluded_utility,
            districts_committed: committed.len(),
            warnings: reports.iter().map(|r| r.warnings.len()).sum(),
        };

        // No accepted districts anywhere: the run is a no-op, not a failure.
        if committed.is_empty() {
            warn!("no districts committed; run is a no-op");
            return Ok(PipelineOutcome {
                report: self.report(summary, reports, conflicts, None),
                bundle: None,
            });
        }

        // Shard by country; index build per country is independent work.
        let shards = build_shards(committed);
        let indexes: BTreeMap<CountryCode, SpatialIndex> = shards
            .par_iter()
            .map(|(country, shard)| {
                SpatialIndex::build(shard.districts.clone()).map(|index| (*country, index))
            })
            .collect::<anyhow::Result<_>>()
            .map_err(|e| RunError::Validation(e.to_string()))?;

        // Country trees, global index tree, proofs; self-verified inside.
        let commitment = build_commitment(&shards)?;
        self.events.emit(event(
            stage::MERKLE,
            hex::encode(commitment.global_root),
            EventOutcome::Completed,
            format!("{} countries", commitment.countries.len()),
        ));

        // Invariant: the spatial index and the tree commit the same set.
        for (country, country_commitment) in &commitment.countries {
            let index = &indexes[country];
            let ids_match = country_commitment.district_ids.len() == index.len()
                && country_commitment
                    .district_ids
                    .iter()
                    .zip(index.district_ids())
                    .all(|(a, b)| a == b);
            if !ids_match {
                return Err(RunError::Validation(format!(
                    "index/leaf set mismatch for {country}"
                )));
            }
        }

        let provenance = country_provenance(&shards, &reports);
        let bundle = package(PackageInputs {
            version: &self.config.snapshot_version,
            created_at: Utc::now(),
            shards: &shards,
            indexes: &indexes,
            commitment: &commitment,
            provenance: &provenance,
            summary: summary.clone(),
        })
        .map_err(|e| RunError::Normalization(e.to_string()))?;

        self.events.emit(event(
            stage::PACKAGE,
            bundle.manifest_cid.to_string(),
            EventOutcome::Completed,
            format!("{} artifacts, {} bytes", bundle.files.len(), bundle.total_bytes()),
        ));
        info!(
            global_root = %bundle.manifest.global_root,
            countries = bundle.manifest.per_country.len(),
            "snapshot packaged"
        );

        let global_root = Some(bundle.manifest.global_root.clone());
        Ok(PipelineOutcome {
            report: self.report(summary, reports, conflicts, global_root),
            bundle: Some(bundle),
        })
    }

    /// Sequential per-dataset stages: semantic → geographic → normalize →
    /// counts → district assembly.
    fn process_dataset(&self, dataset: &RawDataset) -> ProcessedDataset {
        let response_hash = dataset.provenance.response_hash.clone();
        let mut report = DatasetReport {
            title: dataset.title.clone(),
            response_hash: response_hash.clone(),
            jurisdiction: dataset.provenance.jurisdiction.canonical(),
            accepted: false,
            rejection_reason: None,
            validator_outcomes: Vec::new(),
            warnings: Vec::new(),
            excluded_features: Vec::new(),
            district_count: 0,
        };

        // Semantic screening.
        let semantic = SemanticValidator::new(self.config.semantic_score_threshold);
        let score = semantic.score(dataset);
        report.validator_outcomes.push(ValidatorOutcome {
            stage: stage::SEMANTIC.into(),
            passed: semantic.passes(&score),
            score: Some(score.score),
            reasons: score.reasons.clone(),
        });
        if !semantic.passes(&score) {
            let reason = match &score.forced_keyword {
                Some(keyword) => RejectionReason::NegativeKeyword(keyword.clone()),
                None => RejectionReason::SemanticScoreBelowThreshold {
                    score: score.score,
                    threshold: semantic.threshold(),
                },
            };
            self.events.emit(event(stage::SEMANTIC, &response_hash, EventOutcome::Rejected, reason.code()));
            report.rejection_reason = Some(reason.code());
            return ProcessedDataset { report, candidate: None };
        }
        self.events.emit(event(stage::SEMANTIC, &response_hash, EventOutcome::Accepted, format!("score {}", score.score)));

        // Geographic screening.
        let geographic = GeographicValidator::new(self.refs, self.config.bbox_tolerance_deg);
        let geo = geographic.validate(dataset);
        report.validator_outcomes.push(ValidatorOutcome {
            stage: stage::GEOGRAPHIC.into(),
            passed: geo.valid,
            score: Some(geo.confidence),
            reasons: geo.reasons.clone(),
        });
        if !geo.valid {
            let reason = geo.rejection.unwrap_or(RejectionReason::OutsideJurisdictionBounds);
            self.events.emit(event(stage::GEOGRAPHIC, &response_hash, EventOutcome::Rejected, reason.code()));
            report.rejection_reason = Some(reason.code());
            return ProcessedDataset { report, candidate: None };
        }
        self.events.emit(event(stage::GEOGRAPHIC, &response_hash, EventOutcome::Accepted, format!("confidence {}", geo.confidence)));

        // Normalization.
        let normalizer = Normalizer::new(
            self.config.simplification_tolerance_deg,
            self.config.coordinate_precision_digits,
        );
        let normalized = match normalizer.normalize_dataset(dataset) {
            Ok(normalized) => normalized,
            Err(reason) => {
                self.events.emit(event(stage::NORMALIZE, &response_hash, EventOutcome::Rejected, reason.code()));
                report.rejection_reason = Some(reason.code());
                return ProcessedDataset { report, candidate: None };
            }
        };
        report.warnings.extend(normalized.warnings.iter().cloned());
        for (idx, reason) in &normalized.rejected {
            report.excluded_features.push((*idx, reason.code()));
            self.events.emit(event(
                stage::NORMALIZE,
                format!("{response_hash}#{idx}"),
                EventOutcome::Rejected,
                reason.code(),
            ));
        }

        // Universal type from the mapping table.
        let universal_type = self.refs.classify_type(&dataset.title);

        // Reference count comparison: advisory only.
        let counter = CountValidator::new(self.refs, self.config.count_validator_tolerance);
        let count_confirmed = match counter.check(
            &dataset.provenance.jurisdiction,
            universal_type,
            normalized.kept.len(),
        ) {
            None => true,
            Some(warning) => {
                if let PipelineWarning::ReferenceCountMismatch { expected, actual, .. } = &warning {
                    self.events.emit(event(
                        stage::COUNTS,
                        &response_hash,
                        EventOutcome::Warned,
                        format!("expected {expected}, got {actual}"),
                    ));
                }
                report.warnings.push(warning);
                false
            }
        };

        // Assemble districts with deterministic ids and quality tiers.
        let quality = derive_tier(
            universal_type,
            score.score,
            geo.confidence,
            &normalized.kept,
            count_confirmed,
        );
        let mut districts = Vec::with_capacity(normalized.kept.len());
        for (idx, feature) in &normalized.kept {
            let local_name = dataset.features[*idx]
                .local_name()
                .unwrap_or_else(|| format!("district {}", idx + 1));
            let canonical = canonical_name(&local_name);
            let geometry_bytes = canonical_geometry_bytes(&feature.geometry);
            let id = district_id(&dataset.provenance.jurisdiction, &canonical, &geometry_bytes);
            let Some(bbox) = geometry_bbox(&feature.geometry) else {
                report.excluded_features.push((*idx, RejectionReason::MalformedGeometry.code()));
                continue;
            };
            districts.push(NormalizedDistrict {
                district_id: id,
                universal_type,
                jurisdiction: dataset.provenance.jurisdiction.clone(),
                local_name,
                canonical_name: canonical,
                geometry: feature.geometry.clone(),
                bbox,
                quality,
                provenance: dataset.provenance.clone(),
            });
        }

        report.accepted = true;
        report.district_count = districts.len();
        self.events.emit(event(
            stage::NORMALIZE,
            &response_hash,
            EventOutcome::Accepted,
            format!("{} districts", districts.len()),
        ));

        ProcessedDataset {
            report,
            candidate: Some(DatasetCandidate {
                universal_type,
                provenance: dataset.provenance.clone(),
                districts,
            }),
        }
    }

    fn report(
        &self,
        summary: ProvenanceSummary,
        datasets: Vec<DatasetReport>,
        conflicts: Vec<ConflictRecord>,
        global_root: Option<String>,
    ) -> RunReport {
        RunReport {
            snapshot_version: self.config.snapshot_version.clone(),
            published: false,
            global_root,
            summary,
            datasets,
            conflicts,
            events: Vec::new(),
        }
    }
}

/// Quality tier policy. Utility overlays never commit; the rest grade on
/// validator scores and how much the normalizer had to intervene.
fn derive_tier(
    universal_type: UniversalType,
    semantic_score: i32,
    geo_confidence: i32,
    kept: &[(usize, crate::normalize::NormalizedFeature)],
    count_confirmed: bool,
) -> QualityTier {
    if universal_type.is_utility_overlay() {
        return QualityTier::Utility;
    }
    let untouched = kept.iter().all(|(_, f)| !f.repaired && !f.simplify_backoff);
    if semantic_score >= 70 && geo_confidence >= 90 && untouched && count_confirmed {
        QualityTier::Gold
    } else if semantic_score >= 50 && geo_confidence >= 75 {
        QualityTier::Silver
    } else {
        QualityTier::Bronze
    }
}

/// Per-country provenance rows for `country/<CC>/provenance.json`.
fn country_provenance(
    shards: &BTreeMap<CountryCode, crate::shard::CountryShard>,
    reports: &[DatasetReport],
) -> BTreeMap<CountryCode, CountryProvenance> {
    shards
        .iter()
        .map(|(country, shard)| {
            let districts = shard
                .districts
                .iter()
                .map(|district| DistrictProvenance {
                    district_id: district.district_id,
                    quality: district.quality,
                    provenance: district.provenance.clone(),
                    validator_outcomes: reports
                        .iter()
                        .find(|r| r.response_hash == district.provenance.response_hash)
                        .map(|r| r.validator_outcomes.clone())
                        .unwrap_or_default(),
                })
                .collect();
            (*country, CountryProvenance { districts })
        })
        .collect()
}
