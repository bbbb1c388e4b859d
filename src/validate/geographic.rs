//! Geographic containment screening.
//!
//! Every feature is checked against the reference bounds for the claimed
//! jurisdiction: cross-subdivision contamination over the dataset's union
//! extent, then per-feature bbox containment with tolerance and centroid
//! containment. All reference data ships with the pipeline; this stage makes
//! no network calls.

use geo::{BoundingRect, Centroid, Coord, Rect};

use crate::provenance::RejectionReason;
use crate::raw::RawDataset;
use crate::reference::ReferenceData;

/// Outcome of geographic validation over one dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoValidation {
    pub valid: bool,
    /// 0-100; how confidently the geometry sits inside the claim.
    pub confidence: i32,
    pub reasons: Vec<String>,
    pub rejection: Option<RejectionReason>,
}

impl GeoValidation {
    fn reject(reason: RejectionReason, confidence: i32, reasons: Vec<String>) -> Self {
        Self { valid: false, confidence, reasons, rejection: Some(reason) }
    }
}

pub struct GeographicValidator<'a> {
    refs: &'a ReferenceData,
    tolerance_deg: f64,
}

impl<'a> GeographicValidator<'a> {
    pub fn new(refs: &'a ReferenceData, tolerance_deg: f64) -> Self {
        Self { refs, tolerance_deg }
    }

    /// Validate the whole dataset against its claimed jurisdiction.
    /// Rejection applies to the entire dataset.
    pub fn validate(&self, dataset: &RawDataset) -> GeoValidation {
        let jurisdiction = &dataset.provenance.jurisdiction;
        let mut reasons = Vec::new();

        // Narrowest claimed bounds available in the reference tables.
        let claimed = self
            .refs
            .place_bbox(jurisdiction)
            .or_else(|| {
                jurisdiction
                    .subdivision()
                    .and_then(|sub| self.refs.subdivision_bbox(jurisdiction.country(), &sub))
            })
            .or_else(|| self.refs.country_bbox(jurisdiction.country()));

        let Some(claimed) = claimed else {
            // No authoritative bounds to check against; pass with a flag so
            // downstream quality scoring can cap the tier.
            reasons.push("no_reference_bounds".into());
            return GeoValidation { valid: true, confidence: 60, reasons, rejection: None };
        };
        let expanded = expand(claimed, self.tolerance_deg);

        let mut union_bbox: Option<Rect<f64>> = None;
        for (idx, feature) in dataset.features.iter().enumerate() {
            let Some(bbox) = feature.geometry.bounding_rect() else {
                reasons.push(format!("feature:{idx}:empty_geometry"));
                return GeoValidation::reject(RejectionReason::MalformedGeometry, 0, reasons);
            };
            union_bbox = Some(match union_bbox {
                Some(acc) => union_rect(&acc, &bbox),
                None => bbox,
            });
        }

        // Cross-jurisdiction contamination first: a dataset whose overall
        // extent spans multiple first-level subdivisions cannot belong to a
        // claim below the country level, no matter how individual features
        // fare. Country-wide claims are explicitly multi-subdivision.
        if let (Some(union_bbox), Some(_)) = (&union_bbox, jurisdiction.subdivision()) {
            let touched = self
                .refs
                .subdivisions_intersecting(jurisdiction.country(), union_bbox);
            if touched.len() > 1 {
                reasons.push(format!("subdivisions_touched:{}", touched.join("+")));
                return GeoValidation::reject(
                    RejectionReason::CrossJurisdictionContamination,
                    10,
                    reasons,
                );
            }
        }

        for (idx, feature) in dataset.features.iter().enumerate() {
            let bbox = feature.geometry.bounding_rect().unwrap();
            if !contains_rect(&expanded, &bbox) {
                reasons.push(format!("feature:{idx}:bbox_outside_claim"));
                return GeoValidation::reject(RejectionReason::OutsideJurisdictionBounds, 0, reasons);
            }

            // Borderline-fit policy: bbox inside tolerance but centroid
            // outside the claim is a low-confidence reject.
            match feature.geometry.centroid() {
                Some(c) if contains_point(claimed, c.0) => {}
                _ => {
                    reasons.push(format!("feature:{idx}:centroid_outside_claim"));
                    return GeoValidation::reject(
                        RejectionReason::CentroidOutsideJurisdiction,
                        20,
                        reasons,
                    );
                }
            }
        }

        let confidence = if reasons.is_empty() { 100 } else { 80 };
        GeoValidation { valid: true, confidence, reasons, rejection: None }
    }
}

fn expand(rect: &Rect<f64>, tolerance: f64) -> Rect<f64> {
    Rect::new(
        Coord { x: rect.min().x - tolerance, y: rect.min().y - tolerance },
        Coord { x: rect.max().x + tolerance, y: rect.max().y + tolerance },
    )
}

fn union_rect(a: &Rect<f64>, b: &Rect<f64>) -> Rect<f64> {
    Rect::new(
        Coord { x: a.min().x.min(b.min().x), y: a.min().y.min(b.min().y) },
        Coord { x: a.max().x.max(b.max().x), y: a.max().y.max(b.max().y) },
    )
}

fn contains_rect(outer: &Rect<f64>, inner: &Rect<f64>) -> bool {
    outer.min().x <= inner.min().x
        && outer.min().y <= inner.min().y
        && outer.max().x >= inner.max().x
        && outer.max().y >= inner.max().y
}

fn contains_point(rect: &Rect<f64>, point: Coord<f64>) -> bool {
    rect.min().x <= point.x
        && point.x <= rect.max().x
        && rect.min().y <= point.y
        && point.y <= rect.max().y
}
