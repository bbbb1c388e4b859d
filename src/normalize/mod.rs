//! Geometry normalization: an ordered, idempotent pipeline taking accepted
//! raw features to canonical WGS84 geometry.
//!
//! Stages, in order: reproject, ring cleanup, winding enforcement, topology
//! repair (single attempt), Douglas-Peucker simplification with topology
//! backoff, fixed-precision banker's rounding. Same input feature yields
//! byte-identical output.

mod repair;
mod reproject;
mod rings;
mod round;

pub use repair::{polygon_is_simple, ring_is_simple};
pub use reproject::{to_wgs84, SourceCrs};
pub use rings::winding_is_canonical;
pub use round::{has_precision, round_value};

use geo::{LineString, MultiPolygon, Polygon, Simplify};

use crate::provenance::{PipelineWarning, RejectionReason};
use crate::raw::RawDataset;

/// One feature after normalization, with flags recording what the pipeline
/// had to do to it. The flags feed quality tiering.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedFeature {
    pub geometry: MultiPolygon<f64>,
    pub repaired: bool,
    pub simplify_backoff: bool,
}

/// Per-dataset normalization result. Feature indices refer to the raw
/// dataset's feature order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatasetNormalization {
    pub kept: Vec<(usize, NormalizedFeature)>,
    pub rejected: Vec<(usize, RejectionReason)>,
    pub warnings: Vec<PipelineWarning>,
}

pub struct Normalizer {
    simplification_tolerance_deg: f64,
    precision_digits: u32,
}

impl Normalizer {
    pub fn new(simplification_tolerance_deg: f64, precision_digits: u32) -> Self {
        Self { simplification_tolerance_deg, precision_digits }
    }

    /// Normalize every feature of an accepted dataset. Per-feature failures
    /// exclude that feature only; a dataset-level failure (unknown CRS, all
    /// features rejected) rejects the whole dataset.
    pub fn normalize_dataset(
        &self,
        dataset: &RawDataset,
    ) -> Result<DatasetNormalization, RejectionReason> {
        let crs = match &dataset.provenance.declared_crs {
            None => return Err(RejectionReason::UnknownCrs("undeclared".into())),
            Some(declared) => SourceCrs::parse(declared)
                .ok_or_else(|| RejectionReason::UnknownCrs(declared.clone()))?,
        };

        let mut out = DatasetNormalization::default();
        for (idx, feature) in dataset.features.iter().enumerate() {
            match self.normalize_feature(&feature.geometry, crs) {
                Ok(normalized) => {
                    if normalized.repaired {
                        out.warnings.push(PipelineWarning::TopologyRepaired { feature_index: idx });
                    }
                    if normalized.simplify_backoff {
                        out.warnings
                            .push(PipelineWarning::SimplificationBackoff { feature_index: idx });
                    }
                    out.kept.push((idx, normalized));
                }
                Err(reason) => out.rejected.push((idx, reason)),
            }
        }

        if out.kept.is_empty() {
            return Err(RejectionReason::AllFeaturesRejected);
        }
        Ok(out)
    }

    /// Normalize one feature geometry through the full ordered pipeline.
    pub fn normalize_feature(
        &self,
        geometry: &MultiPolygon<f64>,
        crs: SourceCrs,
    ) -> Result<NormalizedFeature, RejectionReason> {
        // 1. Reproject to WGS84.
        let geometry =
            to_wgs84(geometry, crs).map_err(|_| RejectionReason::MalformedGeometry)?;

        // 2. Clean coordinates: drop duplicates and degenerate rings.
        let mut polygons = clean_polygons(&geometry);
        if polygons.is_empty() {
            return Err(RejectionReason::DegenerateRing);
        }

        // 3. Right-hand rule winding.
        for polygon in &mut polygons {
            rings::enforce_winding(polygon);
        }

        // 4. Topology repair, one attempt per polygon.
        let mut repaired_any = false;
        let mut simple: Vec<Polygon<f64>> = Vec::with_capacity(polygons.len());
        for polygon in &polygons {
            if polygon_is_simple(polygon) {
                simple.push(polygon.clone());
                continue;
            }
            let mut pieces =
                repair::repair_polygon(polygon).ok_or(RejectionReason::TopologyRepairFailed)?;
            for piece in &mut pieces {
                rings::enforce_winding(piece);
            }
            repaired_any = true;
            simple.extend(pieces);
        }

        // 5. Simplify, backing off to the unsimplified geometry when the
        // simplification itself breaks topology.
        let pre_simplify = MultiPolygon(simple);
        let simplified = self.simplify(&pre_simplify);
        let (geometry, simplify_backoff) = match simplified {
            Some(s) if s.0.iter().all(polygon_is_simple) => (s, false),
            _ => (pre_simplify.clone(), true),
        };

        // 6. Fixed-precision rounding, then re-clean what rounding collapsed.
        let rounded = round::round_multi_polygon(&geometry, self.precision_digits);
        let mut polygons = clean_polygons(&rounded);
        if polygons.is_empty() {
            return Err(RejectionReason::DegenerateRing);
        }
        for polygon in &mut polygons {
            rings::enforce_winding(polygon);
        }
        let final_geometry = MultiPolygon(polygons);
        if !final_geometry.0.iter().all(polygon_is_simple) {
            // Rounding reintroduced a crossing; the repair budget is spent.
            return Err(RejectionReason::TopologyRepairFailed);
        }

        Ok(NormalizedFeature {
            geometry: final_geometry,
            repaired: repaired_any,
            simplify_backoff,
        })
    }

    /// Per-ring Douglas-Peucker; rings that would collapse keep their
    /// original coordinates.
    fn simplify(&self, mp: &MultiPolygon<f64>) -> Option<MultiPolygon<f64>> {
        let tolerance = self.simplification_tolerance_deg;
        let polygons = mp
            .0
            .iter()
            .map(|poly| {
                let exterior = simplify_ring(poly.exterior(), tolerance)?;
                let interiors = poly
                    .interiors()
                    .iter()
                    .map(|ring| simplify_ring(ring, tolerance).unwrap_or_else(|| ring.clone()))
                    .collect();
                Some(Polygon::new(exterior, interiors))
            })
            .collect::<Option<Vec<_>>>()?;
        Some(MultiPolygon(polygons))
    }
}

fn simplify_ring(ring: &LineString<f64>, tolerance: f64) -> Option<LineString<f64>> {
    let simplified = ring.simplify(&tolerance);
    match rings::clean_ring(&simplified) {
        Some(clean) if !rings::ring_is_degenerate(&clean) => Some(clean),
        // Collapsed below a triangle or to zero area: keep the original.
        _ => rings::clean_ring(ring),
    }
}

/// Ring survives cleanup when enough points remain and it is not a simple
/// zero-area spike. A zero-area ring that still crosses itself is kept for
/// the repair stage.
fn keep_ring(ring: &LineString<f64>) -> Option<LineString<f64>> {
    let cleaned = rings::clean_ring(ring)?;
    if rings::ring_is_degenerate(&cleaned) && ring_is_simple(&cleaned) {
        return None;
    }
    Some(cleaned)
}

/// Clean every polygon's rings; polygons whose exterior degenerates are
/// dropped, degenerate interiors are dropped silently.
fn clean_polygons(mp: &MultiPolygon<f64>) -> Vec<Polygon<f64>> {
    mp.0.iter()
        .filter_map(|poly| {
            let exterior = keep_ring(poly.exterior())?;
            let interiors = poly.interiors().iter().filter_map(keep_ring).collect();
            Some(Polygon::new(exterior, interiors))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Coord;

    fn normalizer() -> Normalizer {
        Normalizer::new(0.0001, 6)
    }

    fn square(cx: f64, cy: f64, half: f64) -> MultiPolygon<f64> {
        MultiPolygon(vec![Polygon::new(
            LineString(vec![
                Coord { x: cx - half, y: cy - half },
                Coord { x: cx + half, y: cy - half },
                Coord { x: cx + half, y: cy + half },
                Coord { x: cx - half, y: cy + half },
                Coord { x: cx - half, y: cy - half },
            ]),
            vec![],
        )])
    }

    #[test]
    fn normalization_is_idempotent() {
        let n = normalizer();
        let input = square(-157.9123456789, 21.4123456789, 0.0212345);
        let once = n.normalize_feature(&input, SourceCrs::Wgs84).unwrap();
        let twice = n.normalize_feature(&once.geometry, SourceCrs::Wgs84).unwrap();
        assert_eq!(once.geometry, twice.geometry);
    }

    #[test]
    fn output_has_canonical_winding_and_precision() {
        let n = normalizer();
        // Clockwise input must flip.
        let mut ring = square(-84.5, 38.0, 0.01).0[0].exterior().0.clone();
        ring.reverse();
        let input = MultiPolygon(vec![Polygon::new(LineString(ring), vec![])]);
        let out = n.normalize_feature(&input, SourceCrs::Wgs84).unwrap();
        assert!(winding_is_canonical(&out.geometry));
        for coord in out.geometry.0[0].exterior().coords() {
            assert!(has_precision(coord.x, 6));
            assert!(has_precision(coord.y, 6));
        }
    }

    #[test]
    fn bow_tie_is_repaired_with_flag() {
        let n = normalizer();
        let bow_tie = MultiPolygon(vec![Polygon::new(
            LineString(vec![
                Coord { x: 0.0, y: 0.0 },
                Coord { x: 1.0, y: 1.0 },
                Coord { x: 1.0, y: 0.0 },
                Coord { x: 0.0, y: 1.0 },
                Coord { x: 0.0, y: 0.0 },
            ]),
            vec![],
        )]);
        let out = n.normalize_feature(&bow_tie, SourceCrs::Wgs84).unwrap();
        assert!(out.repaired);
        assert_eq!(out.geometry.0.len(), 2);
        assert!(out.geometry.0.iter().all(polygon_is_simple));
        assert!(winding_is_canonical(&out.geometry));
    }

    #[test]
    fn simplification_strips_collinear_vertices() {
        let n = normalizer();
        // A square with a redundant midpoint on one edge.
        let input = MultiPolygon(vec![Polygon::new(
            LineString(vec![
                Coord { x: 0.0, y: 0.0 },
                Coord { x: 0.05, y: 0.0 },
                Coord { x: 0.1, y: 0.0 },
                Coord { x: 0.1, y: 0.1 },
                Coord { x: 0.0, y: 0.1 },
                Coord { x: 0.0, y: 0.0 },
            ]),
            vec![],
        )]);
        let out = n.normalize_feature(&input, SourceCrs::Wgs84).unwrap();
        assert_eq!(out.geometry.0[0].exterior().0.len(), 5);
        assert!(!out.simplify_backoff);
    }

    #[test]
    fn degenerate_feature_rejected() {
        let n = normalizer();
        let sliver = MultiPolygon(vec![Polygon::new(
            LineString(vec![
                Coord { x: 0.0, y: 0.0 },
                Coord { x: 1.0, y: 0.0 },
                Coord { x: 2.0, y: 0.0 },
                Coord { x: 0.0, y: 0.0 },
            ]),
            vec![],
        )]);
        assert_eq!(
            n.normalize_feature(&sliver, SourceCrs::Wgs84),
            Err(RejectionReason::DegenerateRing)
        );
    }

    #[test]
    fn undeclared_crs_rejects_dataset() {
        use crate::test_support::{dataset_with_squares, provenance_fixture};
        let mut provenance = provenance_fixture("US/HI/honolulu");
        provenance.declared_crs = None;
        let dataset = dataset_with_squares("t", provenance, &[(-157.9, 21.4)], 0.02);
        assert_eq!(
            normalizer().normalize_dataset(&dataset),
            Err(RejectionReason::UnknownCrs("undeclared".into()))
        );

        let mut provenance = provenance_fixture("US/HI/honolulu");
        provenance.declared_crs = Some("EPSG:2263".into());
        let dataset = dataset_with_squares("t", provenance, &[(-157.9, 21.4)], 0.02);
        assert_eq!(
            normalizer().normalize_dataset(&dataset),
            Err(RejectionReason::UnknownCrs("EPSG:2263".into()))
        );
    }
}
