//! Shared fixtures for unit tests.

use chrono::{TimeZone, Utc};
use geo::{Coord, LineString, MultiPolygon, Polygon};
use serde_json::Map;

use crate::district::{canonical_geometry_bytes, canonical_name, geometry_bbox, NormalizedDistrict};
use crate::identity::district_id;
use crate::provenance::{AcquisitionMethod, ProvenanceRecord};
use crate::raw::{RawDataset, RawFeature};
use crate::shard::DatasetCandidate;
use crate::types::{AuthorityTier, JurisdictionPath, QualityTier, UniversalType};

pub fn provenance_fixture(path: &str) -> ProvenanceRecord {
    ProvenanceRecord {
        source_url: format!("https://gis.example.gov/{path}/query"),
        authority_tier: AuthorityTier::Municipal,
        jurisdiction: JurisdictionPath::parse(path).unwrap(),
        observation_timestamp: Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
        acquisition_method: AcquisitionMethod::RestQuery,
        response_hash: "0".repeat(64),
        http_status: 200,
        declared_feature_count: None,
        declared_geometry_type: Some("Polygon".into()),
        declared_crs: Some("EPSG:4326".into()),
        quality_flags: Vec::new(),
    }
}

pub fn square_geometry(cx: f64, cy: f64, half: f64) -> MultiPolygon<f64> {
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

pub fn dataset_with_squares(
    title: &str,
    provenance: ProvenanceRecord,
    centers: &[(f64, f64)],
    half: f64,
) -> RawDataset {
    let features = centers
        .iter()
        .enumerate()
        .map(|(i, (cx, cy))| {
            let mut properties = Map::new();
            properties.insert(
                "name".into(),
                serde_json::Value::String(format!("District {}", i + 1)),
            );
            RawFeature { geometry: square_geometry(*cx, *cy, half), properties }
        })
        .collect();
    RawDataset { title: title.into(), features, provenance }
}

pub fn dataset_fixture(title: &str, provenance: ProvenanceRecord) -> RawDataset {
    let center = provenance
        .jurisdiction
        .subdivision()
        .map(|_| (-157.9, 21.4))
        .unwrap_or((-100.0, 40.0));
    dataset_with_squares(title, provenance, &[center], 0.02)
}

pub fn district_fixture(path: &str, name: &str, center: (f64, f64)) -> NormalizedDistrict {
    let jurisdiction = JurisdictionPath::parse(path).unwrap();
    let geometry = square_geometry(center.0, center.1, 0.02);
    let canonical = canonical_name(name);
    let id = district_id(&jurisdiction, &canonical, &canonical_geometry_bytes(&geometry));
    let bbox = geometry_bbox(&geometry).unwrap();
    NormalizedDistrict {
        district_id: id,
        universal_type: UniversalType::CityCouncil,
        jurisdiction,
        local_name: name.into(),
        canonical_name: canonical,
        geometry,
        bbox,
        quality: QualityTier::Silver,
        provenance: provenance_fixture(path),
    }
}

pub fn candidate_fixture(
    path: &str,
    tier: AuthorityTier,
    response_hash: &str,
    year: i32,
) -> DatasetCandidate {
    let mut provenance = provenance_fixture(path);
    provenance.authority_tier = tier;
    provenance.response_hash = response_hash.into();
    provenance.observation_timestamp = Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).unwrap();
    DatasetCandidate {
        universal_type: UniversalType::CityCouncil,
        provenance,
        districts: vec![district_fixture(path, "District 1", (-84.5, 38.0))],
    }
}
