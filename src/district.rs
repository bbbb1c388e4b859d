use anyhow::Result;
use geo::{BoundingRect, Coord, LineString, MultiPolygon, Polygon, Rect};
use serde::{Deserialize, Serialize};

use crate::provenance::ProvenanceRecord;
use crate::types::{DistrictId, JurisdictionPath, QualityTier, UniversalType};

/// Nested coordinate form shared by the canonical bytes and the serde
/// representation: polygons → rings (exterior first) → [lon, lat] pairs.
pub type GeometryCoords = Vec<Vec<Vec<[f64; 2]>>>;

pub fn geometry_to_coords(mp: &MultiPolygon<f64>) -> GeometryCoords {
    mp.0.iter()
        .map(|poly| {
            std::iter::once(poly.exterior())
                .chain(poly.interiors().iter())
                .map(|ring| ring.0.iter().map(|c| [c.x, c.y]).collect())
                .collect()
        })
        .collect()
}

pub fn coords_to_geometry(coords: &GeometryCoords) -> Result<MultiPolygon<f64>> {
    let mut polygons = Vec::with_capacity(coords.len());
    for rings in coords {
        let mut rings = rings.iter().map(|ring| {
            LineString(ring.iter().map(|[x, y]| Coord { x: *x, y: *y }).collect())
        });
        let exterior = rings
            .next()
            .ok_or_else(|| anyhow::anyhow!("polygon without rings"))?;
        polygons.push(Polygon::new(exterior, rings.collect()));
    }
    Ok(MultiPolygon(polygons))
}

/// Serde adapter storing geometry in the nested coordinate form.
mod geometry_codec {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(mp: &MultiPolygon<f64>, s: S) -> Result<S::Ok, S::Error> {
        geometry_to_coords(mp).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<MultiPolygon<f64>, D::Error> {
        let coords = GeometryCoords::deserialize(d)?;
        coords_to_geometry(&coords).map_err(serde::de::Error::custom)
    }
}

/// Lowercase, trim, and collapse internal whitespace. This is the normalized
/// name fed to the district id hash.
pub fn canonical_name(raw: &str) -> String {
    raw.split_whitespace()
        .map(|word| word.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Canonical geometry bytes: JSON of the nested coordinate form. Rings are
/// already ordered (exterior first) and coordinates carry fixed precision
/// from normalization, so the serialization is byte-stable across reruns.
pub fn canonical_geometry_bytes(mp: &MultiPolygon<f64>) -> Vec<u8> {
    serde_json::to_vec(&geometry_to_coords(mp)).expect("geometry coordinates serialize")
}

/// Fields committed by the metadata hash, serialized in declaration order.
#[derive(Serialize)]
struct CanonicalMetadata<'a> {
    universal_type: &'a str,
    jurisdiction_path: String,
    canonical_name: &'a str,
}

/// A district after validation and normalization: canonical geometry plus
/// the identity and provenance that commit it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedDistrict {
    pub district_id: DistrictId,
    pub universal_type: UniversalType,
    pub jurisdiction: JurisdictionPath,
    pub local_name: String,
    pub canonical_name: String,
    #[serde(with = "geometry_codec")]
    pub geometry: MultiPolygon<f64>,
    /// [min_lon, min_lat, max_lon, max_lat]; always matches the geometry.
    pub bbox: [f64; 4],
    pub quality: QualityTier,
    pub provenance: ProvenanceRecord,
}

impl NormalizedDistrict {
    pub fn canonical_geometry_bytes(&self) -> Vec<u8> {
        canonical_geometry_bytes(&self.geometry)
    }

    /// Canonical metadata bytes for the Merkle leaf.
    pub fn canonical_metadata_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(&CanonicalMetadata {
            universal_type: self.universal_type.to_str(),
            jurisdiction_path: self.jurisdiction.canonical(),
            canonical_name: &self.canonical_name,
        })
        .expect("metadata serializes")
    }

    pub fn bbox_rect(&self) -> Rect<f64> {
        Rect::new(
            Coord { x: self.bbox[0], y: self.bbox[1] },
            Coord { x: self.bbox[2], y: self.bbox[3] },
        )
    }
}

/// Bounding box of a geometry in the serialized [min_lon, min_lat, max_lon,
/// max_lat] form.
pub fn geometry_bbox(mp: &MultiPolygon<f64>) -> Option<[f64; 4]> {
    mp.bounding_rect()
        .map(|rect| [rect.min().x, rect.min().y, rect.max().x, rect.max().y])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::district_fixture;

    #[test]
    fn canonical_name_collapses_whitespace() {
        assert_eq!(canonical_name("  Council   District  7 "), "council district 7");
        assert_eq!(canonical_name("WARD 3"), "ward 3");
    }

    #[test]
    fn serde_round_trip_is_identity() {
        let district = district_fixture("US/HI/honolulu", "District 1", (-157.9, 21.4));
        let json = serde_json::to_vec(&district).unwrap();
        let back: NormalizedDistrict = serde_json::from_slice(&json).unwrap();
        assert_eq!(back, district);
    }

    #[test]
    fn canonical_geometry_bytes_are_stable() {
        let district = district_fixture("US/HI/honolulu", "District 1", (-157.9, 21.4));
        assert_eq!(
            district.canonical_geometry_bytes(),
            district.canonical_geometry_bytes()
        );
        let other = district_fixture("US/HI/honolulu", "District 2", (-157.8, 21.45));
        assert_ne!(
            district.canonical_geometry_bytes(),
            other.canonical_geometry_bytes()
        );
    }

    #[test]
    fn bbox_matches_geometry() {
        let district = district_fixture("US/HI/honolulu", "District 1", (-157.9, 21.4));
        assert_eq!(Some(district.bbox), geometry_bbox(&district.geometry));
    }
}
