use anyhow::{Context, Result};
use geo::{Coord, LineString, MultiPolygon, Polygon};
use serde_json::{Map, Value};

use crate::provenance::ProvenanceRecord;

/// One raw polygonal feature as delivered by the acquisition layer.
#[derive(Debug, Clone)]
pub struct RawFeature {
    pub geometry: MultiPolygon<f64>,
    pub properties: Map<String, Value>,
}

impl RawFeature {
    /// Best-effort display name from the conventional property keys.
    pub fn local_name(&self) -> Option<String> {
        const NAME_KEYS: [&str; 8] = [
            "name", "NAME", "district_name", "DISTRICT_NAME", "label", "LABEL", "ward", "WARD",
        ];
        for key in NAME_KEYS {
            if let Some(Value::String(s)) = self.properties.get(key) {
                let trimmed = s.trim();
                if !trimmed.is_empty() {
                    return Some(trimmed.to_string());
                }
            }
        }
        // Numeric district designators get a synthesized name.
        const NUMBER_KEYS: [&str; 6] = [
            "district", "DISTRICT", "district_number", "DISTRICT_NUMBER", "number", "NUMBER",
        ];
        for key in NUMBER_KEYS {
            match self.properties.get(key) {
                Some(Value::Number(n)) => return Some(format!("district {n}")),
                Some(Value::String(s)) if !s.trim().is_empty() => {
                    return Some(format!("district {}", s.trim()))
                }
                _ => {}
            }
        }
        None
    }
}

/// A raw dataset: title, declared layer metadata, polygonal features, and
/// the provenance record that accompanies it through every stage.
///
/// Owned exclusively by the stage currently processing it.
#[derive(Debug, Clone)]
pub struct RawDataset {
    pub title: String,
    pub features: Vec<RawFeature>,
    pub provenance: ProvenanceRecord,
}

impl RawDataset {
    /// Parse a feature collection in the geospatial-JSON convention.
    ///
    /// Only Polygon and MultiPolygon geometries are polygonal input;
    /// features with any other (or missing) geometry are returned in the
    /// skipped count so the caller can record a malformed-geometry warning.
    pub fn from_feature_collection(
        title: impl Into<String>,
        collection: &Value,
        provenance: ProvenanceRecord,
    ) -> Result<(Self, usize)> {
        let features_json = collection["features"]
            .as_array()
            .context("feature collection has no features array")?;

        let mut features = Vec::with_capacity(features_json.len());
        let mut skipped = 0usize;
        for feature in features_json {
            let properties = feature["properties"]
                .as_object()
                .cloned()
                .unwrap_or_default();
            match parse_geometry(&feature["geometry"]) {
                Some(geometry) if !geometry.0.is_empty() => {
                    features.push(RawFeature { geometry, properties })
                }
                _ => skipped += 1,
            }
        }

        Ok((
            Self {
                title: title.into(),
                features,
                provenance,
            },
            skipped,
        ))
    }
}

/// Parse a geospatial-JSON geometry object into a MultiPolygon. Polygons are
/// lifted into single-element MultiPolygons; anything else is None.
fn parse_geometry(geometry: &Value) -> Option<MultiPolygon<f64>> {
    let ty = geometry["type"].as_str()?;
    let coords = geometry["coordinates"].as_array()?;
    match ty {
        "Polygon" => parse_polygon_coords(coords).map(|p| MultiPolygon(vec![p])),
        "MultiPolygon" => {
            let polygons: Vec<Polygon<f64>> = coords
                .iter()
                .filter_map(|poly| poly.as_array().and_then(|c| parse_polygon_coords(c)))
                .collect();
            (!polygons.is_empty()).then_some(MultiPolygon(polygons))
        }
        _ => None,
    }
}

/// Polygon coordinates: [exterior, hole, hole, ...], each a ring of [x, y].
fn parse_polygon_coords(rings: &[Value]) -> Option<Polygon<f64>> {
    let mut parsed = rings.iter().filter_map(|r| parse_ring(r.as_array()?));
    let exterior = parsed.next()?;
    let interiors: Vec<LineString<f64>> = parsed.collect();
    Some(Polygon::new(exterior, interiors))
}

fn parse_ring(coords: &[Value]) -> Option<LineString<f64>> {
    let mut points = Vec::with_capacity(coords.len());
    for pair in coords {
        let pair = pair.as_array()?;
        let x = pair.first()?.as_f64()?;
        let y = pair.get(1)?.as_f64()?;
        points.push(Coord { x, y });
    }
    // Close the ring if the source left it open.
    if !points.is_empty() && points[0] != points[points.len() - 1] {
        points.push(points[0]);
    }
    (points.len() >= 4).then(|| LineString(points))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::provenance_fixture;
    use serde_json::json;

    #[test]
    fn parses_polygon_and_multipolygon() {
        let collection = json!({
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "geometry": {
                        "type": "Polygon",
                        "coordinates": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]]]
                    },
                    "properties": {"name": "Ward 1"}
                },
                {
                    "type": "Feature",
                    "geometry": {
                        "type": "MultiPolygon",
                        "coordinates": [[[[2.0, 2.0], [3.0, 2.0], [3.0, 3.0], [2.0, 2.0]]]]
                    },
                    "properties": {"district": 7}
                },
                {
                    "type": "Feature",
                    "geometry": {"type": "Point", "coordinates": [0.0, 0.0]},
                    "properties": {}
                }
            ]
        });

        let (dataset, skipped) =
            RawDataset::from_feature_collection("t", &collection, provenance_fixture("US/KY"))
                .unwrap();
        assert_eq!(dataset.features.len(), 2);
        assert_eq!(skipped, 1);
        assert_eq!(dataset.features[0].local_name().as_deref(), Some("Ward 1"));
        assert_eq!(dataset.features[1].local_name().as_deref(), Some("district 7"));
    }

    #[test]
    fn open_rings_are_closed() {
        let collection = json!({
            "features": [{
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]]
                },
                "properties": {}
            }]
        });
        let (dataset, _) =
            RawDataset::from_feature_collection("t", &collection, provenance_fixture("US/KY"))
                .unwrap();
        let ring = dataset.features[0].geometry.0[0].exterior();
        assert_eq!(ring.0.first(), ring.0.last());
        assert_eq!(ring.0.len(), 5);
    }
}
