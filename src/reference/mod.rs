//! Reference tables shipped with the pipeline: authoritative bounding boxes,
//! expected district counts, region adjacency, and the local-type mapping
//! table. Immutable after process start; concurrent reads need no locking.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use geo::{Coord, Rect};
use serde::Deserialize;

use crate::types::{CountryCode, JurisdictionPath, UniversalType};

const COUNTRIES_JSON: &str = include_str!("data/countries.json");
const SUBDIVISIONS_JSON: &str = include_str!("data/subdivisions.json");
const PLACES_JSON: &str = include_str!("data/places.json");
const COUNTS_JSON: &str = include_str!("data/counts.json");
const REGIONS_JSON: &str = include_str!("data/regions.json");
const TYPE_MAPPINGS_JSON: &str = include_str!("data/type_mappings.json");

#[derive(Debug, Deserialize)]
struct CountryRow {
    #[allow(dead_code)]
    name: String,
    region: String,
    bbox: [f64; 4],
}

#[derive(Debug, Deserialize)]
struct PlaceRow {
    parent: String,
    bbox: [f64; 4],
}

#[derive(Debug, Deserialize)]
struct CountRow {
    jurisdiction: String,
    universal_type: String,
    expected: usize,
}

#[derive(Debug, Deserialize)]
struct RegionsFile {
    regions: Vec<String>,
    adjacency: BTreeMap<String, Vec<String>>,
    global_region: String,
}

#[derive(Debug, Deserialize)]
struct TypeMappingRow {
    keywords: Vec<String>,
    universal_type: String,
}

/// One entry in the local-type mapping table: any keyword hit maps the
/// dataset to the universal tag.
#[derive(Debug, Clone)]
pub struct TypeMapping {
    pub keywords: Vec<String>,
    pub universal_type: UniversalType,
}

/// All reference data, loaded once at startup.
#[derive(Debug)]
pub struct ReferenceData {
    country_bboxes: BTreeMap<CountryCode, Rect<f64>>,
    country_regions: BTreeMap<CountryCode, String>,
    subdivision_bboxes: BTreeMap<String, Rect<f64>>,
    place_bboxes: BTreeMap<String, Rect<f64>>,
    place_parents: BTreeMap<String, String>,
    expected_counts: BTreeMap<(String, UniversalType), usize>,
    regions: Vec<String>,
    region_adjacency: BTreeMap<String, Vec<String>>,
    global_region: String,
    type_mappings: Vec<TypeMapping>,
}

fn rect(bbox: [f64; 4]) -> Rect<f64> {
    Rect::new(
        Coord { x: bbox[0], y: bbox[1] },
        Coord { x: bbox[2], y: bbox[3] },
    )
}

impl ReferenceData {
    /// Parse the embedded tables. Fails fast on malformed data or a cycle in
    /// the place parent table.
    pub fn load() -> Result<Self> {
        let countries: BTreeMap<String, CountryRow> =
            serde_json::from_str(COUNTRIES_JSON).context("failed to parse countries table")?;
        let subdivisions: BTreeMap<String, [f64; 4]> =
            serde_json::from_str(SUBDIVISIONS_JSON).context("failed to parse subdivisions table")?;
        let places: BTreeMap<String, PlaceRow> =
            serde_json::from_str(PLACES_JSON).context("failed to parse places table")?;
        let counts: Vec<CountRow> =
            serde_json::from_str(COUNTS_JSON).context("failed to parse counts table")?;
        let regions: RegionsFile =
            serde_json::from_str(REGIONS_JSON).context("failed to parse regions table")?;
        let mappings: Vec<TypeMappingRow> =
            serde_json::from_str(TYPE_MAPPINGS_JSON).context("failed to parse type mappings")?;

        let mut country_bboxes = BTreeMap::new();
        let mut country_regions = BTreeMap::new();
        for (code, row) in countries {
            let code = CountryCode::new(&code)?;
            country_bboxes.insert(code, rect(row.bbox));
            country_regions.insert(code, row.region);
        }

        let subdivision_bboxes = subdivisions
            .into_iter()
            .map(|(key, bbox)| (key, rect(bbox)))
            .collect();

        let mut place_bboxes = BTreeMap::new();
        let mut place_parents = BTreeMap::new();
        for (key, row) in places {
            place_bboxes.insert(key.clone(), rect(row.bbox));
            place_parents.insert(key, row.parent);
        }
        check_parent_cycles(&place_parents)?;

        let mut expected_counts = BTreeMap::new();
        for row in counts {
            let ty = UniversalType::from_str(&row.universal_type)
                .with_context(|| format!("unknown universal type: {}", row.universal_type))?;
            expected_counts.insert((row.jurisdiction, ty), row.expected);
        }

        let mut type_mappings = Vec::with_capacity(mappings.len());
        for row in mappings {
            type_mappings.push(TypeMapping {
                keywords: row.keywords,
                universal_type: UniversalType::from_str(&row.universal_type)
                    .with_context(|| format!("unknown universal type: {}", row.universal_type))?,
            });
        }

        Ok(Self {
            country_bboxes,
            country_regions,
            subdivision_bboxes,
            place_bboxes,
            place_parents,
            expected_counts,
            regions: regions.regions,
            region_adjacency: regions.adjacency,
            global_region: regions.global_region,
            type_mappings,
        })
    }

    #[inline]
    pub fn country_bbox(&self, code: CountryCode) -> Option<&Rect<f64>> {
        self.country_bboxes.get(&code)
    }

    pub fn country_region(&self, code: CountryCode) -> Option<&str> {
        self.country_regions.get(&code).map(String::as_str)
    }

    /// Subdivision bbox keyed `CC/SUB` with the subdivision uppercased.
    pub fn subdivision_bbox(&self, country: CountryCode, subdivision: &str) -> Option<&Rect<f64>> {
        self.subdivision_bboxes
            .get(&format!("{}/{}", country, subdivision.to_ascii_uppercase()))
    }

    /// Place bbox keyed by the canonical jurisdiction path.
    pub fn place_bbox(&self, path: &JurisdictionPath) -> Option<&Rect<f64>> {
        self.place_bboxes.get(&path.canonical())
    }

    pub fn expected_count(&self, path: &JurisdictionPath, ty: UniversalType) -> Option<usize> {
        self.expected_counts.get(&(path.canonical(), ty)).copied()
    }

    /// Subdivisions of one country whose bbox intersects the given rect;
    /// used by contamination detection.
    pub fn subdivisions_intersecting(
        &self,
        country: CountryCode,
        rect: &Rect<f64>,
    ) -> Vec<&str> {
        let prefix = format!("{country}/");
        self.subdivision_bboxes
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .filter(|(_, bbox)| rects_intersect(bbox, rect))
            .map(|(key, _)| &key[prefix.len()..])
            .collect()
    }

    #[inline]
    pub fn regions(&self) -> &[String] {
        &self.regions
    }

    /// Neighbouring regions in fallback preference order.
    pub fn region_neighbours(&self, region: &str) -> &[String] {
        self.region_adjacency
            .get(region)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    #[inline]
    pub fn global_region(&self) -> &str {
        &self.global_region
    }

    #[inline]
    pub fn type_mappings(&self) -> &[TypeMapping] {
        &self.type_mappings
    }

    /// Map a dataset title (plus any declared layer type) to the universal
    /// taxonomy. Unmatched text falls through to Other.
    pub fn classify_type(&self, text: &str) -> UniversalType {
        let lower = text.to_lowercase();
        for mapping in &self.type_mappings {
            if mapping.keywords.iter().any(|kw| lower.contains(kw.as_str())) {
                return mapping.universal_type;
            }
        }
        UniversalType::Other
    }
}

fn rects_intersect(a: &Rect<f64>, b: &Rect<f64>) -> bool {
    a.min().x <= b.max().x && b.min().x <= a.max().x && a.min().y <= b.max().y && b.min().y <= a.max().y
}

/// The place table is a flat parent-reference table; a cycle would hang
/// jurisdiction walks, so it is rejected at load.
fn check_parent_cycles(parents: &BTreeMap<String, String>) -> Result<()> {
    for start in parents.keys() {
        let mut seen = vec![start.as_str()];
        let mut cursor = start.as_str();
        while let Some(parent) = parents.get(cursor) {
            if seen.contains(&parent.as_str()) {
                anyhow::bail!("cycle in jurisdiction parent table at {parent}");
            }
            seen.push(parent);
            cursor = parent;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_embedded_tables() {
        let refs = ReferenceData::load().unwrap();
        let us = CountryCode::new("US").unwrap();
        assert!(refs.country_bbox(us).is_some());
        assert_eq!(refs.country_region(us), Some("americas"));
        assert!(refs.subdivision_bbox(us, "ky").is_some());
        assert!(refs.subdivision_bbox(us, "HI").is_some());
        assert_eq!(refs.regions().len(), 3);
    }

    #[test]
    fn honolulu_expected_count() {
        let refs = ReferenceData::load().unwrap();
        let path = JurisdictionPath::parse("US/HI/honolulu").unwrap();
        assert_eq!(refs.place_bbox(&path).is_some(), true);
        assert_eq!(refs.expected_count(&path, UniversalType::CityCouncil), Some(9));
    }

    #[test]
    fn classify_maps_council_and_precinct() {
        let refs = ReferenceData::load().unwrap();
        assert_eq!(refs.classify_type("City Council Districts"), UniversalType::CityCouncil);
        assert_eq!(refs.classify_type("Police Precinct Map"), UniversalType::PolicePrecinct);
        assert_eq!(refs.classify_type("Urban Tree Canopy"), UniversalType::Other);
    }

    #[test]
    fn kentucky_florida_do_not_touch() {
        let refs = ReferenceData::load().unwrap();
        let us = CountryCode::new("US").unwrap();
        let ky = refs.subdivision_bbox(us, "KY").unwrap();
        let fl = refs.subdivision_bbox(us, "FL").unwrap();
        assert!(!rects_intersect(ky, fl));
    }

    #[test]
    fn detects_parent_cycle() {
        let mut parents = BTreeMap::new();
        parents.insert("a".to_string(), "b".to_string());
        parents.insert("b".to_string(), "a".to_string());
        assert!(check_parent_cycles(&parents).is_err());
    }
}
