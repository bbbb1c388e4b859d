//! Persistent spatial index: a primary table keyed by district id plus an
//! R-tree over district bounding boxes.
//!
//! The R-tree answers `(lon, lat) → candidate district ids`; callers (or
//! [`SpatialIndex::locate`]) finish with exact point-in-polygon over the
//! candidates. Bulk loading keeps point queries sublinear at country scale.
//!
//! Build determinism is logical, not byte-level across implementations: the
//! sorted `(district_id, geometry)` set is hashed into `content_hash` so two
//! builders can cross-check their indexes without comparing files.

mod entry;
mod file;

pub use file::{read_index_bytes, write_index_bytes};

use std::collections::BTreeMap;

use anyhow::{ensure, Result};
use geo::{Contains, Point};
use rstar::{RTree, AABB};
use sha2::{Digest, Sha256};

use crate::district::NormalizedDistrict;
use crate::types::DistrictId;
use entry::IndexEntry;

pub struct SpatialIndex {
    rtree: RTree<IndexEntry>,
    primary: BTreeMap<DistrictId, NormalizedDistrict>,
    content_hash: [u8; 32],
}

impl SpatialIndex {
    /// Build from normalized districts. Fails if ids repeat or if the R-tree
    /// and primary table end up with different cardinalities.
    pub fn build(districts: Vec<NormalizedDistrict>) -> Result<Self> {
        let input_len = districts.len();
        let mut primary = BTreeMap::new();
        for district in districts {
            let id = district.district_id;
            ensure!(
                primary.insert(id, district).is_none(),
                "duplicate district id in index build: {id}"
            );
        }
        ensure!(primary.len() == input_len, "district set changed during build");

        let entries: Vec<IndexEntry> = primary
            .values()
            .map(|d| IndexEntry::new(d.district_id, d.bbox_rect()))
            .collect();
        let rtree = RTree::bulk_load(entries);
        ensure!(
            rtree.size() == primary.len(),
            "index invariant violated: {} R-tree entries vs {} primary rows",
            rtree.size(),
            primary.len()
        );

        let content_hash = content_hash(primary.values());
        Ok(Self { rtree, primary, content_hash })
    }

    /// Candidate districts whose bbox contains the point. Exact containment
    /// is the caller's second step.
    pub fn candidates(&self, lon: f64, lat: f64) -> Vec<DistrictId> {
        self.rtree
            .locate_in_envelope_intersecting(&AABB::from_point([lon, lat]))
            .map(|entry| entry.id())
            .collect()
    }

    /// Exact lookup: candidates filtered by point-in-polygon.
    pub fn locate(&self, lon: f64, lat: f64) -> Vec<&NormalizedDistrict> {
        let point = Point::new(lon, lat);
        self.candidates(lon, lat)
            .into_iter()
            .filter_map(|id| self.primary.get(&id))
            .filter(|district| district.geometry.contains(&point))
            .collect()
    }

    #[inline]
    pub fn get(&self, id: &DistrictId) -> Option<&NormalizedDistrict> {
        self.primary.get(id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.primary.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.primary.is_empty()
    }

    /// District ids in ascending order.
    pub fn district_ids(&self) -> impl Iterator<Item = &DistrictId> {
        self.primary.keys()
    }

    pub fn districts(&self) -> impl Iterator<Item = &NormalizedDistrict> {
        self.primary.values()
    }

    /// Hash of the sorted district set, for cross-implementation checks.
    #[inline]
    pub fn content_hash(&self) -> &[u8; 32] {
        &self.content_hash
    }

    pub fn content_hash_hex(&self) -> String {
        hex::encode(self.content_hash)
    }
}

/// SHA-256 over `(district_id ‖ SHA-256(canonical geometry))` in id order.
fn content_hash<'a>(districts: impl Iterator<Item = &'a NormalizedDistrict>) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for district in districts {
        hasher.update(district.district_id.as_bytes());
        let geometry_hash: [u8; 32] = Sha256::digest(district.canonical_geometry_bytes()).into();
        hasher.update(geometry_hash);
    }
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::district_fixture;

    fn three_districts() -> Vec<NormalizedDistrict> {
        vec![
            district_fixture("US/HI/honolulu", "District 1", (-157.90, 21.40)),
            district_fixture("US/HI/honolulu", "District 2", (-157.80, 21.45)),
            district_fixture("US/HI/honolulu", "District 3", (-157.70, 21.50)),
        ]
    }

    #[test]
    fn point_lookup_finds_containing_district() {
        let index = SpatialIndex::build(three_districts()).unwrap();
        assert_eq!(index.len(), 3);

        let hits = index.locate(-157.90, 21.40);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].local_name, "District 1");

        // Outside every district: candidates may or may not be empty, exact
        // containment must be.
        assert!(index.locate(-157.0, 21.0).is_empty());
    }

    #[test]
    fn candidates_superset_of_exact_hits() {
        let index = SpatialIndex::build(three_districts()).unwrap();
        let candidates = index.candidates(-157.80, 21.45);
        assert!(!candidates.is_empty());
        let exact = index.locate(-157.80, 21.45);
        for hit in exact {
            assert!(candidates.contains(&hit.district_id));
        }
    }

    #[test]
    fn duplicate_ids_fail_build() {
        let d = district_fixture("US/HI/honolulu", "District 1", (-157.90, 21.40));
        assert!(SpatialIndex::build(vec![d.clone(), d]).is_err());
    }

    #[test]
    fn content_hash_tracks_district_set_not_input_order() {
        let mut districts = three_districts();
        let forward = SpatialIndex::build(districts.clone()).unwrap();
        districts.reverse();
        let reversed = SpatialIndex::build(districts).unwrap();
        assert_eq!(forward.content_hash(), reversed.content_hash());

        let smaller = SpatialIndex::build(three_districts()[..2].to_vec()).unwrap();
        assert_ne!(forward.content_hash(), smaller.content_hash());
    }
}
