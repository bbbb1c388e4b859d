//! Deterministic district identity.
//!
//! `district_id` is the leading 16 bytes of SHA-256 over the canonical
//! jurisdiction path, the normalized local name, and the canonical geometry
//! bytes. Two distinct districts mapping to one id is cryptographically
//! negligible but fatal, so every assignment goes through a per-run
//! collision check.

use ahash::AHashMap;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::types::{DistrictId, JurisdictionPath};

/// Compute a district id from the canonical inputs.
pub fn district_id(
    jurisdiction: &JurisdictionPath,
    canonical_name: &str,
    canonical_geometry_bytes: &[u8],
) -> DistrictId {
    let mut hasher = Sha256::new();
    hasher.update(jurisdiction.canonical().as_bytes());
    hasher.update(canonical_name.as_bytes());
    hasher.update(canonical_geometry_bytes);
    let digest: [u8; 32] = hasher.finalize().into();
    DistrictId::from_digest(&digest)
}

/// Full report emitted when two distinct districts hash to the same id.
#[derive(Debug, Clone, Serialize, Error)]
#[error("district id collision on {district_id}: {first_path}/{first_name} vs {second_path}/{second_name}")]
pub struct CollisionReport {
    pub district_id: DistrictId,
    pub first_path: String,
    pub first_name: String,
    pub second_path: String,
    pub second_name: String,
}

/// Assigns ids and enforces uniqueness within a run.
#[derive(Default)]
pub struct IdentityBuilder {
    // id → (jurisdiction canonical, canonical name, geometry hash)
    seen: AHashMap<DistrictId, (String, String, [u8; 32])>,
}

/// Outcome of an id assignment: a fresh id, or an exact duplicate of a
/// district already assigned (same content, same id).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assignment {
    Fresh(DistrictId),
    Duplicate(DistrictId),
}

impl Assignment {
    #[inline]
    pub fn id(&self) -> DistrictId {
        match self {
            Assignment::Fresh(id) | Assignment::Duplicate(id) => *id,
        }
    }
}

impl IdentityBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign an id, aborting the run on a collision between distinct
    /// districts. Byte-identical districts are duplicates, not collisions.
    pub fn assign(
        &mut self,
        jurisdiction: &JurisdictionPath,
        canonical_name: &str,
        canonical_geometry_bytes: &[u8],
    ) -> Result<Assignment, CollisionReport> {
        let id = district_id(jurisdiction, canonical_name, canonical_geometry_bytes);
        let geometry_hash: [u8; 32] = Sha256::digest(canonical_geometry_bytes).into();
        let path = jurisdiction.canonical();

        match self.seen.get(&id) {
            None => {
                self.seen
                    .insert(id, (path, canonical_name.to_string(), geometry_hash));
                Ok(Assignment::Fresh(id))
            }
            Some((seen_path, seen_name, seen_geometry)) => {
                if seen_path == &path
                    && seen_name == canonical_name
                    && seen_geometry == &geometry_hash
                {
                    Ok(Assignment::Duplicate(id))
                } else {
                    Err(CollisionReport {
                        district_id: id,
                        first_path: seen_path.clone(),
                        first_name: seen_name.clone(),
                        second_path: path,
                        second_name: canonical_name.to_string(),
                    })
                }
            }
        }
    }

    #[inline]
    pub fn assigned(&self) -> usize {
        self.seen.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> JurisdictionPath {
        JurisdictionPath::parse(s).unwrap()
    }

    #[test]
    fn id_is_deterministic_and_input_sensitive() {
        let hon = path("US/HI/honolulu");
        let geom = b"[[[0,0],[1,0],[1,1],[0,0]]]";
        assert_eq!(district_id(&hon, "district 1", geom), district_id(&hon, "district 1", geom));
        assert_ne!(district_id(&hon, "district 1", geom), district_id(&hon, "district 2", geom));
        assert_ne!(
            district_id(&hon, "district 1", geom),
            district_id(&path("US/HI"), "district 1", geom)
        );
    }

    #[test]
    fn duplicate_content_is_not_a_collision() {
        let mut builder = IdentityBuilder::new();
        let hon = path("US/HI/honolulu");
        let first = builder.assign(&hon, "district 1", b"geom").unwrap();
        let second = builder.assign(&hon, "district 1", b"geom").unwrap();
        assert!(matches!(first, Assignment::Fresh(_)));
        assert!(matches!(second, Assignment::Duplicate(_)));
        assert_eq!(first.id(), second.id());
        assert_eq!(builder.assigned(), 1);
    }

    #[test]
    fn distinct_districts_get_distinct_ids() {
        let mut builder = IdentityBuilder::new();
        let hon = path("US/HI/honolulu");
        let a = builder.assign(&hon, "district 1", b"geom-a").unwrap().id();
        let b = builder.assign(&hon, "district 2", b"geom-b").unwrap().id();
        assert_ne!(a, b);
        assert_eq!(builder.assigned(), 2);
    }
}
