//! Two-level Merkle commitment over country shards.
//!
//! Per country: leaves `keccak(district_id ‖ keccak(geometry) ‖
//! keccak(metadata))` over districts sorted by id, built into a balanced
//! tree with odd nodes duplicated right. Globally: leaves
//! `keccak(country_code ‖ country_root)` sorted by country code. The same
//! district set always reproduces the same global root, regardless of
//! discovery order or worker scheduling.
//!
//! The builder generates an inclusion proof for every leaf and self-verifies
//! all of them before declaring success; one failure aborts the snapshot.

mod proof;
mod tree;

pub use proof::MerkleProof;
pub use tree::{fold, MerkleTree, ProofStep};

use std::collections::BTreeMap;

use sha3::{Digest, Keccak256};
use thiserror::Error;

use crate::district::NormalizedDistrict;
use crate::shard::CountryShard;
use crate::types::{CountryCode, DistrictId};

pub type Hash32 = [u8; 32];

pub fn keccak256(data: &[u8]) -> Hash32 {
    Keccak256::digest(data).into()
}

pub(crate) fn keccak256_pair(left: &Hash32, right: &Hash32) -> Hash32 {
    let mut hasher = Keccak256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// Hex serde for 32-byte hashes.
pub(crate) mod hash_hex {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(hash: &super::Hash32, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(hash))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<super::Hash32, D::Error> {
        let s = String::deserialize(d)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        bytes
            .as_slice()
            .try_into()
            .map_err(|_| serde::de::Error::custom("hash must be 32 bytes"))
    }
}

/// Leaf for one district: `keccak(district_id ‖ keccak(geometry_bytes) ‖
/// keccak(metadata_bytes))`.
pub fn district_leaf(district: &NormalizedDistrict) -> Hash32 {
    let geometry_hash = keccak256(&district.canonical_geometry_bytes());
    let metadata_hash = keccak256(&district.canonical_metadata_bytes());
    let mut hasher = Keccak256::new();
    hasher.update(district.district_id.as_bytes());
    hasher.update(geometry_hash);
    hasher.update(metadata_hash);
    hasher.finalize().into()
}

/// Leaf of the global index tree: `keccak(country_code ‖ country_root)`.
pub fn country_index_leaf(country: CountryCode, root: &Hash32) -> Hash32 {
    let mut hasher = Keccak256::new();
    hasher.update(country.as_bytes());
    hasher.update(root);
    hasher.finalize().into()
}

/// The Merkle tree of one country shard.
#[derive(Debug, Clone)]
pub struct CountryCommitment {
    pub country: CountryCode,
    pub district_ids: Vec<DistrictId>,
    pub tree: MerkleTree,
}

impl CountryCommitment {
    #[inline]
    pub fn root(&self) -> Hash32 {
        self.tree.root()
    }
}

/// Full two-level commitment for a snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotCommitment {
    pub global_root: Hash32,
    pub global_tree: MerkleTree,
    /// Country order matches the global tree's leaf order.
    pub countries: BTreeMap<CountryCode, CountryCommitment>,
    pub proofs: BTreeMap<DistrictId, MerkleProof>,
}

#[derive(Debug, Error)]
pub enum MerkleError {
    #[error("no districts to commit")]
    Empty,
    #[error("shard {country} is not sorted by district id")]
    UnsortedShard { country: CountryCode },
    #[error("self-check failed: proof for district {district_id} does not verify")]
    SelfCheckFailed { district_id: DistrictId },
}

/// Build the two-level commitment and a verified proof for every district.
pub fn build_commitment(
    shards: &BTreeMap<CountryCode, CountryShard>,
) -> Result<SnapshotCommitment, MerkleError> {
    let mut countries = BTreeMap::new();
    for (country, shard) in shards {
        if shard.is_empty() {
            continue;
        }
        if !shard
            .districts
            .windows(2)
            .all(|w| w[0].district_id < w[1].district_id)
        {
            return Err(MerkleError::UnsortedShard { country: *country });
        }
        let leaves: Vec<Hash32> = shard.districts.iter().map(district_leaf).collect();
        let tree = MerkleTree::build(leaves).expect("non-empty shard");
        countries.insert(
            *country,
            CountryCommitment {
                country: *country,
                district_ids: shard.districts.iter().map(|d| d.district_id).collect(),
                tree,
            },
        );
    }
    if countries.is_empty() {
        return Err(MerkleError::Empty);
    }

    // Global index tree over (country_code ‖ country_root), sorted by
    // country code; BTreeMap iteration supplies the order.
    let index_leaves: Vec<Hash32> = countries
        .values()
        .map(|c| country_index_leaf(c.country, &c.root()))
        .collect();
    let global_tree = MerkleTree::build(index_leaves).expect("non-empty country set");
    let global_root = global_tree.root();

    let mut proofs = BTreeMap::new();
    for (country_position, commitment) in countries.values().enumerate() {
        let country_index_path = global_tree.path(country_position);
        for (leaf_position, district_id) in commitment.district_ids.iter().enumerate() {
            let proof = MerkleProof {
                district_id: *district_id,
                leaf_hash: commitment.tree.leaves()[leaf_position],
                country_code: commitment.country,
                country_path: commitment.tree.path(leaf_position),
                country_root: commitment.root(),
                country_index_path: country_index_path.clone(),
                global_root,
            };
            proofs.insert(*district_id, proof);
        }
    }

    // Self-verification: never publish a commitment whose proofs do not
    // round-trip.
    for proof in proofs.values() {
        if !proof.verify_against(&global_root) {
            return Err(MerkleError::SelfCheckFailed { district_id: proof.district_id });
        }
    }

    Ok(SnapshotCommitment { global_root, global_tree, countries, proofs })
}
