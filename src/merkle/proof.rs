use serde::{Deserialize, Serialize};

use super::tree::{fold, ProofStep};
use super::{country_index_leaf, Hash32};
use crate::types::{CountryCode, DistrictId};

/// Inclusion proof for one district across both commitment levels: the
/// sibling path up its country tree, then the country's path up the global
/// index tree.
///
/// This layout (leaf structure, keccak-256, sibling order, direction-bit
/// convention, two-level assembly) is a hard interface to downstream
/// verifiers and changes only with a snapshot-format version bump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub district_id: DistrictId,
    #[serde(with = "super::hash_hex")]
    pub leaf_hash: Hash32,
    pub country_code: CountryCode,
    pub country_path: Vec<ProofStep>,
    #[serde(with = "super::hash_hex")]
    pub country_root: Hash32,
    pub country_index_path: Vec<ProofStep>,
    #[serde(with = "super::hash_hex")]
    pub global_root: Hash32,
}

impl MerkleProof {
    /// Verify both levels: leaf → country root, then
    /// `(country_code ‖ country_root)` → global root.
    pub fn verify(&self) -> bool {
        if fold(self.leaf_hash, &self.country_path) != self.country_root {
            return false;
        }
        let index_leaf = country_index_leaf(self.country_code, &self.country_root);
        fold(index_leaf, &self.country_index_path) == self.global_root
    }

    /// Verify against an externally supplied global root.
    pub fn verify_against(&self, global_root: &Hash32) -> bool {
        self.global_root == *global_root && self.verify()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merkle::{build_commitment, district_leaf};
    use crate::shard::build_shards;
    use crate::test_support::district_fixture;

    #[test]
    fn proofs_verify_and_reject_tampering() {
        let districts = vec![
            district_fixture("US/HI/honolulu", "District 1", (-157.90, 21.40)),
            district_fixture("US/HI/honolulu", "District 2", (-157.80, 21.45)),
            district_fixture("GB/ENG/london", "Ward 1", (-0.10, 51.50)),
        ];
        let shards = build_shards(districts.clone());
        let commitment = build_commitment(&shards).unwrap();

        for district in &districts {
            let proof = &commitment.proofs[&district.district_id];
            assert!(proof.verify());
            assert!(proof.verify_against(&commitment.global_root));
            assert_eq!(proof.leaf_hash, district_leaf(district));

            let mut tampered = proof.clone();
            tampered.leaf_hash[0] ^= 0x01;
            assert!(!tampered.verify());

            let mut wrong_root = proof.clone();
            wrong_root.global_root[31] ^= 0x01;
            assert!(!wrong_root.verify());
        }
    }

    #[test]
    fn proof_serde_round_trip() {
        let districts = vec![district_fixture("US/HI/honolulu", "District 1", (-157.90, 21.40))];
        let shards = build_shards(districts);
        let commitment = build_commitment(&shards).unwrap();
        let proof = commitment.proofs.values().next().unwrap();
        let json = serde_json::to_string(proof).unwrap();
        let back: MerkleProof = serde_json::from_str(&json).unwrap();
        assert_eq!(&back, proof);
        assert!(back.verify());
    }
}
