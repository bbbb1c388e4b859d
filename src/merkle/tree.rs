use serde::{Deserialize, Serialize};

use super::{keccak256_pair, Hash32};

/// One step in a Merkle path: the sibling hash and which side it sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    #[serde(with = "super::hash_hex")]
    pub sibling: Hash32,
    /// Direction bit: true when the sibling is the left operand.
    pub sibling_on_left: bool,
}

/// Balanced binary keccak-256 tree built bottom-up. A level of odd length
/// duplicates its last node to the right.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    /// levels[0] are the leaves; the last level is the single root.
    levels: Vec<Vec<Hash32>>,
}

impl MerkleTree {
    /// Build from leaf hashes. Returns None for an empty leaf set; a single
    /// leaf is its own root.
    pub fn build(leaves: Vec<Hash32>) -> Option<Self> {
        if leaves.is_empty() {
            return None;
        }
        let mut levels = vec![leaves];
        while levels.last().unwrap().len() > 1 {
            let previous = levels.last().unwrap();
            let mut next = Vec::with_capacity(previous.len().div_ceil(2));
            for pair in previous.chunks(2) {
                let left = pair[0];
                let right = *pair.get(1).unwrap_or(&pair[0]);
                next.push(keccak256_pair(&left, &right));
            }
            levels.push(next);
        }
        Some(Self { levels })
    }

    #[inline]
    pub fn root(&self) -> Hash32 {
        self.levels.last().unwrap()[0]
    }

    #[inline]
    pub fn leaf_count(&self) -> usize {
        self.levels[0].len()
    }

    #[inline]
    pub fn leaves(&self) -> &[Hash32] {
        &self.levels[0]
    }

    /// Number of internal levels: ⌈log2(leaf_count)⌉.
    #[inline]
    pub fn depth(&self) -> usize {
        self.levels.len() - 1
    }

    /// Hashes of every level, leaves first; used by the artifact codec.
    #[inline]
    pub fn levels(&self) -> &[Vec<Hash32>] {
        &self.levels
    }

    /// Sibling path from leaf `index` to the root.
    pub fn path(&self, index: usize) -> Vec<ProofStep> {
        assert!(index < self.leaf_count(), "leaf index out of range");
        let mut path = Vec::with_capacity(self.depth());
        let mut position = index;
        for level in &self.levels[..self.levels.len() - 1] {
            let sibling_index = position ^ 1;
            // Odd level end duplicates the node itself as its sibling.
            let sibling = *level.get(sibling_index).unwrap_or(&level[position]);
            path.push(ProofStep { sibling, sibling_on_left: position % 2 == 1 });
            position /= 2;
        }
        path
    }
}

/// Reconstruct a root from a leaf and its sibling path.
pub fn fold(leaf: Hash32, path: &[ProofStep]) -> Hash32 {
    path.iter().fold(leaf, |acc, step| {
        if step.sibling_on_left {
            keccak256_pair(&step.sibling, &acc)
        } else {
            keccak256_pair(&acc, &step.sibling)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merkle::keccak256;

    fn leaves(n: usize) -> Vec<Hash32> {
        (0..n).map(|i| keccak256(&[i as u8])).collect()
    }

    #[test]
    fn empty_has_no_tree() {
        assert!(MerkleTree::build(vec![]).is_none());
    }

    #[test]
    fn single_leaf_root_equals_leaf() {
        let leaf = keccak256(b"only");
        let tree = MerkleTree::build(vec![leaf]).unwrap();
        assert_eq!(tree.root(), leaf);
        assert_eq!(tree.depth(), 0);
        assert!(tree.path(0).is_empty());
    }

    #[test]
    fn depth_is_ceil_log2() {
        for (n, expected) in [(1, 0), (2, 1), (3, 2), (4, 2), (9, 4), (16, 4), (17, 5)] {
            let tree = MerkleTree::build(leaves(n)).unwrap();
            assert_eq!(tree.depth(), expected, "n = {n}");
        }
    }

    #[test]
    fn every_path_folds_to_root() {
        for n in 1..=33 {
            let tree = MerkleTree::build(leaves(n)).unwrap();
            for (i, leaf) in tree.leaves().to_vec().iter().enumerate() {
                assert_eq!(fold(*leaf, &tree.path(i)), tree.root(), "n = {n}, leaf = {i}");
            }
        }
    }

    #[test]
    fn odd_levels_duplicate_last_node() {
        // Three leaves: root = H(H(a,b), H(c,c)).
        let ls = leaves(3);
        let tree = MerkleTree::build(ls.clone()).unwrap();
        let left = keccak256_pair(&ls[0], &ls[1]);
        let right = keccak256_pair(&ls[2], &ls[2]);
        assert_eq!(tree.root(), keccak256_pair(&left, &right));
    }

    #[test]
    fn tampered_path_does_not_fold() {
        let tree = MerkleTree::build(leaves(8)).unwrap();
        let mut path = tree.path(3);
        path[1].sibling[0] ^= 0xff;
        assert_ne!(fold(tree.leaves()[3], &path), tree.root());
    }
}
