//! Merkle Tree Commitments
//!
//! Binary Merkle tree using SHA-256 with sorted-pair node hashing.
//! The root commits to the set of referral secrets handed out to affiliates;
//! a proof is the ordered list of sibling digests from leaf to root.

use crate::core::hash::{Digest, hash_bytes, hash_pair};
use crate::core::types::Secret;

/// Proofs longer than this are rejected outright (2^32 leaves).
pub const MAX_PROOF_DEPTH: usize = 32;

/// Padding leaf for non-power-of-two trees.
///
/// All-zero has no known SHA-256 preimage, so it can never be proven
/// as a secret.
const EMPTY_LEAF: Digest = [0u8; 32];

/// Leaf digest for a referral secret.
///
/// The secret is fixed-width, so it is hashed alone with no length prefix.
pub fn leaf_hash(secret: &Secret) -> Digest {
    hash_bytes(secret.as_bytes())
}

/// Recompute the root from `leaf` and `proof` and compare it to `root`.
///
/// Pure and total: any mismatch is `false`, never a panic.
pub fn verify(root: &Digest, leaf: &Digest, proof: &[Digest]) -> bool {
    if proof.len() > MAX_PROOF_DEPTH {
        return false;
    }
    let computed = proof.iter().fold(*leaf, |acc, sibling| hash_pair(&acc, sibling));
    computed == *root
}

/// Verifier with a proof-length policy.
///
/// With an expected depth configured, a proof of any other length fails
/// even if it would hash to the root.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MerkleVerifier {
    /// Required proof length, if known.
    pub expected_depth: Option<usize>,
}

impl MerkleVerifier {
    /// Verifier that accepts any proof up to `MAX_PROOF_DEPTH`.
    pub const fn any_depth() -> Self {
        Self { expected_depth: None }
    }

    /// Verifier that requires proofs of exactly `depth` siblings.
    pub const fn with_depth(depth: usize) -> Self {
        Self { expected_depth: Some(depth) }
    }

    /// Verify a leaf digest against a root.
    pub fn verify(&self, root: &Digest, leaf: &Digest, proof: &[Digest]) -> bool {
        if let Some(depth) = self.expected_depth {
            if proof.len() != depth {
                return false;
            }
        }
        verify(root, leaf, proof)
    }

    /// Verify a secret's membership against a root.
    pub fn verify_secret(&self, root: &Digest, secret: &Secret, proof: &[Digest]) -> bool {
        self.verify(root, &leaf_hash(secret), proof)
    }
}

/// Binary Merkle tree for building roots and proofs.
///
/// Leaves are padded to a power of two, so every proof from one tree has
/// the same length (`depth()`).
#[derive(Clone, Debug)]
pub struct MerkleTree {
    /// Leaf hashes as supplied (unpadded)
    leaves: Vec<Digest>,
    /// All tree levels (padded leaves at index 0, root at last index)
    levels: Vec<Vec<Digest>>,
}

impl MerkleTree {
    /// Build a tree from pre-hashed leaves.
    pub fn from_leaf_hashes(leaves: Vec<Digest>) -> Self {
        let levels = build_levels(&leaves);
        Self { leaves, levels }
    }

    /// Build a tree committing to a set of referral secrets.
    pub fn from_secrets(secrets: &[Secret]) -> Self {
        Self::from_leaf_hashes(secrets.iter().map(leaf_hash).collect())
    }

    /// Root digest, or None for an empty tree.
    pub fn root(&self) -> Option<Digest> {
        self.levels.last()?.first().copied()
    }

    /// Number of leaves (before padding).
    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    /// Proof length for every leaf of this tree.
    pub fn depth(&self) -> usize {
        self.levels.len().saturating_sub(1)
    }

    /// Position of a secret's leaf, if it is in the tree.
    pub fn position(&self, secret: &Secret) -> Option<usize> {
        let leaf = leaf_hash(secret);
        self.leaves.iter().position(|l| *l == leaf)
    }

    /// Generate an inclusion proof for the leaf at `index`.
    ///
    /// Returns None if index is out of bounds.
    pub fn proof(&self, index: usize) -> Option<Vec<Digest>> {
        if index >= self.leaves.len() {
            return None;
        }

        let mut siblings = Vec::with_capacity(self.depth());
        let mut current = index;

        // Walk up the tree, collecting sibling hashes
        for level in &self.levels[..self.depth()] {
            siblings.push(level[current ^ 1]);
            current /= 2;
        }

        Some(siblings)
    }

    /// Generate a proof for a secret, if it is in the tree.
    pub fn proof_for_secret(&self, secret: &Secret) -> Option<Vec<Digest>> {
        self.position(secret).and_then(|i| self.proof(i))
    }
}

/// Compute all levels, padding the leaf level to a power of two.
fn build_levels(leaves: &[Digest]) -> Vec<Vec<Digest>> {
    if leaves.is_empty() {
        return Vec::new();
    }

    let mut current = leaves.to_vec();
    current.resize(leaves.len().next_power_of_two(), EMPTY_LEAF);

    let mut levels = vec![current.clone()];
    while current.len() > 1 {
        current = current
            .chunks(2)
            .map(|pair| hash_pair(&pair[0], &pair[1]))
            .collect();
        levels.push(current.clone());
    }
    levels
}
