//! Referral Secret Proofs
//!
//! Membership proofs for one-time referral secrets.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    PROOF SYSTEM                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  merkle.rs       - Sorted-pair SHA-256 Merkle tree          │
//! │                    leaf = sha256(secret)                    │
//! │                    node = sha256(min(a,b) || max(a,b))      │
//! │                    verifier with proof-depth policy         │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod merkle;

// Re-export key types
pub use merkle::{MerkleTree, MerkleVerifier, leaf_hash, verify, MAX_PROOF_DEPTH};
