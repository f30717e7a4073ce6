//! Core primitives.
//!
//! Fixed-width identifiers and hashing shared by the mint state machine,
//! the merkle verifier and the network layer.

pub mod hash;
pub mod types;

// Re-export core types
pub use hash::{Digest, StateHasher, hash_bytes, hash_pair};
pub use types::{decimal, Address, Secret, ParseError};
