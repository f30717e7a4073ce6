//! # Affiliate Mint Server
//!
//! Capped token minting with merkle-gated affiliate referrals.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   AFFILIATE MINT SERVER                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Primitives                                │
//! │  ├── types.rs    - Address and Secret                        │
//! │  └── hash.rs     - SHA-256 helpers and state hashing         │
//! │                                                              │
//! │  proof/          - Referral secret proofs                    │
//! │  └── merkle.rs   - Sorted-pair Merkle tree and verifier      │
//! │                                                              │
//! │  mint/           - Contract state machine                    │
//! │  ├── contract.rs - Public operations and orchestration       │
//! │  ├── config.rs   - Owner-mutable parameters                  │
//! │  ├── secrets.rs  - Redeemed secret set                       │
//! │  ├── accounting.rs - Supply and per-wallet counters          │
//! │  ├── payment.rs  - Referral tax and payment rail             │
//! │  ├── ledger.rs   - Token ledger                              │
//! │  ├── guard.rs    - Withdraw reentrancy guard                 │
//! │  └── events.rs   - Event log                                 │
//! │                                                              │
//! │  network/        - Networking                                │
//! │  ├── server.rs   - WebSocket server                          │
//! │  ├── protocol.rs - Message types                             │
//! │  └── auth.rs     - JWT validation                            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Atomicity
//!
//! Every contract operation either commits all of its effects or none.
//! Checks run first, external calls are staged, and contract state changes
//! only in a final step that cannot fail. `state_hash()` is unchanged by
//! any rejected operation.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod mint;
pub mod network;
pub mod proof;

// Re-export commonly used types
pub use core::hash::Digest;
pub use core::types::{Address, Secret};
pub use mint::{
    CallContext, ContractSettings, InMemoryRail, InMemoryTokenLedger, MintConfiguration,
    MintContract, MintError, MintReceipt, PaymentRail, TokenLedger,
};
pub use proof::{MerkleTree, MerkleVerifier};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Percent of the attached value forwarded to the referrer.
pub const REFERRAL_TAX_PERCENT: u128 = mint::payment::REFERRAL_TAX_PERCENT;
