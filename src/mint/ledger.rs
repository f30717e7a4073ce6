//! Token Ledger
//!
//! The ownership bookkeeping that issues token ids. The contract only needs
//! `mint` and the issued count; the in-memory ledger adds ownership lookups
//! and per-owner enumeration.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::types::Address;

/// First id handed out by the in-memory ledger.
pub const FIRST_TOKEN_ID: u64 = 1;

/// Ledger failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Token id was never issued.
    #[error("token {0} does not exist")]
    NonexistentToken(u64),
    /// Ledger cannot issue more tokens.
    #[error("ledger capacity {capacity} exhausted")]
    CapacityExhausted {
        /// Hard capacity of the ledger.
        capacity: u64,
    },
    /// Receiver is the zero address.
    #[error("mint to zero address")]
    ZeroReceiver,
}

/// Contiguous range of freshly minted ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenIdRange {
    /// First id in the range.
    pub first: u64,
    /// Number of ids.
    pub count: u64,
}

impl TokenIdRange {
    /// Last id in the range (inclusive).
    pub fn last(&self) -> u64 {
        self.first + self.count.saturating_sub(1)
    }

    /// Iterate over the ids.
    pub fn ids(&self) -> impl Iterator<Item = u64> {
        self.first..self.first + self.count
    }
}

/// Issues unique token ids to receivers.
pub trait TokenLedger {
    /// Mint `count` new tokens to `receiver`. All-or-nothing.
    fn mint(&mut self, receiver: Address, count: u64) -> Result<TokenIdRange, LedgerError>;

    /// Total tokens ever issued.
    fn total_issued(&self) -> u64;

    /// Owner of a token.
    fn owner_of(&self, id: u64) -> Result<Address, LedgerError>;

    /// Token ids held by an owner, ascending.
    fn tokens_of_owner(&self, owner: &Address) -> Vec<u64>;

    /// Has this id been issued?
    fn exists(&self, id: u64) -> bool {
        self.owner_of(id).is_ok()
    }
}

/// In-memory ledger with sequential ids.
#[derive(Debug, Clone)]
pub struct InMemoryTokenLedger {
    owners: BTreeMap<u64, Address>,
    holdings: BTreeMap<Address, BTreeSet<u64>>,
    next_id: u64,
    capacity: Option<u64>,
}

impl Default for InMemoryTokenLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTokenLedger {
    /// Create an unbounded ledger.
    pub fn new() -> Self {
        Self {
            owners: BTreeMap::new(),
            holdings: BTreeMap::new(),
            next_id: FIRST_TOKEN_ID,
            capacity: None,
        }
    }

    /// Create a ledger that refuses to issue more than `capacity` tokens.
    pub fn with_capacity(capacity: u64) -> Self {
        Self { capacity: Some(capacity), ..Self::new() }
    }
}

impl TokenLedger for InMemoryTokenLedger {
    fn mint(&mut self, receiver: Address, count: u64) -> Result<TokenIdRange, LedgerError> {
        if receiver.is_zero() {
            return Err(LedgerError::ZeroReceiver);
        }
        if let Some(capacity) = self.capacity {
            if self.total_issued().saturating_add(count) > capacity {
                return Err(LedgerError::CapacityExhausted { capacity });
            }
        }

        let range = TokenIdRange { first: self.next_id, count };
        let held = self.holdings.entry(receiver).or_default();
        for id in range.ids() {
            self.owners.insert(id, receiver);
            held.insert(id);
        }
        self.next_id += count;
        Ok(range)
    }

    fn total_issued(&self) -> u64 {
        self.next_id - FIRST_TOKEN_ID
    }

    fn owner_of(&self, id: u64) -> Result<Address, LedgerError> {
        self.owners.get(&id).copied().ok_or(LedgerError::NonexistentToken(id))
    }

    fn tokens_of_owner(&self, owner: &Address) -> Vec<u64> {
        self.holdings
            .get(owner)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }
}
