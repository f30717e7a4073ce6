//! Mint Accounting
//!
//! Global issued counter and per-wallet counters.
//!
//! Checks produce a `Reservation` that is only applied by `commit`, after
//! the token ledger has actually minted. A dropped reservation changes
//! nothing.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::core::hash::StateHasher;
use crate::core::types::Address;

/// Cap check failures, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LimitExceeded {
    /// Amount was zero.
    #[error("amount must be greater than zero")]
    InvalidAmount,
    /// Wallet cap would be exceeded.
    #[error("per-wallet limit exceeded")]
    PerWallet {
        /// Already minted by the wallet.
        minted: u64,
        /// Requested amount.
        requested: u64,
        /// Configured cap.
        cap: u64,
    },
    /// Global cap would be exceeded.
    #[error("global supply exceeded")]
    GlobalSupply {
        /// Already issued.
        issued: u64,
        /// Requested amount.
        requested: u64,
        /// Configured cap.
        cap: u64,
    },
}

/// A passed cap check waiting to be committed.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a reservation does nothing until committed"]
pub struct Reservation {
    /// Wallet charged against its cap (None for owner-directed mints).
    wallet: Option<Address>,
    /// Tokens reserved.
    amount: u64,
}

impl Reservation {
    /// Tokens reserved.
    pub fn amount(&self) -> u64 {
        self.amount
    }

    /// Wallet charged, if any.
    pub fn wallet(&self) -> Option<Address> {
        self.wallet
    }
}

/// Supply and per-wallet counters.
#[derive(Debug, Clone, Default)]
pub struct MintAccounting {
    /// Total tokens issued through this contract.
    global_issued: u64,
    /// Cumulative mints per wallet (owner-directed mints excluded).
    wallet_minted: BTreeMap<Address, u64>,
}

impl MintAccounting {
    /// Create empty counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Counters for a ledger that already issued `global_issued` tokens.
    pub fn resume(global_issued: u64) -> Self {
        Self { global_issued, ..Self::default() }
    }

    /// Tokens issued so far.
    pub fn global_issued(&self) -> u64 {
        self.global_issued
    }

    /// Tokens minted by a wallet through capped paths.
    pub fn minted_by(&self, wallet: &Address) -> u64 {
        self.wallet_minted.get(wallet).copied().unwrap_or(0)
    }

    /// Highest count held by any single wallet.
    pub fn max_minted_by_any_wallet(&self) -> u64 {
        self.wallet_minted.values().copied().max().unwrap_or(0)
    }

    /// Check both caps for `wallet` minting `amount`.
    ///
    /// Order: amount > 0, then per-wallet cap, then global cap.
    pub fn check_and_reserve(
        &self,
        wallet: Address,
        amount: u64,
        per_wallet_cap: u64,
        global_supply_cap: u64,
    ) -> Result<Reservation, LimitExceeded> {
        if amount == 0 {
            return Err(LimitExceeded::InvalidAmount);
        }

        let minted = self.minted_by(&wallet);
        match minted.checked_add(amount) {
            Some(total) if total <= per_wallet_cap => {}
            _ => {
                return Err(LimitExceeded::PerWallet {
                    minted,
                    requested: amount,
                    cap: per_wallet_cap,
                })
            }
        }

        self.check_global(amount, global_supply_cap)?;

        Ok(Reservation { wallet: Some(wallet), amount })
    }

    /// Check only the global cap (owner-directed mints).
    pub fn reserve_global(
        &self,
        amount: u64,
        global_supply_cap: u64,
    ) -> Result<Reservation, LimitExceeded> {
        if amount == 0 {
            return Err(LimitExceeded::InvalidAmount);
        }
        self.check_global(amount, global_supply_cap)?;
        Ok(Reservation { wallet: None, amount })
    }

    fn check_global(&self, amount: u64, cap: u64) -> Result<(), LimitExceeded> {
        match self.global_issued.checked_add(amount) {
            Some(total) if total <= cap => Ok(()),
            _ => Err(LimitExceeded::GlobalSupply {
                issued: self.global_issued,
                requested: amount,
                cap,
            }),
        }
    }

    /// Apply a reservation after the ledger mint succeeded.
    ///
    /// Cannot fail: the reservation was checked against the same counters
    /// and nothing else mutates them in between.
    pub fn commit(&mut self, reservation: Reservation) {
        self.global_issued += reservation.amount;
        if let Some(wallet) = reservation.wallet {
            *self.wallet_minted.entry(wallet).or_insert(0) += reservation.amount;
        }
    }

    /// Feed counters into a state hasher (sorted by wallet).
    pub fn hash_into(&self, hasher: &mut StateHasher) {
        hasher.update_u64(self.global_issued);
        hasher.update_u64(self.wallet_minted.len() as u64);
        for (wallet, minted) in &self.wallet_minted {
            hasher.update_address(wallet);
            hasher.update_u64(*minted);
        }
    }
}
