//! Payment Splitting
//!
//! Referral tax computation and the payment rail that moves value out of
//! the contract.
//!
//! Outgoing transfers are two-phase: `prepare` may fail and has no visible
//! effect, `settle` makes the transfer visible and cannot fail, `cancel`
//! discards it. The contract prepares before minting and settles at commit,
//! so a failed step never leaves a payout without its mint or the reverse.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;
use tracing::debug;

use crate::core::types::Address;

/// Percentage of the paid value forwarded to the referrer.
pub const REFERRAL_TAX_PERCENT: u128 = 15;

/// Referral tax: `floor(paid * 15 / 100)`.
///
/// Integer division truncates; the remainder stays with the contract.
/// Split into quotient and remainder so large values cannot overflow.
pub fn referral_tax(paid: u128) -> u128 {
    (paid / 100) * REFERRAL_TAX_PERCENT + (paid % 100) * REFERRAL_TAX_PERCENT / 100
}

/// Outgoing transfer failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    /// Recipient refused the funds.
    #[error("recipient rejected transfer: {0}")]
    Rejected(String),
    /// Recipient is the zero address.
    #[error("transfer to zero address")]
    ZeroAddress,
}

/// A prepared, not yet visible transfer.
///
/// Must be passed to `settle` or `cancel` on the rail that issued it.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a prepared transfer must be settled or cancelled"]
pub struct TransferTicket {
    /// Rail-assigned identifier.
    pub id: u64,
    /// Recipient.
    pub to: Address,
    /// Amount in the smallest currency unit.
    pub amount: u128,
}

/// Moves value out of the contract.
pub trait PaymentRail {
    /// Stage a transfer. Fails if the recipient cannot accept it.
    fn prepare(&mut self, to: Address, amount: u128) -> Result<TransferTicket, TransferError>;

    /// Make a prepared transfer visible. Infallible.
    fn settle(&mut self, ticket: TransferTicket);

    /// Discard a prepared transfer.
    fn cancel(&mut self, ticket: TransferTicket);
}

/// Result of a successful split.
#[derive(Debug)]
pub struct SplitOutcome {
    /// Prepared tax transfer to the referrer.
    pub ticket: TransferTicket,
    /// Amount forwarded to the referrer.
    pub tax: u128,
    /// Amount the contract keeps.
    pub retained: u128,
}

/// Computes the referral tax and stages its transfer.
pub struct PaymentSplitter;

impl PaymentSplitter {
    /// Stage `floor(total_paid * 15 / 100)` to the referrer.
    pub fn split_and_forward<P: PaymentRail>(
        rail: &mut P,
        total_paid: u128,
        referrer: Address,
    ) -> Result<SplitOutcome, TransferError> {
        let tax = referral_tax(total_paid);
        let ticket = rail.prepare(referrer, tax)?;
        debug!("Staged referral tax {} to {}", tax, referrer.short());
        Ok(SplitOutcome {
            ticket,
            tax,
            retained: total_paid - tax,
        })
    }
}

// =============================================================================
// IN-MEMORY RAIL
// =============================================================================

/// In-memory payment rail.
///
/// Settled transfers accumulate as credits per recipient. Recipients in the
/// reject list refuse every transfer, which exercises the abort paths.
#[derive(Debug, Default)]
pub struct InMemoryRail {
    credits: BTreeMap<Address, u128>,
    pending: BTreeMap<u64, (Address, u128)>,
    rejecting: BTreeSet<Address>,
    next_id: u64,
}

impl InMemoryRail {
    /// Create an empty rail.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a recipient refuse all transfers.
    pub fn reject_transfers_to(&mut self, address: Address) {
        self.rejecting.insert(address);
    }

    /// Let a recipient accept transfers again.
    pub fn accept_transfers_to(&mut self, address: &Address) {
        self.rejecting.remove(address);
    }

    /// Total settled to an address.
    pub fn credited(&self, address: &Address) -> u128 {
        self.credits.get(address).copied().unwrap_or(0)
    }

    /// Transfers prepared but neither settled nor cancelled.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

impl PaymentRail for InMemoryRail {
    fn prepare(&mut self, to: Address, amount: u128) -> Result<TransferTicket, TransferError> {
        if to.is_zero() {
            return Err(TransferError::ZeroAddress);
        }
        if self.rejecting.contains(&to) {
            return Err(TransferError::Rejected(to.to_string()));
        }
        let id = self.next_id;
        self.next_id += 1;
        self.pending.insert(id, (to, amount));
        Ok(TransferTicket { id, to, amount })
    }

    fn settle(&mut self, ticket: TransferTicket) {
        if self.pending.remove(&ticket.id).is_some() {
            let credit = self.credits.entry(ticket.to).or_insert(0);
            *credit = credit.saturating_add(ticket.amount);
        }
    }

    fn cancel(&mut self, ticket: TransferTicket) {
        self.pending.remove(&ticket.id);
    }
}
