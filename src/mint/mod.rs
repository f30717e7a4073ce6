//! Mint State Machine
//!
//! Everything the contract owns, plus the seams to the token ledger and
//! the payment rail.
//!
//! ## Module Structure
//!
//! - `contract`: Public operations and the affiliate mint orchestration
//! - `config`: Owner-mutable parameters
//! - `secrets`: Redeemed referral secrets
//! - `accounting`: Global and per-wallet counters with reservations
//! - `payment`: Referral tax and the two-phase payment rail
//! - `ledger`: Token ledger seam and in-memory ledger
//! - `guard`: Withdraw reentrancy guard
//! - `events`: Ordered event log
//! - `error`: Rejection reasons

pub mod accounting;
pub mod config;
pub mod contract;
pub mod error;
pub mod events;
pub mod guard;
pub mod ledger;
pub mod payment;
pub mod secrets;

// Re-export key types
pub use accounting::{LimitExceeded, MintAccounting, Reservation};
pub use config::{ContractSettings, MintConfiguration};
pub use contract::{CallContext, MintContract, MintPhase, MintReceipt};
pub use error::MintError;
pub use events::{ContractEvent, ContractEventData, EventLog, MintPath};
pub use guard::{GuardToken, ReentrancyGuard};
pub use ledger::{InMemoryTokenLedger, LedgerError, TokenIdRange, TokenLedger, FIRST_TOKEN_ID};
pub use payment::{
    referral_tax, InMemoryRail, PaymentRail, PaymentSplitter, SplitOutcome, TransferError,
    TransferTicket, REFERRAL_TAX_PERCENT,
};
pub use secrets::SecretLedger;
