//! Mint Errors
//!
//! Every rejection is terminal for the invoking operation and leaves the
//! contract state untouched.

use thiserror::Error;

use crate::mint::accounting::LimitExceeded;
use crate::mint::ledger::LedgerError;
use crate::mint::payment::TransferError;

/// Reasons an operation is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MintError {
    /// Amount must be strictly positive.
    #[error("amount must be greater than zero")]
    InvalidAmount,

    /// Caller's cumulative mints would exceed the per-wallet cap.
    #[error("per-wallet limit exceeded: {minted} minted + {requested} requested > {cap}")]
    PerWalletLimitExceeded {
        /// Already minted by the wallet.
        minted: u64,
        /// Requested in this call.
        requested: u64,
        /// Configured cap.
        cap: u64,
    },

    /// Global supply would exceed its cap.
    #[error("global supply exceeded: {issued} issued + {requested} requested > {cap}")]
    GlobalSupplyExceeded {
        /// Already issued.
        issued: u64,
        /// Requested in this call.
        requested: u64,
        /// Configured cap.
        cap: u64,
    },

    /// Minting is paused.
    #[error("minting is paused")]
    Paused,

    /// Referral secret was already used.
    #[error("referral secret already redeemed")]
    AlreadyRedeemed,

    /// Referrer and minter are the same wallet.
    #[error("cannot refer yourself")]
    SelfReferral,

    /// Merkle proof does not verify against the configured root.
    #[error("invalid merkle proof")]
    InvalidProof,

    /// Attached value does not equal the unit price.
    #[error("wrong payment: expected {expected}, got {got}")]
    WrongPayment {
        /// Configured unit price.
        expected: u128,
        /// Value attached to the call.
        got: u128,
    },

    /// Outgoing transfer was refused.
    #[error("transfer failed: {0}")]
    TransferFailed(TransferError),

    /// Token ledger refused to mint.
    #[error("ledger mint failed: {0}")]
    LedgerMintFailed(LedgerError),

    /// Token id was never issued.
    #[error("nonexistent token {0}")]
    NonexistentToken(u64),

    /// Nothing to withdraw.
    #[error("contract balance is zero")]
    ZeroBalance,

    /// Non-owner called an owner-only operation.
    #[error("caller is not the owner")]
    Unauthorized,

    /// Call was relayed by a contract instead of a wallet.
    #[error("caller is a contract, not a wallet")]
    BotCaller,

    /// Crediting the attached value would overflow the contract balance.
    #[error("contract balance would overflow")]
    BalanceOverflow,

    /// Withdraw entered while another withdraw is in flight.
    #[error("reentrant call")]
    ReentrantCall,
}

impl MintError {
    /// Stable reason code for clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidAmount => "invalid_amount",
            Self::PerWalletLimitExceeded { .. } => "per_wallet_limit_exceeded",
            Self::GlobalSupplyExceeded { .. } => "global_supply_exceeded",
            Self::Paused => "paused",
            Self::AlreadyRedeemed => "already_redeemed",
            Self::SelfReferral => "self_referral",
            Self::InvalidProof => "invalid_proof",
            Self::WrongPayment { .. } => "wrong_payment",
            Self::TransferFailed(_) => "transfer_failed",
            Self::LedgerMintFailed(_) => "ledger_mint_failed",
            Self::NonexistentToken(_) => "nonexistent_token",
            Self::ZeroBalance => "zero_balance",
            Self::Unauthorized => "unauthorized",
            Self::BotCaller => "bot_caller",
            Self::BalanceOverflow => "balance_overflow",
            Self::ReentrantCall => "reentrant_call",
        }
    }
}

impl From<LimitExceeded> for MintError {
    fn from(err: LimitExceeded) -> Self {
        match err {
            LimitExceeded::InvalidAmount => Self::InvalidAmount,
            LimitExceeded::PerWallet { minted, requested, cap } => {
                Self::PerWalletLimitExceeded { minted, requested, cap }
            }
            LimitExceeded::GlobalSupply { issued, requested, cap } => {
                Self::GlobalSupplyExceeded { issued, requested, cap }
            }
        }
    }
}

impl From<TransferError> for MintError {
    fn from(err: TransferError) -> Self {
        Self::TransferFailed(err)
    }
}

impl From<LedgerError> for MintError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::NonexistentToken(id) => Self::NonexistentToken(id),
            other => Self::LedgerMintFailed(other),
        }
    }
}
