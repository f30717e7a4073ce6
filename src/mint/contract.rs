//! Mint Contract
//!
//! The externally callable surface: public, affiliate and owner-directed
//! mints, withdrawal, owner configuration and queries.
//!
//! ## Affiliate mint
//!
//! ```text
//! Idle ─► Validating ─► Reserving ─► Paying ─► Minting ─► Committing ─► Done
//!            │              │           │          │
//!            └──────────────┴───────────┴──────────┴──► Aborted(reason)
//! ```
//!
//! Nothing owned by the contract changes before `Committing`. The referral
//! tax is only staged while `Paying`; a ledger failure while `Minting`
//! cancels it. `Committing` cannot fail.

use tracing::{debug, info, instrument, warn};

use crate::core::hash::{Digest, StateHasher};
use crate::core::types::{Address, Secret};
use crate::mint::accounting::MintAccounting;
use crate::mint::config::{ContractSettings, MintConfiguration};
use crate::mint::error::MintError;
use crate::mint::events::{ContractEvent, ContractEventData, EventLog, MintPath};
use crate::mint::guard::ReentrancyGuard;
use crate::mint::ledger::{InMemoryTokenLedger, TokenIdRange, TokenLedger};
use crate::mint::payment::{referral_tax, InMemoryRail, PaymentRail, PaymentSplitter};
use crate::mint::secrets::SecretLedger;

/// Who is calling and what value is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallContext {
    /// Immediate caller.
    pub caller: Address,
    /// Wallet that originated the call. Differs from `caller` when a
    /// contract relays the call.
    pub origin: Address,
    /// Value attached, in the smallest currency unit.
    pub value: u128,
}

impl CallContext {
    /// A wallet calling directly.
    pub const fn direct(caller: Address, value: u128) -> Self {
        Self { caller, origin: caller, value }
    }

    /// A call relayed by `caller` on behalf of `origin`.
    pub const fn relayed(caller: Address, origin: Address, value: u128) -> Self {
        Self { caller, origin, value }
    }

    fn is_relayed(&self) -> bool {
        self.caller != self.origin
    }
}

/// Phases of a mint operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MintPhase {
    /// Not started.
    Idle,
    /// Running rejection checks.
    Validating,
    /// Checking caps.
    Reserving,
    /// Staging the referral tax.
    Paying,
    /// Calling the token ledger.
    Minting,
    /// Applying state changes.
    Committing,
    /// Finished.
    Done,
}

/// Outcome of a successful mint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MintReceipt {
    /// Ids issued.
    pub tokens: TokenIdRange,
    /// Value the contract received.
    pub paid: u128,
    /// Part of `paid` forwarded to the referrer.
    pub referral_tax: u128,
}

#[inline]
fn transition(op: &'static str, phase: MintPhase) {
    debug!(op, ?phase, "phase transition");
}

/// The mint contract.
///
/// Operations take `&mut self`, so they run one at a time to completion.
pub struct MintContract<L = InMemoryTokenLedger, P = InMemoryRail> {
    owner: Address,
    config: MintConfiguration,
    secrets: SecretLedger,
    accounting: MintAccounting,
    /// Value held by the contract.
    balance: u128,
    withdraw_guard: ReentrancyGuard,
    ledger: L,
    rail: P,
    events: EventLog,
}

impl MintContract<InMemoryTokenLedger, InMemoryRail> {
    /// Contract backed by the in-memory ledger and rail.
    pub fn from_settings(settings: ContractSettings) -> Self {
        Self::new(settings.owner, settings.config, InMemoryTokenLedger::new(), InMemoryRail::new())
    }
}

impl<L: TokenLedger, P: PaymentRail> MintContract<L, P> {
    /// Create a contract over an existing ledger and rail.
    ///
    /// Tokens the ledger already issued count against the global cap.
    pub fn new(owner: Address, config: MintConfiguration, ledger: L, rail: P) -> Self {
        let accounting = MintAccounting::resume(ledger.total_issued());
        Self {
            owner,
            config,
            secrets: SecretLedger::new(),
            accounting,
            balance: 0,
            withdraw_guard: ReentrancyGuard::new(),
            ledger,
            rail,
            events: EventLog::new(),
        }
    }

    // =========================================================================
    // MINTING
    // =========================================================================

    /// Public paid mint.
    ///
    /// The attached value must equal the flat unit price, whatever the amount.
    #[instrument(skip(self), fields(caller = %ctx.caller))]
    pub fn mint(&mut self, ctx: CallContext, amount: u64) -> Result<MintReceipt, MintError> {
        const OP: &str = "mint";
        transition(OP, MintPhase::Validating);
        self.reject_bots(&ctx)?;
        self.require_not_paused()?;
        self.require_unit_price(&ctx)?;
        let new_balance = self.credited_balance(ctx.value)?;

        transition(OP, MintPhase::Reserving);
        let reservation = self
            .accounting
            .check_and_reserve(ctx.caller, amount, self.config.per_wallet_cap, self.config.global_supply_cap)
            .inspect_err(|e| warn!("mint rejected: {}", e))?;

        transition(OP, MintPhase::Minting);
        let tokens = self.ledger.mint(ctx.caller, amount).map_err(MintError::LedgerMintFailed)?;

        transition(OP, MintPhase::Committing);
        self.accounting.commit(reservation);
        self.balance = new_balance;
        self.events.emit(ContractEventData::Minted {
            receiver: ctx.caller,
            tokens,
            path: MintPath::Public,
        });
        self.after_commit(OP);

        transition(OP, MintPhase::Done);
        info!("Minted {} token(s) #{}..=#{} to {}", amount, tokens.first, tokens.last(), ctx.caller.short());
        Ok(MintReceipt { tokens, paid: ctx.value, referral_tax: 0 })
    }

    /// Referral mint gated by a one-time merkle-proven secret.
    ///
    /// Pays `floor(value * 15 / 100)` to `referred` and emits a referral
    /// record. Either every effect happens or none does.
    #[instrument(skip(self, proof, secret), fields(caller = %ctx.caller))]
    pub fn affiliate_mint(
        &mut self,
        ctx: CallContext,
        proof: &[Digest],
        secret: Secret,
        amount: u64,
        referred: Address,
    ) -> Result<MintReceipt, MintError> {
        const OP: &str = "affiliate_mint";
        transition(OP, MintPhase::Validating);
        self.reject_bots(&ctx)?;
        self.require_not_paused()?;

        if self.secrets.is_redeemed(&secret) {
            warn!("affiliate mint rejected: secret already redeemed");
            return Err(MintError::AlreadyRedeemed);
        }

        if referred == ctx.caller {
            warn!("affiliate mint rejected: self referral");
            return Err(MintError::SelfReferral);
        }

        let root = self.config.merkle_root.ok_or(MintError::InvalidProof)?;
        if !self.config.verifier().verify_secret(&root, &secret, proof) {
            warn!("affiliate mint rejected: invalid proof ({} siblings)", proof.len());
            return Err(MintError::InvalidProof);
        }

        self.require_unit_price(&ctx)?;
        let new_balance = self.credited_balance(ctx.value - referral_tax(ctx.value))?;

        transition(OP, MintPhase::Reserving);
        let reservation = self
            .accounting
            .check_and_reserve(ctx.caller, amount, self.config.per_wallet_cap, self.config.global_supply_cap)
            .inspect_err(|e| warn!("affiliate mint rejected: {}", e))?;

        transition(OP, MintPhase::Paying);
        let split = PaymentSplitter::split_and_forward(&mut self.rail, ctx.value, referred)
            .inspect_err(|e| warn!("affiliate mint aborted: {}", e))?;

        transition(OP, MintPhase::Minting);
        let tokens = match self.ledger.mint(ctx.caller, amount) {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!("affiliate mint aborted: ledger refused: {}", e);
                self.rail.cancel(split.ticket);
                return Err(MintError::LedgerMintFailed(e));
            }
        };

        transition(OP, MintPhase::Committing);
        self.rail.settle(split.ticket);
        let redeemed = self.secrets.mark_redeemed(secret);
        debug_assert!(redeemed.is_ok(), "secret was checked unredeemed during validation");
        self.accounting.commit(reservation);
        debug_assert_eq!(self.balance.checked_add(split.retained), Some(new_balance));
        self.balance = new_balance;
        self.events.emit(ContractEventData::Minted {
            receiver: ctx.caller,
            tokens,
            path: MintPath::Affiliate,
        });
        self.events.emit(ContractEventData::Referral {
            minter: ctx.caller,
            referred,
            secret,
        });
        self.after_commit(OP);

        transition(OP, MintPhase::Done);
        info!(
            "Affiliate minted {} token(s) to {}, referral tax {} to {}",
            amount,
            ctx.caller.short(),
            split.tax,
            referred.short()
        );
        Ok(MintReceipt { tokens, paid: ctx.value, referral_tax: split.tax })
    }

    /// Owner-directed mint to any receiver.
    ///
    /// Not gated by pause and not counted against the receiver's wallet cap.
    #[instrument(skip(self), fields(caller = %ctx.caller))]
    pub fn mint_for_address(
        &mut self,
        ctx: CallContext,
        amount: u64,
        receiver: Address,
    ) -> Result<MintReceipt, MintError> {
        const OP: &str = "mint_for_address";
        transition(OP, MintPhase::Validating);
        self.only_owner(&ctx)?;
        if ctx.value != 0 {
            return Err(MintError::WrongPayment { expected: 0, got: ctx.value });
        }

        transition(OP, MintPhase::Reserving);
        let reservation = self.accounting.reserve_global(amount, self.config.global_supply_cap)?;

        transition(OP, MintPhase::Minting);
        let tokens = self.ledger.mint(receiver, amount).map_err(MintError::LedgerMintFailed)?;

        transition(OP, MintPhase::Committing);
        self.accounting.commit(reservation);
        self.events.emit(ContractEventData::Minted {
            receiver,
            tokens,
            path: MintPath::Owner,
        });
        self.after_commit(OP);

        transition(OP, MintPhase::Done);
        info!("Owner minted {} token(s) to {}", amount, receiver.short());
        Ok(MintReceipt { tokens, paid: 0, referral_tax: 0 })
    }

    // =========================================================================
    // FUNDS
    // =========================================================================

    /// Transfer the whole contract balance to the owner.
    #[instrument(skip(self), fields(caller = %ctx.caller))]
    pub fn withdraw(&mut self, ctx: CallContext) -> Result<u128, MintError> {
        self.only_owner(&ctx)?;
        let _entered = self.withdraw_guard.enter()?;

        if self.balance == 0 {
            return Err(MintError::ZeroBalance);
        }

        let amount = self.balance;
        let ticket = self
            .rail
            .prepare(self.owner, amount)
            .inspect_err(|e| warn!("withdraw aborted: {}", e))?;
        self.balance = 0;
        self.rail.settle(ticket);

        self.events.emit(ContractEventData::Withdrawn { to: self.owner, amount });
        info!("Withdrew {} to {}", amount, self.owner.short());
        Ok(amount)
    }

    // =========================================================================
    // OWNER CONFIGURATION
    // =========================================================================

    /// Set the flat unit price.
    pub fn set_unit_price(&mut self, ctx: CallContext, price: u128) -> Result<(), MintError> {
        self.only_owner(&ctx)?;
        self.config.unit_price = price;
        self.config_changed("unit_price");
        Ok(())
    }

    /// Set the global supply cap. Cannot go below the issued count.
    pub fn set_global_supply_cap(&mut self, ctx: CallContext, cap: u64) -> Result<(), MintError> {
        self.only_owner(&ctx)?;
        if cap == 0 {
            return Err(MintError::InvalidAmount);
        }
        let issued = self.accounting.global_issued();
        if cap < issued {
            return Err(MintError::GlobalSupplyExceeded { issued, requested: 0, cap });
        }
        self.config.global_supply_cap = cap;
        self.config_changed("global_supply_cap");
        Ok(())
    }

    /// Set the per-wallet cap. Cannot go below any wallet's count.
    pub fn set_per_wallet_cap(&mut self, ctx: CallContext, cap: u64) -> Result<(), MintError> {
        self.only_owner(&ctx)?;
        if cap == 0 {
            return Err(MintError::InvalidAmount);
        }
        let minted = self.accounting.max_minted_by_any_wallet();
        if cap < minted {
            return Err(MintError::PerWalletLimitExceeded { minted, requested: 0, cap });
        }
        self.config.per_wallet_cap = cap;
        self.config_changed("per_wallet_cap");
        Ok(())
    }

    /// Set the metadata base URI.
    pub fn set_base_uri(&mut self, ctx: CallContext, base_uri: String) -> Result<(), MintError> {
        self.only_owner(&ctx)?;
        self.config.base_uri = base_uri;
        self.config_changed("base_uri");
        Ok(())
    }

    /// Set the metadata URI suffix.
    pub fn set_uri_suffix(&mut self, ctx: CallContext, suffix: String) -> Result<(), MintError> {
        self.only_owner(&ctx)?;
        self.config.uri_suffix = suffix;
        self.config_changed("uri_suffix");
        Ok(())
    }

    /// Set or clear the referral merkle root.
    ///
    /// Also clears the required proof length, which belongs to the old
    /// tree. Call `set_merkle_depth` afterwards to pin the new depth.
    pub fn set_merkle_root(&mut self, ctx: CallContext, root: Option<Digest>) -> Result<(), MintError> {
        self.only_owner(&ctx)?;
        self.config.merkle_root = root;
        self.config_changed("merkle_root");
        if self.config.merkle_depth.take().is_some() {
            self.config_changed("merkle_depth");
        }
        Ok(())
    }

    /// Set or clear the required proof length.
    pub fn set_merkle_depth(&mut self, ctx: CallContext, depth: Option<usize>) -> Result<(), MintError> {
        self.only_owner(&ctx)?;
        self.config.merkle_depth = depth;
        self.config_changed("merkle_depth");
        Ok(())
    }

    /// Pause or unpause public and affiliate mints.
    pub fn set_paused(&mut self, ctx: CallContext, paused: bool) -> Result<(), MintError> {
        self.only_owner(&ctx)?;
        self.config.paused = paused;
        self.config_changed("paused");
        Ok(())
    }

    /// Hand ownership to another principal.
    ///
    /// The zero address renounces it: no caller passes the owner check
    /// afterwards.
    pub fn transfer_ownership(&mut self, ctx: CallContext, new_owner: Address) -> Result<(), MintError> {
        self.only_owner(&ctx)?;
        let previous = self.owner;
        self.owner = new_owner;
        self.events.emit(ContractEventData::OwnershipTransferred { previous, new_owner });
        info!("Ownership transferred from {} to {}", previous.short(), new_owner.short());
        Ok(())
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    /// Owning principal.
    pub fn owner(&self) -> Address {
        self.owner
    }

    /// Current configuration.
    pub fn config(&self) -> &MintConfiguration {
        &self.config
    }

    /// Has a secret been redeemed?
    pub fn is_redeemed(&self, secret: &Secret) -> bool {
        self.secrets.is_redeemed(secret)
    }

    /// Tokens minted by a wallet through capped paths.
    pub fn minted_by(&self, wallet: &Address) -> u64 {
        self.accounting.minted_by(wallet)
    }

    /// Total tokens issued.
    pub fn total_issued(&self) -> u64 {
        self.ledger.total_issued()
    }

    /// Metadata URI for an issued token.
    pub fn token_uri(&self, id: u64) -> Result<String, MintError> {
        if !self.ledger.exists(id) {
            return Err(MintError::NonexistentToken(id));
        }
        Ok(self.config.token_uri(id))
    }

    /// Owner of an issued token.
    pub fn owner_of(&self, id: u64) -> Result<Address, MintError> {
        Ok(self.ledger.owner_of(id)?)
    }

    /// Token ids held by a wallet.
    pub fn tokens_of_owner(&self, wallet: &Address) -> Vec<u64> {
        self.ledger.tokens_of_owner(wallet)
    }

    /// Value held by the contract.
    pub fn balance(&self) -> u128 {
        self.balance
    }

    /// Committed events, oldest first.
    pub fn events(&self) -> &[ContractEvent] {
        self.events.all()
    }

    /// Committed events with `seq >= from`.
    pub fn events_since(&self, from: u64) -> &[ContractEvent] {
        self.events.since(from)
    }

    /// Guard shared with anything that needs to observe withdrawals.
    pub fn withdraw_guard(&self) -> ReentrancyGuard {
        self.withdraw_guard.clone()
    }

    /// Underlying token ledger.
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Underlying payment rail.
    pub fn rail(&self) -> &P {
        &self.rail
    }

    /// Mutable payment rail (for host-side setup).
    pub fn rail_mut(&mut self) -> &mut P {
        &mut self.rail
    }

    /// Digest of all contract-owned state.
    ///
    /// Two contracts that processed the same operations in the same order
    /// have equal digests.
    pub fn state_hash(&self) -> Digest {
        let mut hasher = StateHasher::for_contract_state();
        hasher.update_address(&self.owner);
        self.config.hash_into(&mut hasher);
        self.secrets.hash_into(&mut hasher);
        self.accounting.hash_into(&mut hasher);
        hasher.update_u128(self.balance);
        hasher.update_u64(self.events.len() as u64);
        hasher.finalize()
    }

    // =========================================================================
    // CHECKS
    // =========================================================================

    fn reject_bots(&self, ctx: &CallContext) -> Result<(), MintError> {
        if ctx.is_relayed() {
            warn!("rejected relayed call from {} via {}", ctx.origin.short(), ctx.caller.short());
            return Err(MintError::BotCaller);
        }
        Ok(())
    }

    fn require_not_paused(&self) -> Result<(), MintError> {
        if self.config.paused {
            return Err(MintError::Paused);
        }
        Ok(())
    }

    fn require_unit_price(&self, ctx: &CallContext) -> Result<(), MintError> {
        if ctx.value != self.config.unit_price {
            return Err(MintError::WrongPayment {
                expected: self.config.unit_price,
                got: ctx.value,
            });
        }
        Ok(())
    }

    fn only_owner(&self, ctx: &CallContext) -> Result<(), MintError> {
        if self.owner.is_zero() || ctx.caller != self.owner {
            warn!("owner-only call from {}", ctx.caller.short());
            return Err(MintError::Unauthorized);
        }
        Ok(())
    }

    /// Balance after crediting `value`, checked before anything is staged.
    fn credited_balance(&self, value: u128) -> Result<u128, MintError> {
        self.balance.checked_add(value).ok_or_else(|| {
            warn!("rejected: balance {} cannot take {} more", self.balance, value);
            MintError::BalanceOverflow
        })
    }

    fn config_changed(&mut self, field: &str) {
        debug!("config field {} updated", field);
        self.events.emit(ContractEventData::ConfigChanged { field: field.to_string() });
    }

    fn after_commit(&self, op: &'static str) {
        debug_assert_eq!(self.accounting.global_issued(), self.ledger.total_issued());
        debug_assert!(self.accounting.global_issued() <= self.config.global_supply_cap);
        #[cfg(feature = "debug-tracing")]
        tracing::trace!(op, state_hash = %hex::encode(self.state_hash()), "committed");
        #[cfg(not(feature = "debug-tracing"))]
        let _ = op;
    }
}

// =============================================================================
// TESTS
// =============================================================================
