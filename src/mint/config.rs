//! Mint Configuration
//!
//! Owner-mutable parameters. Each setter on the contract touches exactly
//! one field here.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::hash::{Digest, StateHasher};
use crate::core::types::{decimal, Address};
use crate::proof::merkle::MerkleVerifier;

/// Process-wide mint parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintConfiguration {
    /// Flat price per call in the smallest currency unit.
    ///
    /// Compared against the attached value regardless of the amount minted.
    #[serde(with = "decimal")]
    pub unit_price: u128,
    /// Maximum tokens ever issued.
    pub global_supply_cap: u64,
    /// Maximum tokens a wallet may mint through public and affiliate paths.
    pub per_wallet_cap: u64,
    /// Rejects public and affiliate mints when set.
    pub paused: bool,
    /// Root committing to the referral secrets. None = no whitelist configured.
    pub merkle_root: Option<Digest>,
    /// Required proof length. None = any length up to the verifier maximum.
    pub merkle_depth: Option<usize>,
    /// Metadata base URI. Empty = token URIs are empty.
    pub base_uri: String,
    /// Appended after the token id.
    pub uri_suffix: String,
}

impl Default for MintConfiguration {
    fn default() -> Self {
        Self {
            unit_price: 0,
            global_supply_cap: 10_000,
            per_wallet_cap: 10,
            paused: true,
            merkle_root: None,
            merkle_depth: None,
            base_uri: String::new(),
            uri_suffix: ".json".to_string(),
        }
    }
}

impl MintConfiguration {
    /// Verifier carrying the configured proof-length policy.
    pub fn verifier(&self) -> MerkleVerifier {
        MerkleVerifier { expected_depth: self.merkle_depth }
    }

    /// Metadata URI for a token id (existence is checked by the caller).
    pub fn token_uri(&self, id: u64) -> String {
        if self.base_uri.is_empty() {
            return String::new();
        }
        format!("{}{}{}", self.base_uri, id, self.uri_suffix)
    }

    /// Feed all fields into a state hasher.
    pub fn hash_into(&self, hasher: &mut StateHasher) {
        hasher.update_u128(self.unit_price);
        hasher.update_u64(self.global_supply_cap);
        hasher.update_u64(self.per_wallet_cap);
        hasher.update_bool(self.paused);
        hasher.update_opt_digest(self.merkle_root.as_ref());
        hasher.update_u64(self.merkle_depth.map(|d| d as u64 + 1).unwrap_or(0));
        hasher.update_str(&self.base_uri);
        hasher.update_str(&self.uri_suffix);
    }
}

fn env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn parsed<T: FromStr>(key: &str) -> Option<T> {
    env(key).and_then(|v| v.parse().ok())
}

/// Initial owner and configuration, loaded from the environment.
#[derive(Debug, Clone)]
pub struct ContractSettings {
    /// Owning principal.
    pub owner: Address,
    /// Starting configuration.
    pub config: MintConfiguration,
}

impl ContractSettings {
    /// Create settings from environment variables.
    ///
    /// Unset or unparsable variables fall back to defaults.
    pub fn from_env() -> Self {
        let defaults = MintConfiguration::default();

        let merkle_root = env("MINT_MERKLE_ROOT").and_then(|v| {
            let bytes = hex::decode(v.trim_start_matches("0x")).ok()?;
            <Digest>::try_from(bytes.as_slice()).ok()
        });

        Self {
            owner: parsed("MINT_OWNER").unwrap_or(Address::ZERO),
            config: MintConfiguration {
                unit_price: parsed("MINT_UNIT_PRICE").unwrap_or(defaults.unit_price),
                global_supply_cap: parsed("MINT_GLOBAL_SUPPLY_CAP").unwrap_or(defaults.global_supply_cap),
                per_wallet_cap: parsed("MINT_PER_WALLET_CAP").unwrap_or(defaults.per_wallet_cap),
                paused: env("MINT_PAUSED")
                    .map(|v| v == "true" || v == "1")
                    .unwrap_or(defaults.paused),
                merkle_root,
                merkle_depth: parsed("MINT_MERKLE_DEPTH"),
                base_uri: env("MINT_BASE_URI").unwrap_or(defaults.base_uri),
                uri_suffix: env("MINT_URI_SUFFIX").unwrap_or(defaults.uri_suffix),
            },
        }
    }
}
