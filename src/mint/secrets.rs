//! Secret Ledger
//!
//! Tracks which one-time referral secrets have been redeemed.
//! Uses BTreeSet for deterministic iteration order.

use std::collections::BTreeSet;

use crate::core::hash::StateHasher;
use crate::core::types::Secret;
use crate::mint::error::MintError;

/// Insert-once set of redeemed secrets.
#[derive(Debug, Clone, Default)]
pub struct SecretLedger {
    redeemed: BTreeSet<Secret>,
}

impl SecretLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Has this secret been redeemed?
    pub fn is_redeemed(&self, secret: &Secret) -> bool {
        self.redeemed.contains(secret)
    }

    /// Mark a secret as redeemed.
    ///
    /// A secret transitions to redeemed at most once and never back.
    pub fn mark_redeemed(&mut self, secret: Secret) -> Result<(), MintError> {
        if !self.redeemed.insert(secret) {
            return Err(MintError::AlreadyRedeemed);
        }
        Ok(())
    }

    /// Number of redeemed secrets.
    pub fn redeemed_count(&self) -> usize {
        self.redeemed.len()
    }

    /// Feed the redeemed set into a state hasher (sorted order).
    pub fn hash_into(&self, hasher: &mut StateHasher) {
        hasher.update_u64(self.redeemed.len() as u64);
        for secret in &self.redeemed {
            hasher.update_bytes(secret.as_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_once() {
        let mut ledger = SecretLedger::new();
        let secret = Secret::new([1; 8]);

        assert!(!ledger.is_redeemed(&secret));
        assert_eq!(ledger.mark_redeemed(secret), Ok(()));
        assert!(ledger.is_redeemed(&secret));

        assert_eq!(ledger.mark_redeemed(secret), Err(MintError::AlreadyRedeemed));
        assert!(ledger.is_redeemed(&secret));
        assert_eq!(ledger.redeemed_count(), 1);
    }

    #[test]
    fn test_secrets_are_independent() {
        let mut ledger = SecretLedger::new();
        ledger.mark_redeemed(Secret::new([1; 8])).unwrap();
        assert!(!ledger.is_redeemed(&Secret::new([2; 8])));
    }
}
