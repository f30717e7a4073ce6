//! Withdraw Guard
//!
//! Mutual exclusion for fund-moving operations. Acquiring returns a scoped
//! token; dropping it releases the guard on every exit path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::mint::error::MintError;

/// Shared in-flight flag.
///
/// Cloning shares the flag, so a payment rail holding a clone can observe
/// or attempt to re-acquire it during a transfer.
#[derive(Debug, Clone, Default)]
pub struct ReentrancyGuard {
    entered: Arc<AtomicBool>,
}

/// Held while a guarded operation runs.
#[derive(Debug)]
#[must_use = "the guard is released as soon as this is dropped"]
pub struct GuardToken {
    entered: Arc<AtomicBool>,
}

impl ReentrancyGuard {
    /// Create an unlocked guard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter the guarded section, or fail if already inside it.
    pub fn enter(&self) -> Result<GuardToken, MintError> {
        self.entered
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| MintError::ReentrantCall)?;
        Ok(GuardToken { entered: self.entered.clone() })
    }

    /// Is a guarded operation in flight?
    pub fn is_entered(&self) -> bool {
        self.entered.load(Ordering::Acquire)
    }
}

impl Drop for GuardToken {
    fn drop(&mut self) {
        self.entered.store(false, Ordering::Release);
    }
}
