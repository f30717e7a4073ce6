//! Contract Events
//!
//! Append-only log of committed operations, in commit order.
//! Only successful operations emit events.

use serde::{Deserialize, Serialize};

use crate::core::types::{decimal, Address, Secret};
use crate::mint::ledger::TokenIdRange;

/// Which path issued tokens.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MintPath {
    /// Public paid mint.
    Public,
    /// Merkle-gated referral mint.
    Affiliate,
    /// Owner-directed mint.
    Owner,
}

/// Event data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContractEventData {
    /// A referral secret was redeemed.
    Referral {
        minter: Address,
        referred: Address,
        secret: Secret,
    },

    /// Tokens were issued.
    Minted {
        receiver: Address,
        tokens: TokenIdRange,
        path: MintPath,
    },

    /// Contract balance was withdrawn.
    Withdrawn {
        to: Address,
        #[serde(with = "decimal")]
        amount: u128,
    },

    /// An owner setter changed a field.
    ConfigChanged {
        field: String,
    },

    /// Ownership moved to a new principal.
    OwnershipTransferred {
        previous: Address,
        new_owner: Address,
    },
}

/// An event with its position in the log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractEvent {
    /// Position in the log (0-based, gap-free)
    pub seq: u64,

    /// Event data
    pub data: ContractEventData,
}

/// Append-only event log.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<ContractEvent>,
}

impl EventLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event and return the stored copy.
    pub fn emit(&mut self, data: ContractEventData) -> &ContractEvent {
        let seq = self.events.len() as u64;
        self.events.push(ContractEvent { seq, data });
        &self.events[self.events.len() - 1]
    }

    /// All events in order.
    pub fn all(&self) -> &[ContractEvent] {
        &self.events
    }

    /// Events with `seq >= from`.
    pub fn since(&self, from: u64) -> &[ContractEvent] {
        let start = (from as usize).min(self.events.len());
        &self.events[start..]
    }

    /// Number of events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Is the log empty?
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Referral records only, in order.
    pub fn referrals(&self) -> impl Iterator<Item = (&Address, &Address, &Secret)> {
        self.events.iter().filter_map(|e| match &e.data {
            ContractEventData::Referral { minter, referred, secret } => Some((minter, referred, secret)),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_numbers() {
        let mut log = EventLog::new();
        log.emit(ContractEventData::ConfigChanged { field: "paused".into() });
        let seq = log
            .emit(ContractEventData::Withdrawn { to: Address::new([1; 20]), amount: 5 })
            .seq;
        assert_eq!(seq, 1);
        assert_eq!(log.since(1).len(), 1);
        assert!(log.since(10).is_empty());
    }

    #[test]
    fn test_referral_filter() {
        let mut log = EventLog::new();
        let minter = Address::new([1; 20]);
        let referred = Address::new([2; 20]);
        let secret = Secret::new([3; 8]);

        log.emit(ContractEventData::Minted {
            receiver: minter,
            tokens: TokenIdRange { first: 1, count: 1 },
            path: MintPath::Affiliate,
        });
        log.emit(ContractEventData::Referral { minter, referred, secret });

        let referrals: Vec<_> = log.referrals().collect();
        assert_eq!(referrals, vec![(&minter, &referred, &secret)]);
    }

    #[test]
    fn test_event_json_is_tagged() {
        let event = ContractEvent {
            seq: 0,
            data: ContractEventData::Referral {
                minter: Address::new([1; 20]),
                referred: Address::new([2; 20]),
                secret: Secret::new([3; 8]),
            },
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"kind\":\"referral\""));
        assert!(json.contains("0x0303030303030303"));
    }
}
