//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! Messages are JSON; the bincode helpers are kept for flat payloads.
//!
//! Digests travel as 0x-prefixed hex strings. Values travel as decimal
//! strings; plain integers are accepted on input.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::hash::Digest;
use crate::core::types::{decimal, Address, Secret};
use crate::mint::config::MintConfiguration;
use crate::mint::error::MintError;
use crate::mint::events::ContractEvent;
use crate::mint::ledger::TokenIdRange;

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Authenticate with a JWT.
    Auth(AuthRequest),

    /// Public paid mint.
    Mint(MintRequest),

    /// Referral mint with a merkle-proven secret.
    AffiliateMint(AffiliateMintRequest),

    /// Owner-directed mint.
    MintForAddress(MintForAddressRequest),

    /// Withdraw the contract balance to the owner.
    Withdraw,

    /// Change one configuration field.
    Configure {
        /// Field and new value.
        update: ConfigUpdate,
    },

    /// Read contract state.
    Query {
        /// What to read.
        query: QueryRequest,
    },

    /// Receive committed events as they happen.
    Subscribe,

    /// Ping for latency measurement.
    Ping {
        /// Client timestamp, echoed back.
        timestamp: u64,
    },
}

/// Authentication request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthRequest {
    /// JWT issued by the identity provider.
    pub token: String,
    /// Client version for compatibility check.
    pub client_version: String,
}

/// Public mint request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MintRequest {
    /// Tokens to mint.
    pub amount: u64,
    /// Value attached.
    #[serde(with = "decimal")]
    pub value: u128,
}

/// Affiliate mint request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AffiliateMintRequest {
    /// Tokens to mint.
    pub amount: u64,
    /// Value attached.
    #[serde(with = "decimal")]
    pub value: u128,
    /// Referral secret.
    pub secret: Secret,
    /// Sibling digests from leaf to root.
    #[serde(with = "hex_digests")]
    pub proof: Vec<Digest>,
    /// Referrer credited with the tax.
    pub referred: Address,
}

/// Owner-directed mint request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MintForAddressRequest {
    /// Tokens to mint.
    pub amount: u64,
    /// Receiver of the tokens.
    pub receiver: Address,
}

/// A single owner setter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum ConfigUpdate {
    /// Flat unit price.
    UnitPrice(#[serde(with = "decimal")] u128),
    /// Global supply cap.
    GlobalSupplyCap(u64),
    /// Per-wallet cap.
    PerWalletCap(u64),
    /// Metadata base URI.
    BaseUri(String),
    /// Metadata URI suffix.
    UriSuffix(String),
    /// Merkle root (null clears it).
    MerkleRoot(#[serde(with = "hex_digest_opt")] Option<Digest>),
    /// Required proof length (null clears it).
    MerkleDepth(Option<usize>),
    /// Pause flag.
    Paused(bool),
    /// New owner.
    Owner(Address),
}

/// State reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "query", rename_all = "snake_case")]
pub enum QueryRequest {
    /// Current configuration.
    Config,
    /// Owning principal.
    Owner,
    /// Contract balance.
    Balance,
    /// Total tokens issued.
    TotalIssued,
    /// Tokens minted by a wallet through capped paths.
    MintedBy {
        /// Wallet to look up.
        wallet: Address,
    },
    /// Has a secret been redeemed?
    IsRedeemed {
        /// Secret to look up.
        secret: Secret,
    },
    /// Metadata URI of a token.
    TokenUri {
        /// Token id.
        token_id: u64,
    },
    /// Owner of a token.
    OwnerOf {
        /// Token id.
        token_id: u64,
    },
    /// Tokens held by a wallet.
    TokensOfOwner {
        /// Wallet to look up.
        wallet: Address,
    },
    /// Digest of contract state.
    StateHash,
    /// Committed events from a sequence number on.
    Events {
        /// First sequence number to return.
        #[serde(default)]
        since: u64,
    },
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Authentication result.
    AuthResult(AuthResult),

    /// A state-changing operation committed.
    Receipt(Receipt),

    /// Answer to a query.
    QueryResult {
        /// The answer.
        answer: QueryAnswer,
    },

    /// Committed contract event (subscribers only).
    Event(ContractEvent),

    /// Pong response.
    Pong {
        /// Client timestamp.
        timestamp: u64,
        /// Server time (Unix millis).
        server_time: u64,
    },

    /// Error message.
    Error(ServerError),

    /// Server is shutting down.
    Shutdown {
        /// Why.
        reason: String,
    },
}

/// Authentication result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResult {
    /// Whether auth succeeded.
    pub success: bool,
    /// Caller address bound to the connection.
    pub address: Option<Address>,
    /// Error message if failed.
    pub error: Option<String>,
    /// Server version.
    pub server_version: String,
}

/// Receipt for a committed operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    /// Server-assigned request id.
    pub request_id: Uuid,
    /// Commit time.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    pub outcome: ReceiptOutcome,
}

impl Receipt {
    /// Stamp an outcome with a fresh id and the current time.
    pub fn new(outcome: ReceiptOutcome) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            outcome,
        }
    }
}

/// Operation-specific part of a receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReceiptOutcome {
    /// Tokens were issued.
    Minted {
        /// Ids issued.
        tokens: TokenIdRange,
        /// Value received.
        #[serde(with = "decimal")]
        paid: u128,
        /// Part forwarded to the referrer.
        #[serde(with = "decimal")]
        referral_tax: u128,
    },
    /// Balance was withdrawn.
    Withdrawn {
        /// Amount sent to the owner.
        #[serde(with = "decimal")]
        amount: u128,
    },
    /// A configuration field changed.
    Configured {
        /// The applied update.
        update: ConfigUpdate,
    },
}

/// Query answers, one per `QueryRequest` kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "query", content = "value", rename_all = "snake_case")]
pub enum QueryAnswer {
    /// Current configuration.
    Config(MintConfiguration),
    /// Owning principal.
    Owner(Address),
    /// Contract balance.
    Balance(#[serde(with = "decimal")] u128),
    /// Total issued.
    TotalIssued(u64),
    /// Minted by the wallet.
    MintedBy(u64),
    /// Redemption status.
    IsRedeemed(bool),
    /// Token URI.
    TokenUri(String),
    /// Token owner.
    OwnerOf(Address),
    /// Token ids.
    TokensOfOwner(Vec<u64>),
    /// State digest.
    StateHash(#[serde(with = "hex_digest")] Digest),
    /// Events.
    Events(Vec<ContractEvent>),
}

/// Server error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Stable rejection reason for `Rejected`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ServerError {
    /// Error without a rejection reason.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), reason: None }
    }
}

impl From<&MintError> for ServerError {
    fn from(err: &MintError) -> Self {
        Self {
            code: ErrorCode::Rejected,
            message: err.to_string(),
            reason: Some(err.code().to_string()),
        }
    }
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Authentication failed.
    AuthFailed,
    /// Not authenticated.
    NotAuthenticated,
    /// JWT has expired.
    TokenExpired,
    /// JWT is invalid.
    InvalidToken,
    /// Message could not be parsed.
    InvalidInput,
    /// The contract rejected the operation.
    Rejected,
    /// Too many connections.
    ServerOverloaded,
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl MintRequest {
    /// Serialize to binary.
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize from binary.
    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}

fn digest_from_hex(s: &str) -> Result<Digest, String> {
    let bytes = hex::decode(s.trim_start_matches("0x")).map_err(|e| e.to_string())?;
    Digest::try_from(bytes.as_slice()).map_err(|_| format!("expected 32 bytes, got {}", bytes.len()))
}

fn digest_to_hex(d: &Digest) -> String {
    format!("0x{}", hex::encode(d))
}

mod hex_digest {
    use super::*;
    use serde::{de::Error, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Digest, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&digest_to_hex(d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Digest, D::Error> {
        let s = String::deserialize(d)?;
        digest_from_hex(&s).map_err(D::Error::custom)
    }
}

mod hex_digest_opt {
    use super::*;
    use serde::{de::Error, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Option<Digest>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&digest_to_hex(d)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Digest>, D::Error> {
        Option::<String>::deserialize(d)?
            .map(|s| digest_from_hex(&s).map_err(D::Error::custom))
            .transpose()
    }
}

mod hex_digests {
    use super::*;
    use serde::{de::Error, ser::SerializeSeq, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ds: &[Digest], s: S) -> Result<S::Ok, S::Error> {
        let mut seq = s.serialize_seq(Some(ds.len()))?;
        for d in ds {
            seq.serialize_element(&digest_to_hex(d))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Digest>, D::Error> {
        Vec::<String>::deserialize(d)?
            .iter()
            .map(|s| digest_from_hex(s).map_err(D::Error::custom))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mint::events::{ContractEventData, MintPath};

    #[test]
    fn test_affiliate_request_json() {
        let json = r#"{
            "type": "affiliate_mint",
            "amount": 2,
            "value": 1000,
            "secret": "0x0102030405060708",
            "proof": ["0x0000000000000000000000000000000000000000000000000000000000000011"],
            "referred": "0xb0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0"
        }"#;

        let msg = ClientMessage::from_json(json).unwrap();
        let ClientMessage::AffiliateMint(req) = msg else {
            panic!("Wrong message type");
        };
        assert_eq!(req.amount, 2);
        assert_eq!(req.value, 1000);
        assert_eq!(req.secret, Secret::new([1, 2, 3, 4, 5, 6, 7, 8]));
        assert_eq!(req.proof.len(), 1);
        assert_eq!(req.proof[0][31], 0x11);
        assert_eq!(req.referred, Address::new([0xb0; 20]));
    }

    #[test]
    fn test_bad_proof_digest_rejected() {
        let json = r#"{"type":"affiliate_mint","amount":1,"value":0,
            "secret":"0x0102030405060708","proof":["0x1234"],
            "referred":"0xb0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0"}"#;
        assert!(ClientMessage::from_json(json).is_err());
    }

    #[test]
    fn test_configure_json_shape() {
        let msg = ClientMessage::Configure { update: ConfigUpdate::Paused(false) };
        let json = msg.to_json().unwrap();
        assert!(json.contains(r#""type":"configure""#));
        assert!(json.contains(r#""field":"paused""#));

        let clear = r#"{"type":"configure","update":{"field":"merkle_root","value":null}}"#;
        match ClientMessage::from_json(clear).unwrap() {
            ClientMessage::Configure { update } => assert_eq!(update, ConfigUpdate::MerkleRoot(None)),
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_query_json() {
        let json = r#"{"type":"query","query":{"query":"token_uri","token_id":7}}"#;
        match ClientMessage::from_json(json).unwrap() {
            ClientMessage::Query { query } => assert_eq!(query, QueryRequest::TokenUri { token_id: 7 }),
            other => panic!("Wrong message type: {:?}", other),
        }

        let json = r#"{"type":"query","query":{"query":"events"}}"#;
        match ClientMessage::from_json(json).unwrap() {
            ClientMessage::Query { query } => assert_eq!(query, QueryRequest::Events { since: 0 }),
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_rejection_carries_reason() {
        let err = ServerError::from(&MintError::SelfReferral);
        let json = ServerMessage::Error(err).to_json().unwrap();
        assert!(json.contains("rejected"));
        assert!(json.contains(MintError::SelfReferral.code()));
    }

    #[test]
    fn test_receipt_roundtrip() {
        let receipt = Receipt::new(ReceiptOutcome::Minted {
            tokens: TokenIdRange { first: 4, count: 2 },
            paid: 1000,
            referral_tax: 150,
        });
        let id = receipt.request_id;

        let json = ServerMessage::Receipt(receipt).to_json().unwrap();
        match ServerMessage::from_json(&json).unwrap() {
            ServerMessage::Receipt(r) => {
                assert_eq!(r.request_id, id);
                assert!(matches!(r.outcome, ReceiptOutcome::Minted { referral_tax: 150, .. }));
            }
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_event_message() {
        let event = ContractEvent {
            seq: 3,
            data: ContractEventData::Minted {
                receiver: Address::new([1; 20]),
                tokens: TokenIdRange { first: 1, count: 1 },
                path: MintPath::Affiliate,
            },
        };
        let json = ServerMessage::Event(event.clone()).to_json().unwrap();
        assert!(json.contains(r#""kind":"minted""#));
        match ServerMessage::from_json(&json).unwrap() {
            ServerMessage::Event(parsed) => assert_eq!(parsed, event),
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_state_hash_answer_is_hex() {
        let answer = QueryAnswer::StateHash([0xab; 32]);
        let json = ServerMessage::QueryResult { answer }.to_json().unwrap();
        assert!(json.contains(&format!("0x{}", "ab".repeat(32))));
    }

    #[test]
    fn test_binary_mint_request() {
        let req = MintRequest { amount: 3, value: u128::MAX };
        let bytes = req.to_bytes().unwrap();
        let parsed = MintRequest::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.amount, 3);
        assert_eq!(parsed.value, u128::MAX);
    }

    #[test]
    fn test_mint_values_as_strings() {
        let msg = ClientMessage::Mint(MintRequest { amount: 1, value: u128::MAX });
        let json = msg.to_json().unwrap();
        assert!(json.contains(&format!(r#""value":"{}""#, u128::MAX)));
        match ClientMessage::from_json(&json).unwrap() {
            ClientMessage::Mint(req) => assert_eq!(req.value, u128::MAX),
            other => panic!("Wrong message type: {:?}", other),
        }

        let json = r#"{"type":"configure","update":{"field":"unit_price","value":"250"}}"#;
        match ClientMessage::from_json(json).unwrap() {
            ClientMessage::Configure { update } => assert_eq!(update, ConfigUpdate::UnitPrice(250)),
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_balance_and_config_answers_roundtrip() {
        for answer in [
            QueryAnswer::Balance(u128::MAX),
            QueryAnswer::Config(MintConfiguration { unit_price: 1u128 << 100, ..Default::default() }),
        ] {
            let json = ServerMessage::QueryResult { answer: answer.clone() }.to_json().unwrap();
            match ServerMessage::from_json(&json).unwrap() {
                ServerMessage::QueryResult { answer: parsed } => assert_eq!(parsed, answer),
                other => panic!("Wrong message type: {:?}", other),
            }
        }
    }

    #[test]
    fn test_withdrawn_event_roundtrip() {
        let event = ContractEvent {
            seq: 9,
            data: ContractEventData::Withdrawn { to: Address::new([2; 20]), amount: u128::MAX - 1 },
        };
        let json = ServerMessage::Event(event.clone()).to_json().unwrap();
        match ServerMessage::from_json(&json).unwrap() {
            ServerMessage::Event(parsed) => assert_eq!(parsed, event),
            other => panic!("Wrong message type: {:?}", other),
        }
    }
}
