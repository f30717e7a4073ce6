//! Wallet addresses and referral secrets.
//!
//! Both are fixed-width byte arrays rendered as `0x`-prefixed hex on the
//! wire. Both implement `Ord` so they can key `BTreeMap`s.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors parsing hex-encoded identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Input is not valid hex.
    #[error("invalid hex: {0}")]
    InvalidHex(String),
    /// Decoded byte length is wrong.
    #[error("expected {expected} bytes, got {got}")]
    WrongLength {
        /// Required byte length.
        expected: usize,
        /// Decoded byte length.
        got: usize,
    },
}

/// Decode `0x`-optional hex into a fixed-width array.
fn decode_fixed<const N: usize>(s: &str) -> Result<[u8; N], ParseError> {
    let trimmed = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(trimmed).map_err(|e| ParseError::InvalidHex(e.to_string()))?;
    if bytes.len() != N {
        return Err(ParseError::WrongLength { expected: N, got: bytes.len() });
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes);
    Ok(out)
}

// =============================================================================
// ADDRESS
// =============================================================================

/// 20-byte wallet address.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(pub [u8; 20]);

impl Address {
    /// The all-zero address. Never a valid receiver.
    pub const ZERO: Address = Address([0; 20]);

    /// Create from raw bytes.
    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Is this the zero address?
    pub fn is_zero(&self) -> bool {
        self.0 == [0; 20]
    }

    /// Short form for log lines (first 4 bytes).
    pub fn short(&self) -> String {
        format!("0x{}", hex::encode(&self.0[..4]))
    }
}

impl FromStr for Address {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_fixed::<20>(s).map(Self)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl TryFrom<String> for Address {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.to_string()
    }
}

// =============================================================================
// SECRET
// =============================================================================

/// 8-byte one-time referral secret.
///
/// Its SHA-256 hash is a leaf of the committed merkle tree.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Secret(pub [u8; 8]);

impl Secret {
    /// Create from raw bytes.
    pub const fn new(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }
}

impl FromStr for Secret {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_fixed::<8>(s).map(Self)
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

// Secrets are capabilities; keep them out of debug output.
impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret(0x{}..)", hex::encode(&self.0[..2]))
    }
}

impl TryFrom<String> for Secret {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Secret> for String {
    fn from(value: Secret) -> Self {
        value.to_string()
    }
}

// =============================================================================
// VALUES
// =============================================================================

/// Serde adapter for `u128` values.
///
/// Human-readable formats carry a decimal string, since JSON numbers lose
/// range and serde cannot buffer a `u128` inside tagged enums. Plain JSON
/// numbers up to `u64::MAX` are still accepted on input. Binary formats
/// keep the native integer.
pub mod decimal {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Text(String),
        Number(u64),
    }

    /// Serialize a value.
    pub fn serialize<S: Serializer>(value: &u128, s: S) -> Result<S::Ok, S::Error> {
        if s.is_human_readable() {
            s.collect_str(value)
        } else {
            s.serialize_u128(*value)
        }
    }

    /// Deserialize a value.
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u128, D::Error> {
        if !d.is_human_readable() {
            return u128::deserialize(d);
        }
        match Repr::deserialize(d)? {
            Repr::Text(text) => text
                .parse()
                .map_err(|_| D::Error::custom(format!("invalid value {:?}", text))),
            Repr::Number(n) => Ok(u128::from(n)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_parse_and_display() {
        let addr: Address = "0x00112233445566778899aabbccddeeff00112233".parse().unwrap();
        assert_eq!(addr.0[0], 0x00);
        assert_eq!(addr.0[19], 0x33);
        assert_eq!(addr.to_string(), "0x00112233445566778899aabbccddeeff00112233");

        // Prefix is optional
        let bare: Address = "00112233445566778899aabbccddeeff00112233".parse().unwrap();
        assert_eq!(addr, bare);
    }

    #[test]
    fn test_address_wrong_length() {
        let result = "0x0011".parse::<Address>();
        assert_eq!(result, Err(ParseError::WrongLength { expected: 20, got: 2 }));
        assert!(matches!("0xzz".parse::<Address>(), Err(ParseError::InvalidHex(_))));
    }

    #[test]
    fn test_secret_json_is_hex_string() {
        let secret = Secret::new([0xde, 0xad, 0xbe, 0xef, 0, 1, 2, 3]);
        let json = serde_json::to_string(&secret).unwrap();
        assert_eq!(json, "\"0xdeadbeef00010203\"");
        let back: Secret = serde_json::from_str(&json).unwrap();
        assert_eq!(back, secret);
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        let secret = Secret::new([0xde, 0xad, 0xbe, 0xef, 0, 1, 2, 3]);
        let debug = format!("{:?}", secret);
        assert!(!debug.contains("beef"));
    }

    #[test]
    fn test_zero_address() {
        assert!(Address::ZERO.is_zero());
        assert!(!Address::new([1; 20]).is_zero());
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "type")]
    enum Tagged {
        Paid {
            #[serde(with = "decimal")]
            value: u128,
        },
    }

    #[test]
    fn test_decimal_inside_tagged_enum() {
        let big = Tagged::Paid { value: u128::MAX };
        let json = serde_json::to_string(&big).unwrap();
        assert!(json.contains(&format!("\"{}\"", u128::MAX)));
        assert_eq!(serde_json::from_str::<Tagged>(&json).unwrap(), big);

        let plain: Tagged = serde_json::from_str(r#"{"type":"Paid","value":1000}"#).unwrap();
        assert_eq!(plain, Tagged::Paid { value: 1000 });

        assert!(serde_json::from_str::<Tagged>(r#"{"type":"Paid","value":"12x"}"#).is_err());
        assert!(serde_json::from_str::<Tagged>(r#"{"type":"Paid","value":-1}"#).is_err());
    }
}
