//! Account address type with `0x` prefix.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AddressError;

/// A 20-byte account address, rendered as `0x`-prefixed lowercase hex.
///
/// Serialized as its string form so JSON intake and TOML config can carry
/// addresses verbatim.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address([u8; 20]);

impl Address {
    /// The standard prefix for all rendered addresses.
    pub const PREFIX: &'static str = "0x";

    /// The all-zero address. Never a valid caller or recipient.
    pub const ZERO: Self = Self([0u8; 20]);

    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Parse a `0x`-prefixed, 40-hex-digit address.
    pub fn parse(raw: &str) -> Result<Self, AddressError> {
        let digits = raw
            .strip_prefix(Self::PREFIX)
            .ok_or_else(|| AddressError::MissingPrefix(raw.to_string()))?;
        if digits.len() != 40 {
            return Err(AddressError::BadLength(digits.len()));
        }
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(digits, &mut bytes)
            .map_err(|e| AddressError::BadHex(e.to_string()))?;
        Ok(Self(bytes))
    }

    /// Deterministic address for tests and fixtures: every byte set to `n`.
    pub const fn repeat(n: u8) -> Self {
        Self([n; 20])
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", Self::PREFIX, hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({}{}..)", Self::PREFIX, hex::encode(&self.0[..4]))
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = AddressError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Address> for String {
    fn from(a: Address) -> Self {
        a.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_roundtrips_display() {
        let raw = "0x00112233445566778899aabbccddeeff00112233";
        let addr = Address::parse(raw).unwrap();
        assert_eq!(addr.to_string(), raw);
    }

    #[test]
    fn parse_rejects_missing_prefix() {
        let err = Address::parse("00112233445566778899aabbccddeeff00112233").unwrap_err();
        assert!(matches!(err, AddressError::MissingPrefix(_)));
    }

    #[test]
    fn parse_rejects_wrong_length() {
        assert!(matches!(
            Address::parse("0x1234").unwrap_err(),
            AddressError::BadLength(4)
        ));
    }

    #[test]
    fn parse_rejects_non_hex() {
        let raw = "0xzz112233445566778899aabbccddeeff00112233";
        assert!(matches!(
            Address::parse(raw).unwrap_err(),
            AddressError::BadHex(_)
        ));
    }

    #[test]
    fn json_uses_string_form() {
        let addr = Address::repeat(0xab);
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, format!("\"{}\"", addr));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }
}
