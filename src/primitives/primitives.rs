// Core primitives: field elements and protocol constants
use ark_bn254::Fr;
use ark_ff::{BigInteger, PrimeField, Zero};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::str::FromStr;

use super::error::{Result, TicketError};

/// Unix time in milliseconds
pub type Timestamp = i64;

/// Element of the BN254 scalar field, the field shared by the hash,
/// signature and proof primitives.
///
/// Serialized as a canonical decimal string. Parsing also accepts
/// `0x`-prefixed hex. Values outside `[0, p)` and non-canonical spellings
/// are rejected instead of being reduced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldElement(pub Fr);

impl FieldElement {
    pub fn zero() -> Self {
        FieldElement(Fr::zero())
    }

    pub fn from_u64(value: u64) -> Self {
        FieldElement(Fr::from(value))
    }

    pub fn from_u128(value: u128) -> Self {
        FieldElement(Fr::from(value))
    }

    pub fn inner(&self) -> Fr {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Reduce arbitrary little-endian bytes into the field
    pub fn from_le_bytes_mod_order(bytes: &[u8]) -> Self {
        FieldElement(Fr::from_le_bytes_mod_order(bytes))
    }

    pub fn to_bytes_le(&self) -> Vec<u8> {
        self.0.into_bigint().to_bytes_le()
    }

    pub fn to_bytes_be(&self) -> Vec<u8> {
        self.0.into_bigint().to_bytes_be()
    }

    pub fn to_decimal(&self) -> String {
        self.0.into_bigint().to_string()
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.to_bytes_be()))
    }

    /// Small integer view, used when decoding lookup-table codes
    pub fn to_u64(&self) -> Option<u64> {
        let limbs = self.0.into_bigint().0;
        if limbs[1..].iter().all(|limb| *limb == 0) {
            Some(limbs[0])
        } else {
            None
        }
    }

    /// Parse a decimal or `0x` hex string
    pub fn parse(input: &str) -> Result<Self> {
        match input.strip_prefix("0x").or_else(|| input.strip_prefix("0X")) {
            Some(hex_digits) => Self::parse_hex(hex_digits, input),
            None => Self::parse_decimal(input),
        }
    }

    fn parse_decimal(input: &str) -> Result<Self> {
        let well_formed = !input.is_empty()
            && input.bytes().all(|b| b.is_ascii_digit())
            && (input == "0" || !input.starts_with('0'));
        if !well_formed {
            return Err(TicketError::Validation(format!(
                "not a canonical decimal field element: {:?}",
                input
            )));
        }

        let value = Fr::from_str(input).map_err(|_| {
            TicketError::Validation(format!("not a field element: {:?}", input))
        })?;

        // from_str reduces modulo p; round-trip to reject out-of-range input
        if value.into_bigint().to_string() != input {
            return Err(TicketError::Validation(format!(
                "field element out of range: {}",
                input
            )));
        }

        Ok(FieldElement(value))
    }

    fn parse_hex(digits: &str, original: &str) -> Result<Self> {
        if digits.is_empty() || digits.len() > 64 {
            return Err(TicketError::Validation(format!(
                "bad hex field element length: {:?}",
                original
            )));
        }

        let padded = format!("{:0>64}", digits);
        let bytes = hex::decode(&padded).map_err(|e| {
            TicketError::Validation(format!("bad hex field element {:?}: {}", original, e))
        })?;

        let value = Fr::from_be_bytes_mod_order(&bytes);
        if value.into_bigint().to_bytes_be() != bytes {
            return Err(TicketError::Validation(format!(
                "field element out of range: {}",
                original
            )));
        }

        Ok(FieldElement(value))
    }
}

impl From<u64> for FieldElement {
    fn from(value: u64) -> Self {
        Self::from_u64(value)
    }
}

impl From<Fr> for FieldElement {
    fn from(value: Fr) -> Self {
        FieldElement(value)
    }
}

impl FromStr for FieldElement {
    type Err = TicketError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl std::fmt::Display for FieldElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}

impl Serialize for FieldElement {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_decimal())
    }
}

impl<'de> Deserialize<'de> for FieldElement {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        FieldElement::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Protocol constants
pub struct Policy;

impl Policy {
    /// Merkle accumulator depth expected by the ownership circuit
    pub const TREE_DEPTH: usize = 20;

    /// Two check-ins on different contexts closer than this are parallel use
    pub const FRAUD_WINDOW_MS: i64 = 20 * 60 * 1000;

    /// Lifetime of a copy-protection registration
    pub const COPY_PROTECTION_TTL_MS: i64 = 5 * 60 * 1000;

    /// Other active contexts needed before a new context is refused
    pub const COPY_CONFLICT_THRESHOLD: usize = 1;

    /// Upper bound for an external proof verification
    pub const PROOF_TIMEOUT_MS: u64 = 5_000;

    /// Version of the signed message layout
    /// `[origin, destination, date, class, product_type, ticket_id, C]`
    pub const MESSAGE_LAYOUT_VERSION: u32 = 1;
}
