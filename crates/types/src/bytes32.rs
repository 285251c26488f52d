//! 32-byte value type with Keccak256 support.
//!
//! [`Bytes32`] is used for block ids, transaction ids, state roots and
//! every other 32-byte consensus value. Block ids additionally encode
//! the block number in their first four bytes (big-endian), which lets
//! the BFT overlay map an `NV` pointer back to a view number without a
//! repository lookup.

use crate::{Error, Result};
use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};
use std::fmt;
use std::str::FromStr;

/// Size of a 32-byte value
pub const BYTES32_SIZE: usize = 32;

/// A 32-byte consensus value.
///
/// # Example
///
/// ```rust
/// use thor_types::Bytes32;
///
/// let digest = Bytes32::keccak256(b"hello world");
/// assert_ne!(digest, Bytes32::ZERO);
///
/// let parsed: Bytes32 =
///     "0x47173285a8d7341e5e972fc677286384f802f8ef42a5ec5f03bbfa254cb01fad"
///         .parse()
///         .unwrap();
/// assert_eq!(parsed, digest);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Bytes32([u8; BYTES32_SIZE]);

impl Bytes32 {
    /// The all-zero value, used for "no id" and empty roots.
    pub const ZERO: Self = Self([0u8; BYTES32_SIZE]);

    /// Creates a value from a 32-byte array.
    #[inline]
    pub const fn new(bytes: [u8; BYTES32_SIZE]) -> Self {
        Self(bytes)
    }

    /// Creates a value from a slice.
    ///
    /// Returns an error if the slice length is not exactly 32 bytes.
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        if slice.len() != BYTES32_SIZE {
            return Err(Error::InvalidLength {
                expected: BYTES32_SIZE,
                actual: slice.len(),
            });
        }
        let mut bytes = [0u8; BYTES32_SIZE];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    /// Computes the Keccak256 digest of `data`.
    pub fn keccak256(data: &[u8]) -> Self {
        let mut hasher = Keccak256::new();
        hasher.update(data);
        let digest = hasher.finalize();
        let mut bytes = [0u8; BYTES32_SIZE];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    /// Computes the Keccak256 digest of multiple slices without
    /// concatenating them first.
    pub fn keccak256_concat(data: &[&[u8]]) -> Self {
        let mut hasher = Keccak256::new();
        for slice in data {
            hasher.update(slice);
        }
        let digest = hasher.finalize();
        let mut bytes = [0u8; BYTES32_SIZE];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    /// Returns the value as a byte slice.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the value as a fixed-size byte array.
    #[inline]
    pub const fn as_fixed_bytes(&self) -> &[u8; BYTES32_SIZE] {
        &self.0
    }

    /// Checks for the all-zero value.
    #[inline]
    pub fn is_zero(&self) -> bool {
        self == &Self::ZERO
    }

    /// Reads the block number out of a block id (the big-endian u32 in
    /// the first four bytes).
    #[inline]
    pub fn block_number(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }

    /// Overwrites the first four bytes with a big-endian block number,
    /// turning a header digest into a block id.
    pub fn with_block_number(mut self, number: u32) -> Self {
        self.0[..4].copy_from_slice(&number.to_be_bytes());
        self
    }

    /// Parses from hex, with or without a `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        if s.len() != 64 {
            return Err(Error::InvalidHash(format!(
                "expected 64 hex characters, got {}",
                s.len()
            )));
        }
        let bytes = hex::decode(s)?;
        Self::from_slice(&bytes)
    }

    /// Returns the hex representation with a `0x` prefix.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

/// Parses a hex literal, panicking on malformed input. For static
/// tables of well-known values only.
pub fn must_parse_bytes32(s: &str) -> Bytes32 {
    Bytes32::from_hex(s).expect("invalid bytes32 literal")
}

impl fmt::Debug for Bytes32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bytes32(0x{})", hex::encode(self.0))
    }
}

impl fmt::Display for Bytes32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Bytes32 {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl From<[u8; BYTES32_SIZE]> for Bytes32 {
    fn from(bytes: [u8; BYTES32_SIZE]) -> Self {
        Self(bytes)
    }
}

impl From<Bytes32> for [u8; BYTES32_SIZE] {
    fn from(value: Bytes32) -> Self {
        value.0
    }
}

impl AsRef<[u8]> for Bytes32 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for Bytes32 {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Bytes32 {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

impl Encodable for Bytes32 {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.encoder().encode_value(&self.0);
    }
}

impl Decodable for Bytes32 {
    fn decode(rlp: &Rlp<'_>) -> std::result::Result<Self, DecoderError> {
        let bytes: Vec<u8> = rlp.as_val()?;
        if bytes.len() != BYTES32_SIZE {
            return Err(DecoderError::RlpInvalidLength);
        }
        let mut arr = [0u8; BYTES32_SIZE];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}
