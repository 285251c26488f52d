//! # Recoverable secp256k1 signatures
//!
//! All thor consensus artifacts (headers, summaries, endorsements,
//! transactions) are signed with 65-byte `r ‖ s ‖ v` signatures over a
//! 32-byte Keccak256 signing hash. Verification recovers the signer's
//! address from the signature, so public keys never travel with the
//! signed object.
//!
//! ## Example
//!
//! ```rust
//! use thor_crypto::ecdsa::PrivateKey;
//!
//! let sk = PrivateKey::random();
//! let hash = thor_crypto::keccak256(b"signing hash");
//!
//! let sig = sk.sign(&hash).unwrap();
//! let recovered = sig.recover(&hash).unwrap();
//! assert_eq!(recovered.to_address(), sk.public_key().to_address());
//! ```

use crate::{keccak256, CryptoError, Result};
use k256::{
    ecdsa::{RecoveryId, Signature as K256Signature, SigningKey, VerifyingKey},
    elliptic_curve::sec1::ToEncodedPoint,
    SecretKey,
};
use rand::rngs::OsRng;
use std::fmt;

/// Length of a recoverable signature in bytes (r ‖ s ‖ v)
pub const SIGNATURE_LENGTH: usize = 65;

/// A secp256k1 private key.
#[derive(Clone)]
pub struct PrivateKey {
    inner: SigningKey,
}

impl PrivateKey {
    /// Generates a random private key using the OS RNG.
    pub fn random() -> Self {
        let secret = SecretKey::random(&mut OsRng);
        Self {
            inner: SigningKey::from(secret),
        }
    }

    /// Creates a private key from raw bytes.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self> {
        let secret = SecretKey::from_bytes(bytes.into())
            .map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()))?;
        Ok(Self {
            inner: SigningKey::from(secret),
        })
    }

    /// Returns the raw secret bytes.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.inner.to_bytes().into()
    }

    /// Derives the corresponding public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            inner: *self.inner.verifying_key(),
        }
    }

    /// Signs a 32-byte hash, producing a recoverable signature.
    pub fn sign(&self, hash: &[u8; 32]) -> Result<Signature> {
        let (sig, recovery_id) = self
            .inner
            .sign_prehash_recoverable(hash)
            .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;

        let mut bytes = [0u8; SIGNATURE_LENGTH];
        bytes[..32].copy_from_slice(&sig.r().to_bytes());
        bytes[32..64].copy_from_slice(&sig.s().to_bytes());
        bytes[64] = recovery_id.to_byte();
        Ok(Signature(bytes))
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("address", &hex::encode(self.public_key().to_address()))
            .finish()
    }
}

/// A secp256k1 public key.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicKey {
    inner: VerifyingKey,
}

impl PublicKey {
    /// Derives the 20-byte address: the trailing 20 bytes of the
    /// Keccak256 digest of the uncompressed public key.
    pub fn to_address(&self) -> [u8; 20] {
        let encoded = self.inner.to_encoded_point(false);
        // skip the 0x04 prefix
        let digest = keccak256(&encoded.as_bytes()[1..]);
        let mut addr = [0u8; 20];
        addr.copy_from_slice(&digest[12..]);
        addr
    }

    /// Returns the compressed SEC1 encoding (33 bytes).
    pub fn to_compressed_bytes(&self) -> [u8; 33] {
        let encoded = self.inner.to_encoded_point(true);
        let mut out = [0u8; 33];
        out.copy_from_slice(encoded.as_bytes());
        out
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey(0x{})", hex::encode(self.to_compressed_bytes()))
    }
}

/// A 65-byte recoverable ECDSA signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature([u8; SIGNATURE_LENGTH]);

impl Signature {
    /// Creates a signature from a 65-byte array.
    pub const fn new(bytes: [u8; SIGNATURE_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Creates a signature from a slice.
    ///
    /// Returns an error if the slice is not exactly 65 bytes, which is
    /// how an unsigned artifact surfaces during verification.
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        if slice.len() != SIGNATURE_LENGTH {
            return Err(CryptoError::InvalidLength {
                expected: SIGNATURE_LENGTH,
                actual: slice.len(),
            });
        }
        let mut bytes = [0u8; SIGNATURE_LENGTH];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    /// Returns the raw signature bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Recovers the signer's public key from the signature over `hash`.
    pub fn recover(&self, hash: &[u8; 32]) -> Result<PublicKey> {
        let sig = K256Signature::from_slice(&self.0[..64])
            .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
        let recovery_id = RecoveryId::from_byte(self.0[64])
            .ok_or_else(|| CryptoError::InvalidSignature("invalid recovery id".to_string()))?;

        let verifying_key = VerifyingKey::recover_from_prehash(hash, &sig, recovery_id)
            .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
        Ok(PublicKey {
            inner: verifying_key,
        })
    }

    /// Recovers the signer's address from the signature over `hash`.
    pub fn recover_address(&self, hash: &[u8; 32]) -> Result<[u8; 20]> {
        Ok(self.recover(hash)?.to_address())
    }
}

impl Default for Signature {
    fn default() -> Self {
        Self([0u8; SIGNATURE_LENGTH])
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature(0x{})", hex::encode(self.0))
    }
}

impl AsRef<[u8]> for Signature {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl serde::Serialize for Signature {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&format!("0x{}", hex::encode(self.0)))
    }
}

impl<'de> serde::Deserialize<'de> for Signature {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error;
        let s = String::deserialize(deserializer)?;
        let s = s.strip_prefix("0x").unwrap_or(&s);
        let bytes = hex::decode(s).map_err(D::Error::custom)?;
        Self::from_slice(&bytes).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_recover() {
        let sk = PrivateKey::random();
        let hash = keccak256(b"some signing hash");

        let sig = sk.sign(&hash).unwrap();
        let addr = sig.recover_address(&hash).unwrap();
        assert_eq!(addr, sk.public_key().to_address());
    }

    #[test]
    fn test_recover_wrong_hash_gives_different_address() {
        let sk = PrivateKey::random();
        let sig = sk.sign(&keccak256(b"a")).unwrap();
        let addr = sig.recover_address(&keccak256(b"b")).unwrap();
        assert_ne!(addr, sk.public_key().to_address());
    }

    #[test]
    fn test_signature_length_enforced() {
        assert!(Signature::from_slice(&[0u8; 64]).is_err());
        assert!(Signature::from_slice(&[0u8; 65]).is_ok());
    }

    #[test]
    fn test_known_address_derivation() {
        // secp256k1 key with secret 0x01 maps to the well-known address
        // 0x7e5f4552091a69125d5dfcb7b8c2659029395bdf.
        let mut secret = [0u8; 32];
        secret[31] = 1;
        let sk = PrivateKey::from_bytes(&secret).unwrap();
        assert_eq!(
            hex::encode(sk.public_key().to_address()),
            "7e5f4552091a69125d5dfcb7b8c2659029395bdf"
        );
    }

    #[test]
    fn test_signature_serde_roundtrip() {
        let sk = PrivateKey::random();
        let sig = sk.sign(&keccak256(b"x")).unwrap();
        let json = serde_json::to_string(&sig).unwrap();
        let decoded: Signature = serde_json::from_str(&json).unwrap();
        assert_eq!(sig, decoded);
    }
}
