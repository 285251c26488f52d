//! # thor-crypto
//!
//! Cryptographic primitives for the thor consensus engine:
//!
//! - [`ecdsa`] - secp256k1 signatures with public-key recovery. Block
//!   headers, block summaries, endorsements and transactions are all
//!   signed with 65-byte recoverable signatures, and verification works
//!   by recovering the signer address rather than carrying public keys
//!   on the wire.
//! - [`vrf`] - the verifiable random function used for committee
//!   election. Every authority registers a 32-byte VRF public key; a
//!   96-byte proof over the round seed doubles as the committee lottery
//!   ticket.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod ecdsa;
pub mod vrf;

pub use ecdsa::{PrivateKey, PublicKey, Signature};
pub use vrf::{VrfProof, VrfPublicKey, VrfSecretKey};

/// Result type alias for crypto operations
pub type Result<T> = std::result::Result<T, CryptoError>;

/// Errors that can occur in cryptographic operations
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Invalid private key bytes
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    /// Invalid public key bytes
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Invalid or unrecoverable signature
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// Invalid length for a fixed-size input
    #[error("invalid length: expected {expected}, got {actual}")]
    InvalidLength {
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Invalid hex string
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

/// Computes the Keccak256 digest of `data` as a raw 32-byte array.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    use sha3::{Digest, Keccak256};
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}
