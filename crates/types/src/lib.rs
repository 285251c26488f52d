//! # thor-types
//!
//! Core type definitions for the thor consensus engine:
//!
//! - [`Bytes32`] and [`Address`] - fixed-size consensus values
//! - [`Header`], [`Block`], [`Transaction`], [`Receipt`] - chain data
//! - [`Summary`], [`Endorsement`], [`TxSet`] - VIP-193 packing artifacts
//! - [`ForkConfig`], [`Params`] - protocol configuration
//! - [`chain::Repository`] - read access to the block store
//!
//! ## Example
//!
//! ```rust
//! use thor_types::{Address, Bytes32};
//!
//! let addr: Address = "0x2a02604a8b7aaa84991c21d7de1c3238046c5275".parse().unwrap();
//! let digest = Bytes32::keccak256(addr.as_bytes());
//! assert!(!digest.is_zero());
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod address;
pub mod authority;
pub mod block;
pub mod blocklist;
pub mod bytes32;
pub mod chain;
pub mod endorsement;
pub mod fork_config;
pub mod header;
pub mod merkle;
pub mod networks;
pub mod params;
pub mod receipt;
pub mod summary;
pub mod transaction;
pub mod txset;

pub use address::Address;
pub use authority::Candidate;
pub use block::{txs_root, Block};
pub use blocklist::{Blocklist, EmptyBlocklist, MemBlocklist};
pub use bytes32::Bytes32;
pub use endorsement::Endorsement;
pub use fork_config::{ForkConfig, NEVER, NO_FORK};
pub use header::{Header, HeaderBuilder};
pub use params::Params;
pub use receipt::{receipts_root, Receipt};
pub use summary::Summary;
pub use transaction::{BlockRef, Clause, Features, Transaction, TransactionBuilder};
pub use txset::TxSet;

/// Result type alias for type-level operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when working with thor types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid hex string
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// Invalid length for a fixed-size type
    #[error("invalid length: expected {expected}, got {actual}")]
    InvalidLength {
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Invalid address format
    #[error("invalid address format: {0}")]
    InvalidAddress(String),

    /// Invalid hash format
    #[error("invalid hash format: {0}")]
    InvalidHash(String),

    /// Signature error
    #[error("signature error: {0}")]
    Signature(String),

    /// RLP decoding error
    #[error("RLP decode error: {0}")]
    RlpDecode(#[from] rlp::DecoderError),
}
