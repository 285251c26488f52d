//! # thor-bft
//!
//! The BFT finality overlay of the thor consensus engine. Headers
//! double as consensus messages: each carries a new-view pointer and
//! optional pre-prepare / pre-commit vote targets, and a [`View`]
//! tallies them per branch. The [`BftEngine`] drives the
//! ready-to-pre-commit tracker over accepted blocks, and its
//! `last_committed` pointer only ever moves to descendants.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod engine;
pub mod rtpc;
pub mod view;

pub use engine::BftEngine;
pub use rtpc::Rtpc;
pub use view::View;

use thor_types::chain::RepoError;
use thor_types::Bytes32;

/// Errors raised by the finality overlay.
#[derive(Debug, thiserror::Error)]
pub enum BftError {
    /// `update_last_committed` was called with a block that does not
    /// descend from the committed frontier.
    #[error("input block must be an offspring of the last committed")]
    NotOffspring,

    /// A block referenced by the overlay is not stored.
    #[error("block {0} not found")]
    MissingBlock(Bytes32),

    /// The repository failed.
    #[error(transparent)]
    Repo(#[from] RepoError),
}
