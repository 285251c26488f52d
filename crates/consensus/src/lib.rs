//! # thor-consensus
//!
//! The block verification core of the thor consensus engine:
//!
//! - [`Consensus`] - the engine: [`Consensus::process`] runs a
//!   candidate block through header, proposer, body, endorsement and
//!   state-apply verification and returns the pending state writes
//!   plus receipts.
//! - [`schedule`] - the deterministic slot-to-proposer mapping over
//!   the active authority set.
//! - [`committee`] - VRF committee election and the epoch beacon.
//! - [`packer`] - the type-state packing flow producing blocks the
//!   pipeline accepts.
//!
//! The engine is storage-agnostic: blocks come from a
//! [`thor_types::chain::Repository`], state from a [`state::Stater`],
//! and execution from a [`state::Executor`].

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod builtin;
pub mod committee;
pub mod engine;
pub mod errors;
pub mod packer;
pub mod runtime;
pub mod schedule;
pub mod state;
mod validate;

pub use committee::{
    committee_threshold, epoch_number, is_committee_by_private_key, is_committee_by_proof,
    round_number, seed, verify_committee, CommitteeFault,
};
pub use engine::Consensus;
pub use errors::{ConsensusError, ErrorTag, FlowError, ProcessError, TraceValue};
pub use packer::{PackError, PackFlow, SummarizedFlow};
pub use runtime::Runtime;
pub use schedule::Scheduler;
pub use state::{BlockContext, ExecutionError, Executor, Stage, StateError, StateView, Stater};
