//! The finality engine.
//!
//! Observes blocks in acceptance order and exposes the finality
//! frontier. Durability is not a concern here: on restart the caller
//! reconstructs the tracker by replaying the chain from the last
//! committed block.

use std::sync::Arc;
use thor_types::chain::Repository;
use thor_types::{Block, Bytes32, Header, Params};
use tracing::info;

use crate::rtpc::Rtpc;
use crate::BftError;

/// The BFT finality overlay.
pub struct BftEngine<R: Repository> {
    rtpc: Rtpc<R>,
}

impl<R: Repository> BftEngine<R> {
    /// Creates an engine resuming from `last_committed` (zero for a
    /// fresh chain).
    pub fn new(repo: Arc<R>, last_committed: Bytes32, params: Params) -> Self {
        Self {
            rtpc: Rtpc::new(repo, last_committed, params),
        }
    }

    /// Feeds a newly accepted block to the tracker.
    pub fn on_accepted(&mut self, block: &Block) -> Result<(), BftError> {
        self.rtpc.update(block.header())
    }

    /// Promotes `id` to the committed frontier. The caller invokes
    /// this when the next view shows a pre-commit quorum for the
    /// tracker's candidate.
    pub fn update_last_committed(&mut self, id: Bytes32) -> Result<(), BftError> {
        self.rtpc.update_last_committed(id)?;
        info!(id = %id, "block committed");
        Ok(())
    }

    /// The last committed block id.
    pub fn last_committed(&self) -> Bytes32 {
        self.rtpc.last_committed()
    }

    /// The current ready-to-pre-commit candidate, if any.
    pub fn rtpc(&self) -> Option<&Header> {
        self.rtpc.get()
    }
}
