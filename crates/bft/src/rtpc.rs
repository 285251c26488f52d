//! The ready-to-pre-commit tracker.
//!
//! The tracker holds at most one candidate header for the next
//! finalization, plus the id of the last committed block. A candidate
//! is adopted when a fresh view carries a pre-prepare quorum for it
//! without conflicting pre-commits, and only if every newer view with
//! a new-view quorum on every known branch still carries at least one
//! pre-commit vote for it. `last_committed` only moves to descendants
//! of itself.

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use thor_types::chain::{is_ancestor, Repository};
use thor_types::{Bytes32, Header, Params};
use tracing::{debug, trace};

use crate::view::View;
use crate::BftError;

/// Capacity of the per-(branch head, view number) tally cache.
const VIEW_CACHE_CAPACITY: usize = 64;

/// Tracks the candidate for the next finalization.
pub struct Rtpc<R: Repository> {
    repo: Arc<R>,
    params: Params,
    curr: Option<Header>,
    last_committed: Bytes32,
    view_cache: Mutex<LruCache<(Bytes32, u32), Arc<View>>>,
}

impl<R: Repository> Rtpc<R> {
    /// Creates a tracker resuming from `last_committed` (zero for a
    /// fresh chain).
    pub fn new(repo: Arc<R>, last_committed: Bytes32, params: Params) -> Self {
        Self {
            repo,
            params,
            curr: None,
            last_committed,
            view_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(VIEW_CACHE_CAPACITY).expect("nonzero"),
            )),
        }
    }

    /// The current candidate, if any.
    pub fn get(&self) -> Option<&Header> {
        self.curr.as_ref()
    }

    /// The last committed block id.
    pub fn last_committed(&self) -> Bytes32 {
        self.last_committed
    }

    /// Advances `last_committed` to a descendant and drops the
    /// candidate if the commit overtakes it.
    pub fn update_last_committed(&mut self, id: Bytes32) -> Result<(), BftError> {
        if !self.last_committed.is_zero()
            && !is_ancestor(self.repo.as_ref(), id, self.last_committed)?
        {
            return Err(BftError::NotOffspring);
        }

        self.last_committed = id;
        debug!(id = %id, "finalized frontier advanced");

        if let Some(curr_ts) = self.curr.as_ref().map(|c| c.timestamp) {
            let committed = self.header_of(id)?;
            if curr_ts <= committed.timestamp {
                self.curr = None;
            }
        }

        Ok(())
    }

    /// Observes a newly accepted block and re-evaluates the candidate.
    pub fn update(&mut self, header: &Header) -> Result<(), BftError> {
        if header.nv.is_zero() {
            return Ok(());
        }

        // The view containing the new block.
        let branch = header.id();
        let Some(curr_view) = self.view_at(branch, header.nv.block_number())? else {
            return Ok(());
        };

        if !curr_view.has_qc_for_nv(self.quorum()) {
            return Ok(());
        }

        // Only strictly newer views may touch the candidate.
        let curr_view_ts = curr_view.first_block_timestamp();
        if let Some(curr) = &self.curr {
            if curr_view_ts <= curr.timestamp {
                return Ok(());
            }
        }

        // A fresh view without any pre-commit for the candidate
        // invalidates it.
        if let Some(curr_id) = self.curr.as_ref().map(|c| c.id()) {
            if curr_view.num_sig_on_pc(curr_id) == 0 {
                trace!(id = %curr_id, "rtpc candidate lost support");
                self.curr = None;
            }
        }
        if self.curr.is_some() {
            return Ok(());
        }

        let Some(candidate_id) = curr_view.has_qc_for_pp(self.quorum()) else {
            return Ok(());
        };
        if curr_view.has_conflict_pc() {
            return Ok(());
        }
        let candidate = self.header_of(candidate_id)?;

        // The candidate must be newer than what is already committed.
        if !self.last_committed.is_zero() {
            let committed = self.header_of(self.last_committed)?;
            if candidate.timestamp <= committed.timestamp {
                return Ok(());
            }
        }

        // Every view newer than this one, on every known branch, must
        // still carry a pre-commit vote for the candidate.
        let mut adopt = true;
        'branches: for branch_head in self
            .repo
            .branches_by_timestamp(curr_view_ts)
            .map_err(BftError::from)?
        {
            let mut number = branch_head.block_number();
            loop {
                let Some(head_header) = self
                    .repo
                    .branch_header_by_number(&branch_head, number)
                    .map_err(BftError::from)?
                else {
                    break;
                };
                if head_header.nv.is_zero() {
                    break;
                }
                number = head_header.nv.block_number();

                let Some(leader) = self
                    .repo
                    .branch_header_by_number(&branch_head, number)
                    .map_err(BftError::from)?
                else {
                    break;
                };
                if leader.timestamp <= curr_view_ts {
                    break;
                }

                if let Some(view) = self.view_at(branch_head, number)? {
                    if view.has_qc_for_nv(self.quorum())
                        && view.num_sig_on_pc(candidate_id) == 0
                    {
                        adopt = false;
                        break 'branches;
                    }
                }

                // move to the previous view
                if number == 0 {
                    break;
                }
                number -= 1;
            }
        }

        if adopt {
            debug!(id = %candidate_id, "rtpc candidate adopted");
            self.curr = Some(candidate);
        }

        Ok(())
    }

    fn quorum(&self) -> usize {
        self.params.bft_quorum() as usize
    }

    fn header_of(&self, id: Bytes32) -> Result<Header, BftError> {
        Ok(self
            .repo
            .get_block(&id)
            .map_err(BftError::from)?
            .ok_or(BftError::MissingBlock(id))?
            .header)
    }

    /// Memoized view construction keyed by `(branch head, leader
    /// number)`; tallies for a fixed key never change.
    fn view_at(&self, head: Bytes32, nv_number: u32) -> Result<Option<Arc<View>>, BftError> {
        if let Some(view) = self.view_cache.lock().get(&(head, nv_number)) {
            return Ok(Some(view.clone()));
        }
        let Some(view) = View::build(self.repo.as_ref(), head, nv_number)? else {
            return Ok(None);
        };
        let view = Arc::new(view);
        self.view_cache.lock().put((head, nv_number), view.clone());
        Ok(Some(view))
    }
}
