//! BFT views and their vote tallies.
//!
//! Headers double as BFT messages. A header's `nv` pointer names the
//! block that leads its view, so the view over a branch for leader
//! number `n` is the run of blocks starting at height `n` whose `nv`
//! pointer keeps naming that height. Within a view each distinct
//! header signer counts once toward the new-view tally, and the
//! header's `pp`/`pc` pointers cast its pre-prepare and pre-commit
//! votes.

use std::collections::{HashMap, HashSet};
use thor_types::chain::Repository;
use thor_types::{Address, Bytes32};

use crate::BftError;

/// Vote tallies of one view on one branch.
#[derive(Debug, Clone)]
pub struct View {
    first_block_id: Bytes32,
    first_block_timestamp: u64,
    nv_signers: HashSet<Address>,
    pp_votes: HashMap<Bytes32, HashSet<Address>>,
    pc_votes: HashMap<Bytes32, HashSet<Address>>,
}

impl View {
    /// Builds the view led by block number `nv_number` on the branch
    /// ending at `head`. Returns `None` when the branch has no block
    /// at that height.
    pub fn build<R: Repository + ?Sized>(
        repo: &R,
        head: Bytes32,
        nv_number: u32,
    ) -> Result<Option<View>, BftError> {
        let Some(first) = repo
            .branch_header_by_number(&head, nv_number)
            .map_err(BftError::from)?
        else {
            return Ok(None);
        };

        let mut view = View {
            first_block_id: first.id(),
            first_block_timestamp: first.timestamp,
            nv_signers: HashSet::new(),
            pp_votes: HashMap::new(),
            pc_votes: HashMap::new(),
        };

        let head_number = head.block_number();
        let mut number = nv_number;
        while number <= head_number {
            let Some(header) = repo
                .branch_header_by_number(&head, number)
                .map_err(BftError::from)?
            else {
                break;
            };
            if header.nv.block_number() != nv_number {
                break;
            }

            if let Ok(signer) = header.signer() {
                view.nv_signers.insert(signer);
                if !header.pp.is_zero() {
                    view.pp_votes.entry(header.pp).or_default().insert(signer);
                }
                if !header.pc.is_zero() {
                    view.pc_votes.entry(header.pc).or_default().insert(signer);
                }
            }

            number += 1;
        }

        Ok(Some(view))
    }

    /// Id of the block leading this view.
    pub fn first_block_id(&self) -> Bytes32 {
        self.first_block_id
    }

    /// Timestamp of the block leading this view.
    pub fn first_block_timestamp(&self) -> u64 {
        self.first_block_timestamp
    }

    /// Whether the view holds a quorum of distinct new-view voters.
    pub fn has_qc_for_nv(&self, quorum: usize) -> bool {
        self.nv_signers.len() >= quorum
    }

    /// The block id holding a quorum of pre-prepare votes, if any.
    pub fn has_qc_for_pp(&self, quorum: usize) -> Option<Bytes32> {
        self.pp_votes
            .iter()
            .find(|(_, voters)| voters.len() >= quorum)
            .map(|(id, _)| *id)
    }

    /// Number of distinct voters pre-committing `id`.
    pub fn num_sig_on_pc(&self, id: Bytes32) -> usize {
        self.pc_votes.get(&id).map(|voters| voters.len()).unwrap_or(0)
    }

    /// Whether two distinct blocks each received a pre-commit vote.
    pub fn has_conflict_pc(&self) -> bool {
        self.pc_votes.len() > 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view_with(pc_targets: &[(Bytes32, &[u8])]) -> View {
        let mut pc_votes: HashMap<Bytes32, HashSet<Address>> = HashMap::new();
        for (id, voters) in pc_targets {
            for v in voters.iter() {
                pc_votes
                    .entry(*id)
                    .or_default()
                    .insert(Address::new([*v; 20]));
            }
        }
        View {
            first_block_id: Bytes32::ZERO,
            first_block_timestamp: 0,
            nv_signers: HashSet::new(),
            pp_votes: HashMap::new(),
            pc_votes,
        }
    }

    #[test]
    fn test_pc_tallies() {
        let a = Bytes32::keccak256(b"a");
        let b = Bytes32::keccak256(b"b");
        let view = view_with(&[(a, &[1, 2]), (b, &[3])]);

        assert_eq!(view.num_sig_on_pc(a), 2);
        assert_eq!(view.num_sig_on_pc(b), 1);
        assert_eq!(view.num_sig_on_pc(Bytes32::ZERO), 0);
        assert!(view.has_conflict_pc());

        let single = view_with(&[(a, &[1, 2])]);
        assert!(!single.has_conflict_pc());
    }
}
