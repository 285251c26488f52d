//! Chain repository access.
//!
//! The consensus core never owns block storage; it reads through the
//! [`Repository`] trait. A branch is identified by its head block id,
//! and all ancestry queries are answered relative to a branch so forks
//! stay disambiguated.

use crate::{Bytes32, Header};
use serde::{Deserialize, Serialize};

/// Result type for repository operations.
pub type RepoResult<T> = std::result::Result<T, RepoError>;

/// Storage-level failure surfaced by a repository.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    /// The backing store failed.
    #[error("repository storage failure: {0}")]
    Storage(String),
}

/// A stored block: its header plus the ids of its transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredBlock {
    /// The block header.
    pub header: Header,
    /// Ids of the block's transactions, in order, with their reverted
    /// flags from execution.
    pub txs: Vec<TxMeta>,
}

/// Location and outcome of a stored transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxMeta {
    /// The transaction id.
    pub tx_id: Bytes32,
    /// Whether execution reverted.
    pub reverted: bool,
}

/// Read access to the block store.
pub trait Repository: Send + Sync {
    /// The chain tag: the last byte of the genesis id.
    fn chain_tag(&self) -> u8;

    /// The genesis header.
    fn genesis(&self) -> Header;

    /// Looks up a stored block by id.
    fn get_block(&self, id: &Bytes32) -> RepoResult<Option<StoredBlock>>;

    /// The header at `number` on the branch ending at `head`.
    fn branch_header_by_number(&self, head: &Bytes32, number: u32) -> RepoResult<Option<Header>>;

    /// Finds a transaction on the branch ending at `head`.
    fn branch_tx_meta(&self, head: &Bytes32, tx_id: &Bytes32) -> RepoResult<Option<TxMeta>>;

    /// Heads of all branches whose head timestamp is greater than `ts`.
    fn branches_by_timestamp(&self, ts: u64) -> RepoResult<Vec<Bytes32>>;

    /// Head of the best branch (highest total score).
    fn best_chain_head(&self) -> RepoResult<Bytes32>;
}

/// Whether `descendant` has `ancestor` on its branch.
///
/// Relies on the block-number prefix of ids: the candidate ancestor is
/// fetched by number on the descendant's branch and compared by id.
pub fn is_ancestor<R: Repository + ?Sized>(
    repo: &R,
    descendant: Bytes32,
    ancestor: Bytes32,
) -> RepoResult<bool> {
    if descendant.block_number() <= ancestor.block_number() {
        return Ok(false);
    }
    match repo.branch_header_by_number(&descendant, ancestor.block_number())? {
        Some(header) => Ok(header.id() == ancestor),
        None => Ok(false),
    }
}

#[cfg(feature = "test-utils")]
pub use mem::MemRepository;

#[cfg(feature = "test-utils")]
mod mem {
    use super::*;
    use parking_lot::RwLock;
    use std::collections::HashMap;

    /// An in-memory repository for tests.
    #[derive(Debug)]
    pub struct MemRepository {
        genesis: Header,
        inner: RwLock<Inner>,
    }

    #[derive(Debug, Default)]
    struct Inner {
        blocks: HashMap<Bytes32, StoredBlock>,
        // ids that are some block's parent; complement = branch heads
        parents: HashMap<Bytes32, Vec<Bytes32>>,
    }

    impl MemRepository {
        /// Creates a repository holding only `genesis`.
        pub fn new(genesis: Header) -> Self {
            let repo = Self {
                genesis: genesis.clone(),
                inner: RwLock::new(Inner::default()),
            };
            repo.inner.write().blocks.insert(
                genesis.id(),
                StoredBlock {
                    header: genesis,
                    txs: Vec::new(),
                },
            );
            repo
        }

        /// Stores a block. The parent must already be present.
        pub fn add_block(&self, header: Header, txs: Vec<TxMeta>) {
            let mut inner = self.inner.write();
            let id = header.id();
            let parent = header.parent_id;
            assert!(
                inner.blocks.contains_key(&parent),
                "parent must be stored first"
            );
            inner.blocks.insert(id, StoredBlock { header, txs });
            inner.parents.entry(parent).or_default().push(id);
        }
    }

    impl Repository for MemRepository {
        fn chain_tag(&self) -> u8 {
            self.genesis.id().as_bytes()[31]
        }

        fn genesis(&self) -> Header {
            self.genesis.clone()
        }

        fn get_block(&self, id: &Bytes32) -> RepoResult<Option<StoredBlock>> {
            Ok(self.inner.read().blocks.get(id).cloned())
        }

        fn branch_header_by_number(
            &self,
            head: &Bytes32,
            number: u32,
        ) -> RepoResult<Option<Header>> {
            let inner = self.inner.read();
            let mut cursor = *head;
            loop {
                let Some(stored) = inner.blocks.get(&cursor) else {
                    return Ok(None);
                };
                let cursor_number = stored.header.number();
                if cursor_number == number {
                    return Ok(Some(stored.header.clone()));
                }
                if cursor_number < number {
                    return Ok(None);
                }
                cursor = stored.header.parent_id;
            }
        }

        fn branch_tx_meta(&self, head: &Bytes32, tx_id: &Bytes32) -> RepoResult<Option<TxMeta>> {
            let inner = self.inner.read();
            let mut cursor = *head;
            while let Some(stored) = inner.blocks.get(&cursor) {
                if let Some(meta) = stored.txs.iter().find(|meta| meta.tx_id == *tx_id) {
                    return Ok(Some(*meta));
                }
                if stored.header.number() == 0 {
                    break;
                }
                cursor = stored.header.parent_id;
            }
            Ok(None)
        }

        fn branches_by_timestamp(&self, ts: u64) -> RepoResult<Vec<Bytes32>> {
            let inner = self.inner.read();
            let mut heads: Vec<Bytes32> = inner
                .blocks
                .iter()
                .filter(|(id, stored)| {
                    !inner.parents.contains_key(*id) && stored.header.timestamp > ts
                })
                .map(|(id, _)| *id)
                .collect();
            heads.sort();
            Ok(heads)
        }

        fn best_chain_head(&self) -> RepoResult<Bytes32> {
            let inner = self.inner.read();
            let best = inner
                .blocks
                .iter()
                .filter(|(id, _)| !inner.parents.contains_key(*id))
                .max_by_key(|(id, stored)| (stored.header.total_score, **id))
                .map(|(id, _)| *id)
                .unwrap_or_else(|| self.genesis.id());
            Ok(best)
        }
    }
}
