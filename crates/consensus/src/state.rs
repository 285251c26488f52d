//! State access contracts.
//!
//! The engine never touches the state tree directly; it drives these
//! traits. A [`Stater`] opens a [`StateView`] rooted at a state root,
//! the view supports checkpoint/revert around transaction execution,
//! and [`StateView::stage`] freezes the pending writes into a
//! [`Stage`] whose hash must match the header's state root. Committing
//! the stage is the caller's decision.

use thor_types::{Address, Bytes32, Candidate, Receipt, Transaction};

/// Result type for state operations.
pub type StateResult<T> = std::result::Result<T, StateError>;

/// Failure of the backing state tree.
#[derive(Debug, thiserror::Error)]
#[error("state failure: {0}")]
pub struct StateError(pub String);

/// Execution failure of a single transaction.
#[derive(Debug, thiserror::Error)]
#[error("execution failure: {0}")]
pub struct ExecutionError(pub String);

/// A frozen set of pending state writes.
pub trait Stage: Send {
    /// The root hash the writes would produce.
    fn hash(&self) -> Bytes32;

    /// Persists the writes, returning the new root.
    fn commit(self: Box<Self>) -> StateResult<Bytes32>;
}

/// A mutable view over state at some root.
pub trait StateView: Send {
    /// Marks a revert point.
    fn checkpoint(&mut self) -> u64;

    /// Drops every change made after `checkpoint`.
    fn revert_to(&mut self, checkpoint: u64);

    /// Replaces the code of `addr`. Used for builtin-contract upgrades
    /// at fork heights.
    fn set_code(&mut self, addr: Address, code: Vec<u8>) -> StateResult<()>;

    /// The authority registry in insertion order.
    fn candidates(&self) -> StateResult<Vec<Candidate>>;

    /// Re-registers a candidate carrying its VRF public key. Returns
    /// `false` when the registry refuses the entry.
    fn add_candidate(&mut self, candidate: Candidate) -> StateResult<bool>;

    /// Updates a candidate's active flag. Returns `false` when the
    /// entry cannot be updated.
    fn set_candidate_active(&mut self, node_master: Address, active: bool) -> StateResult<bool>;

    /// Freezes the pending writes.
    fn stage(&mut self) -> StateResult<Box<dyn Stage>>;
}

/// Opens state views by root.
pub trait Stater: Send + Sync {
    /// The view type produced.
    type State: StateView;

    /// Opens a view rooted at `root`.
    fn state_at(&self, root: Bytes32) -> StateResult<Self::State>;
}

/// Executes transactions against a state view.
pub trait Executor<S: StateView>: Send + Sync {
    /// Executes `tx` in the context of the block being built or
    /// verified. A returned error rejects the whole block; a reverted
    /// receipt does not.
    fn execute(
        &self,
        state: &mut S,
        tx: &Transaction,
        ctx: &BlockContext,
    ) -> std::result::Result<Receipt, ExecutionError>;
}

/// Execution context of the enclosing block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockContext {
    /// Reward receiver.
    pub beneficiary: Address,
    /// Block proposer.
    pub signer: Address,
    /// Block number.
    pub number: u32,
    /// Slot timestamp.
    pub timestamp: u64,
    /// Block gas limit.
    pub gas_limit: u64,
    /// Total score of the block.
    pub total_score: u64,
}

#[cfg(feature = "test-utils")]
pub use mem::{MemStater, MemStateView, NopExecutor};

#[cfg(feature = "test-utils")]
mod mem {
    use super::*;
    use parking_lot::RwLock;
    use std::collections::{BTreeMap, HashMap};
    use std::sync::Arc;
    use thor_types::receipt::Receipt;

    type Snapshot = (BTreeMap<Address, Vec<u8>>, Vec<Candidate>);

    /// In-memory state content addressed by root.
    #[derive(Debug, Default)]
    struct Store {
        roots: HashMap<Bytes32, Snapshot>,
    }

    /// An in-memory [`Stater`] for tests. Roots map to full snapshots;
    /// committing a stage registers the new root.
    #[derive(Debug, Clone, Default)]
    pub struct MemStater {
        store: Arc<RwLock<Store>>,
    }

    impl MemStater {
        /// Creates an empty stater.
        pub fn new() -> Self {
            Self::default()
        }

        /// Builds genesis state from `candidates` and returns its root.
        pub fn build_genesis(&self, candidates: Vec<Candidate>) -> Bytes32 {
            let snapshot = (BTreeMap::new(), candidates);
            let root = hash_snapshot(&snapshot);
            self.store.write().roots.insert(root, snapshot);
            root
        }
    }

    impl Stater for MemStater {
        type State = MemStateView;

        fn state_at(&self, root: Bytes32) -> StateResult<Self::State> {
            let store = self.store.read();
            let snapshot = store
                .roots
                .get(&root)
                .ok_or_else(|| StateError(format!("unknown state root {}", root)))?;
            Ok(MemStateView {
                store: self.store.clone(),
                code: snapshot.0.clone(),
                candidates: snapshot.1.clone(),
                journal: Vec::new(),
            })
        }
    }

    /// The view type of [`MemStater`].
    #[derive(Debug)]
    pub struct MemStateView {
        store: Arc<RwLock<Store>>,
        code: BTreeMap<Address, Vec<u8>>,
        candidates: Vec<Candidate>,
        journal: Vec<Snapshot>,
    }

    impl StateView for MemStateView {
        fn checkpoint(&mut self) -> u64 {
            self.journal.push((self.code.clone(), self.candidates.clone()));
            self.journal.len() as u64 - 1
        }

        fn revert_to(&mut self, checkpoint: u64) {
            let snapshot = self.journal[checkpoint as usize].clone();
            self.journal.truncate(checkpoint as usize);
            self.code = snapshot.0;
            self.candidates = snapshot.1;
        }

        fn set_code(&mut self, addr: Address, code: Vec<u8>) -> StateResult<()> {
            self.code.insert(addr, code);
            Ok(())
        }

        fn candidates(&self) -> StateResult<Vec<Candidate>> {
            Ok(self.candidates.clone())
        }

        fn add_candidate(&mut self, candidate: Candidate) -> StateResult<bool> {
            match self
                .candidates
                .iter_mut()
                .find(|c| c.node_master == candidate.node_master)
            {
                Some(existing) => *existing = candidate,
                None => self.candidates.push(candidate),
            }
            Ok(true)
        }

        fn set_candidate_active(&mut self, node_master: Address, active: bool) -> StateResult<bool> {
            // Mirrors the registry's linked-list behavior: a registry
            // holding a single entry cannot update it (the head node
            // is unlinked until a second entry arrives).
            if self.candidates.len() == 1 {
                return Ok(false);
            }
            match self
                .candidates
                .iter_mut()
                .find(|c| c.node_master == node_master)
            {
                Some(candidate) => {
                    candidate.active = active;
                    Ok(true)
                }
                None => Ok(false),
            }
        }

        fn stage(&mut self) -> StateResult<Box<dyn Stage>> {
            let snapshot = (self.code.clone(), self.candidates.clone());
            Ok(Box::new(MemStage {
                store: self.store.clone(),
                root: hash_snapshot(&snapshot),
                snapshot,
            }))
        }
    }

    struct MemStage {
        store: Arc<RwLock<Store>>,
        root: Bytes32,
        snapshot: Snapshot,
    }

    impl Stage for MemStage {
        fn hash(&self) -> Bytes32 {
            self.root
        }

        fn commit(self: Box<Self>) -> StateResult<Bytes32> {
            self.store.write().roots.insert(self.root, self.snapshot);
            Ok(self.root)
        }
    }

    fn hash_snapshot(snapshot: &Snapshot) -> Bytes32 {
        let mut parts: Vec<Vec<u8>> = Vec::new();
        for (addr, code) in &snapshot.0 {
            let mut entry = addr.as_bytes().to_vec();
            entry.extend_from_slice(code);
            parts.push(entry);
        }
        for candidate in &snapshot.1 {
            let mut entry = candidate.node_master.as_bytes().to_vec();
            entry.extend_from_slice(candidate.endorsor.as_bytes());
            entry.extend_from_slice(candidate.identity.as_bytes());
            entry.extend_from_slice(candidate.vrf_public_key.as_bytes());
            entry.push(candidate.active as u8);
            parts.push(entry);
        }
        let refs: Vec<&[u8]> = parts.iter().map(|p| p.as_slice()).collect();
        Bytes32::keccak256_concat(&refs)
    }

    /// An executor that charges intrinsic gas and touches nothing.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct NopExecutor;

    impl Executor<MemStateView> for NopExecutor {
        fn execute(
            &self,
            _state: &mut MemStateView,
            tx: &Transaction,
            _ctx: &BlockContext,
        ) -> std::result::Result<Receipt, ExecutionError> {
            let origin = tx
                .origin()
                .map_err(|e| ExecutionError(e.to_string()))?;
            Ok(Receipt {
                gas_used: tx.intrinsic_gas(),
                gas_payer: origin,
                reverted: false,
                outputs_hash: Bytes32::ZERO,
            })
        }
    }
}
