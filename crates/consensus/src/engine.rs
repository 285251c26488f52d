//! The consensus engine.
//!
//! [`Consensus`] decides whether a candidate block is legal under the
//! current protocol and which authority was scheduled to propose it.
//! It owns no storage: blocks come from a [`Repository`], state from a
//! [`Stater`], and execution from an [`Executor`]. The blocklist and
//! protocol parameters are injected at construction.

use crate::builtin;
use crate::committee::{
    self, beacon_block_number, beacon_from_header, epoch_number, round_number,
};
use crate::errors::{ConsensusError, ErrorTag, FlowError, ProcessError};
use crate::runtime::Runtime;
use crate::state::{BlockContext, Executor, Stage, StateView, Stater};
use lru::LruCache;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use thor_crypto::VrfProof;
use thor_types::chain::Repository;
use thor_types::networks::{legacy_vrf_public_key, load_correct_receipts_roots};
use thor_types::{
    Block, Blocklist, Bytes32, Candidate, EmptyBlocklist, ForkConfig, Header, Params, Receipt,
};
use tracing::{debug, trace};

/// Capacity of the authority-snapshot and beacon caches.
const CACHE_CAPACITY: usize = 16;

/// The block verification and finality-support engine.
pub struct Consensus<R, T, E>
where
    R: Repository,
    T: Stater,
    E: Executor<T::State>,
{
    repo: Arc<R>,
    stater: T,
    executor: E,
    blocklist: Box<dyn Blocklist>,
    fork_config: ForkConfig,
    params: Params,
    correct_receipts_roots: HashMap<String, Bytes32>,
    candidates_cache: Mutex<LruCache<Bytes32, Arc<Vec<Candidate>>>>,
    beacon_cache: Mutex<LruCache<u32, Bytes32>>,
    genesis: Header,
}

impl<R, T, E> Consensus<R, T, E>
where
    R: Repository,
    T: Stater,
    E: Executor<T::State>,
{
    /// Creates an engine over the given collaborators with default
    /// parameters and an empty blocklist.
    pub fn new(repo: Arc<R>, stater: T, executor: E, fork_config: ForkConfig) -> Self {
        let genesis = repo.genesis();
        Self {
            repo,
            stater,
            executor,
            blocklist: Box::new(EmptyBlocklist),
            fork_config,
            params: Params::default(),
            correct_receipts_roots: load_correct_receipts_roots(),
            candidates_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(CACHE_CAPACITY).expect("nonzero"),
            )),
            beacon_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(CACHE_CAPACITY).expect("nonzero"),
            )),
            genesis,
        }
    }

    /// Replaces the protocol parameters. Reserved for tests and
    /// private deployments.
    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    /// Replaces the blocklist.
    pub fn with_blocklist(mut self, blocklist: Box<dyn Blocklist>) -> Self {
        self.blocklist = blocklist;
        self
    }

    /// Replaces the receipts-root exemption table.
    pub fn with_correct_receipts_roots(mut self, roots: HashMap<String, Bytes32>) -> Self {
        self.correct_receipts_roots = roots;
        self
    }

    /// The protocol parameters in use.
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// The fork configuration in use.
    pub fn fork_config(&self) -> &ForkConfig {
        &self.fork_config
    }

    /// The repository handle.
    pub fn repo(&self) -> &Arc<R> {
        &self.repo
    }

    pub(crate) fn genesis_header(&self) -> &Header {
        &self.genesis
    }

    pub(crate) fn executor(&self) -> &E {
        &self.executor
    }

    pub(crate) fn blocklist(&self) -> &dyn Blocklist {
        self.blocklist.as_ref()
    }

    /// The state opener.
    pub fn stater(&self) -> &T {
        &self.stater
    }

    pub(crate) fn exempt_receipts_root(&self, block_id: Bytes32) -> Option<Bytes32> {
        self.correct_receipts_roots.get(&block_id.to_hex()).copied()
    }

    /// A fork height of zero behaves as height one: genesis itself can
    /// never re-run a fork upgrade.
    pub(crate) fn effective_fork(height: u32) -> u32 {
        if height == 0 {
            1
        } else {
            height
        }
    }

    /// Processes a candidate block against the chain it claims to
    /// extend, returning the pending state writes and the receipts.
    ///
    /// Consensus errors are fatal for the block; flow errors ask the
    /// caller to retry later.
    pub fn process(
        &self,
        block: &Block,
        now: u64,
    ) -> Result<(Box<dyn Stage>, Vec<Receipt>), ProcessError> {
        let header = block.header();

        if self
            .repo
            .get_block(&header.id())
            .map_err(|e| ConsensusError::internal("Process", e))?
            .is_some()
        {
            return Err(FlowError::KnownBlock.into());
        }

        let parent = self
            .repo
            .get_block(&header.parent_id)
            .map_err(|e| ConsensusError::internal("Process", e))?
            .ok_or(FlowError::ParentMissing)?;

        let mut state = self
            .stater
            .state_at(parent.header.state_root)
            .map_err(|e| ConsensusError::internal("Process", e))?;

        let vip191 = Self::effective_fork(self.fork_config.vip191);
        if header.number() == vip191 {
            state
                .set_code(builtin::extension_address(), builtin::extension_v2_bytecode())
                .map_err(|e| ConsensusError::internal("Process", e))?;
        }

        let vip193 = Self::effective_fork(self.fork_config.vip193);
        if header.number() == vip193 {
            state
                .set_code(builtin::authority_address(), builtin::authority_v2_bytecode())
                .map_err(|e| ConsensusError::internal("Process", e))?;
            self.update_consensus_nodes_for_vip193(&mut state, header)
                .map_err(|e| e.add_stage("Process"))?;
        }

        let (stage, receipts) = self.validate(&mut state, block, &parent.header, now)?;

        debug!(
            number = header.number(),
            id = %header.id(),
            txs = block.transactions().len(),
            "block processed"
        );

        Ok((stage, receipts))
    }

    /// Rebuilds an execution context from a stored header, for
    /// replay-style reads against its parent state.
    pub fn new_runtime_for_replay(
        &self,
        header: &Header,
        skip_poa: bool,
    ) -> Result<Runtime<T::State>, ProcessError> {
        let signer = header.signer().map_err(|_| {
            ConsensusError::new("NewRuntimeForReplay", ErrorTag::SignerUnavailable)
                .with_cause("invalid signature length")
        })?;

        let parent = self
            .repo
            .get_block(&header.parent_id)
            .map_err(|e| ConsensusError::internal("NewRuntimeForReplay", e))?
            .ok_or(FlowError::ParentMissing)?;

        let mut state = self
            .stater
            .state_at(parent.header.state_root)
            .map_err(|e| ConsensusError::internal("NewRuntimeForReplay", e))?;

        if !skip_poa {
            self.validate_proposer(&mut state, header, &parent.header)?;
        }

        Ok(Runtime::new(
            state,
            BlockContext {
                beneficiary: header.beneficiary,
                signer,
                number: header.number(),
                timestamp: header.timestamp,
                gas_limit: header.gas_limit,
                total_score: header.total_score,
            },
            self.fork_config,
        ))
    }

    /// Evaluates the VRF lottery for the round at `t`, relative to the
    /// best chain. Returns the proof only on election.
    pub fn is_committee(
        &self,
        sk: &thor_crypto::VrfSecretKey,
        t: u64,
    ) -> Result<(bool, Option<VrfProof>), ConsensusError> {
        let head = self
            .repo
            .best_chain_head()
            .map_err(|e| ConsensusError::internal("IsCommittee", e))?;
        let seed = self.seed_for_timestamp(t, head)?;
        Ok(committee::is_committee_by_private_key(sk, seed, &self.params))
    }

    /// The committee seed for the round at `t`, following the branch
    /// ending at `head` for the beacon lookup.
    pub(crate) fn seed_for_timestamp(
        &self,
        t: u64,
        head: Bytes32,
    ) -> Result<Bytes32, ConsensusError> {
        let genesis_ts = self.genesis.timestamp;
        let epoch = epoch_number(t, genesis_ts, &self.params);
        let beacon = self.beacon(epoch, head)?;
        let round = round_number(t, genesis_ts, &self.params);
        Ok(committee::seed(beacon, round))
    }

    /// The beacon of `epoch`, cached.
    pub(crate) fn beacon(&self, epoch: u32, head: Bytes32) -> Result<Bytes32, ConsensusError> {
        if let Some(beacon) = self.beacon_cache.lock().get(&epoch) {
            return Ok(*beacon);
        }
        let number = beacon_block_number(epoch, &self.params);
        let header = self
            .repo
            .branch_header_by_number(&head, number)
            .map_err(|e| ConsensusError::internal("beacon", e))?
            .ok_or_else(|| {
                ConsensusError::internal("beacon", "beacon block not found").with("num", number)
            })?;
        let beacon = beacon_from_header(&header);
        trace!(epoch, number, beacon = %beacon, "beacon derived");
        self.beacon_cache.lock().put(epoch, beacon);
        Ok(beacon)
    }

    /// The authority registry as seen by `state`. Snapshots are cached
    /// by state root; `cache_key` is `None` when `state` carries
    /// in-flight fork mutations that must not be cached.
    pub(crate) fn authority_candidates(
        &self,
        state: &T::State,
        cache_key: Option<Bytes32>,
    ) -> Result<Arc<Vec<Candidate>>, ConsensusError> {
        if let Some(key) = cache_key {
            if let Some(snapshot) = self.candidates_cache.lock().get(&key) {
                return Ok(snapshot.clone());
            }
        }
        let snapshot = Arc::new(
            state
                .candidates()
                .map_err(|e| ConsensusError::internal("authority", e))?,
        );
        if let Some(key) = cache_key {
            self.candidates_cache.lock().put(key, snapshot.clone());
        }
        Ok(snapshot)
    }

    /// Signers of up to `window` blocks ending at `parent`, newest
    /// first.
    pub(crate) fn recent_signers(
        &self,
        parent: &Header,
        window: usize,
    ) -> Result<Vec<thor_types::Address>, ConsensusError> {
        let mut signers = Vec::with_capacity(window);
        let mut cursor = parent.clone();
        while signers.len() < window {
            if let Ok(signer) = cursor.signer() {
                signers.push(signer);
            }
            if cursor.number() == 0 {
                break;
            }
            cursor = self
                .repo
                .get_block(&cursor.parent_id)
                .map_err(|e| ConsensusError::internal("recentSigners", e))?
                .ok_or_else(|| {
                    ConsensusError::internal("recentSigners", "ancestor missing")
                        .with("id", cursor.parent_id)
                })?
                .header;
        }
        Ok(signers)
    }

    /// Backfills VRF public keys into the authority registry at the
    /// VIP-193 activation block.
    ///
    /// Candidates already carrying a key keep it; the rest are looked
    /// up in the compiled-in legacy table, and a miss is fatal. The
    /// first candidate's active flag is re-applied after the loop:
    /// when it was added to the rebuilt registry it was unlinked, so
    /// its in-loop status update did not take.
    pub fn update_consensus_nodes_for_vip193(
        &self,
        state: &mut T::State,
        header: &Header,
    ) -> Result<(), ConsensusError> {
        let vip193 = Self::effective_fork(self.fork_config.vip193);
        if vip193 != header.number() {
            return Err(ConsensusError::internal(
                "UpdateNode",
                "block number inconsistent with vip193",
            )
            .with("expected", vip193)
            .with("curr", header.number()));
        }

        let candidates = state
            .candidates()
            .map_err(|e| ConsensusError::internal("UpdateNode", e))?;
        if candidates.is_empty() {
            return Ok(());
        }

        for (i, candidate) in candidates.iter().enumerate() {
            let vrfpk = if candidate.vrf_public_key.is_zero() {
                legacy_vrf_public_key(candidate.node_master).ok_or_else(|| {
                    ConsensusError::new("UpdateNode", ErrorTag::MissingVrfPubKey)
                        .with("node", candidate.node_master)
                })?
            } else {
                candidate.vrf_public_key
            };

            let ok = state
                .add_candidate(candidate.clone().with_vrf_public_key(vrfpk))
                .map_err(|e| ConsensusError::internal("UpdateNode", e))?;
            if !ok {
                return Err(ConsensusError::internal("UpdateNode", "failed to add node")
                    .with("node", candidate.node_master));
            }

            if !candidate.active {
                let ok = state
                    .set_candidate_active(candidate.node_master, false)
                    .map_err(|e| ConsensusError::internal("UpdateNode", e))?;
                if !ok && i > 0 {
                    return Err(ConsensusError::internal(
                        "UpdateNode",
                        "failed to update node status",
                    )
                    .with("node", candidate.node_master));
                }
            }
        }

        if !candidates[0].active {
            let ok = state
                .set_candidate_active(candidates[0].node_master, false)
                .map_err(|e| ConsensusError::internal("UpdateNode", e))?;
            if !ok {
                return Err(ConsensusError::internal(
                    "UpdateNode",
                    "failed to update node status",
                )
                .with("node", candidates[0].node_master));
            }
        }

        Ok(())
    }
}
