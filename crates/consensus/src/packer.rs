//! Block packing.
//!
//! Packing moves through three states, and the type system forbids
//! illegal transitions: a [`Flow`] adopts transactions, summarizing it
//! consumes it into a [`SummarizedFlow`] that can only collect
//! endorsements, and packing consumes that into the final block. A
//! summarized flow can no longer adopt transactions, and an open flow
//! cannot collect endorsements.

use crate::errors::ConsensusError;
use crate::state::{BlockContext, Executor, Stage, StateView, Stater};
use crate::Consensus;
use std::collections::HashMap;
use thor_crypto::PrivateKey;
use thor_types::chain::Repository;
use thor_types::params::{CLAUSE_GAS, TX_GAS};
use thor_types::{
    receipts_root, Address, Block, Bytes32, Endorsement, Features, Header, HeaderBuilder, Receipt,
    Summary, Transaction, TxSet,
};
use tracing::debug;

/// Errors raised while packing a block.
#[derive(Debug, thiserror::Error)]
pub enum PackError {
    /// The node master has no upcoming slot.
    #[error("not scheduled")]
    NotScheduled,

    /// The transaction is permanently unpackable.
    #[error("bad tx: {0}")]
    BadTx(String),

    /// The transaction may become adoptable later.
    #[error("tx not adoptable now")]
    TxNotAdoptableNow,

    /// The transaction depends on a reverted transaction.
    #[error("tx not adoptable forever")]
    TxNotAdoptableForever,

    /// No gas headroom left for any further transaction.
    #[error("gas limit reached")]
    GasLimitReached,

    /// The transaction is already on the chain or in this flow.
    #[error("known tx")]
    KnownTx,

    /// The signing key does not belong to the flow's node master.
    #[error("private key mismatch")]
    PrivateKeyMismatch,

    /// VIP-193 requires more endorsements before packing.
    #[error("not enough endorsements")]
    NotEnoughEndorsements,

    /// An engine-level failure.
    #[error(transparent)]
    Consensus(#[from] ConsensusError),
}

impl<R, T, E> Consensus<R, T, E>
where
    R: Repository,
    T: Stater,
    E: Executor<T::State>,
{
    /// Opens a packing flow on the best chain for `node_master`,
    /// targeting its earliest slot at or after `now`.
    pub fn new_flow(
        &self,
        node_master: Address,
        beneficiary: Address,
        now: u64,
    ) -> Result<PackFlow<'_, R, T, E>, PackError> {
        let head = self
            .repo()
            .best_chain_head()
            .map_err(|e| ConsensusError::internal("Schedule", e))?;
        let parent = self
            .repo()
            .get_block(&head)
            .map_err(|e| ConsensusError::internal("Schedule", e))?
            .ok_or_else(|| ConsensusError::internal("Schedule", "best head missing"))?
            .header;

        let mut state = self
            .stater()
            .state_at(parent.state_root)
            .map_err(|e| ConsensusError::internal("Schedule", e))?;

        let number = parent.number() + 1;
        let vip191 = Self::effective_fork(self.fork_config().vip191);
        if number == vip191 {
            state
                .set_code(
                    crate::builtin::extension_address(),
                    crate::builtin::extension_v2_bytecode(),
                )
                .map_err(|e| ConsensusError::internal("Schedule", e))?;
        }

        let candidates = self.authority_candidates(&state, Some(parent.state_root))?;
        let scheduler = self.scheduler_at(&candidates, &parent)?;
        let when = scheduler
            .schedule(node_master, now)
            .ok_or(PackError::NotScheduled)?;
        let total_score = scheduler.expected_total_score(when);

        // The registry migration validates against the header being
        // built; candidates above were read before any VIP-193
        // mutation.
        let vip193 = Self::effective_fork(self.fork_config().vip193);
        if number == vip193 {
            state
                .set_code(
                    crate::builtin::authority_address(),
                    crate::builtin::authority_v2_bytecode(),
                )
                .map_err(|e| ConsensusError::internal("Schedule", e))?;
            let template = HeaderBuilder::new()
                .parent_id(parent.id())
                .timestamp(when)
                .build();
            self.update_consensus_nodes_for_vip193(&mut state, &template)?;
        }

        debug!(
            node = %node_master,
            when,
            number,
            total_score,
            "packing flow scheduled"
        );

        let gas_limit = parent.gas_limit;
        Ok(PackFlow {
            engine: self,
            parent,
            state,
            context: BlockContext {
                beneficiary,
                signer: node_master,
                number,
                timestamp: when,
                gas_limit,
                total_score,
            },
            features: self.required_features(number),
            gas_used: 0,
            processed: HashMap::new(),
            txs: Vec::new(),
            receipts: Vec::new(),
        })
    }
}

/// An open packing flow: adopting transactions.
pub struct PackFlow<'a, R, T, E>
where
    R: Repository,
    T: Stater,
    E: Executor<T::State>,
{
    engine: &'a Consensus<R, T, E>,
    parent: Header,
    state: T::State,
    context: BlockContext,
    features: Features,
    gas_used: u64,
    processed: HashMap<Bytes32, bool>,
    txs: Vec<Transaction>,
    receipts: Vec<Receipt>,
}

impl<'a, R, T, E> PackFlow<'a, R, T, E>
where
    R: Repository,
    T: Stater,
    E: Executor<T::State>,
{
    /// The slot timestamp this flow packs for.
    pub fn when(&self) -> u64 {
        self.context.timestamp
    }

    /// The total score of the block being packed.
    pub fn total_score(&self) -> u64 {
        self.context.total_score
    }

    /// The parent header.
    pub fn parent(&self) -> &Header {
        &self.parent
    }

    /// Tries to execute `tx` and adopt it into the block.
    ///
    /// On success the tx is included regardless of whether its clauses
    /// reverted; on failure the state is rolled back and the error
    /// says whether the tx may be retried.
    pub fn adopt(&mut self, tx: &Transaction) -> Result<(), PackError> {
        let origin = tx
            .origin()
            .map_err(|e| PackError::BadTx(e.to_string()))?;

        let blocklist_active = self.context.number
            >= Consensus::<R, T, E>::effective_fork(self.engine.fork_config().blocklist);
        if blocklist_active && self.engine.blocklist().contains(&origin) {
            return Err(PackError::BadTx("tx origin blocked".to_string()));
        }

        if !self.features.contains(tx.features) {
            return Err(PackError::BadTx("unsupported features".to_string()));
        }

        if tx.chain_tag != self.engine.repo().chain_tag() {
            return Err(PackError::BadTx("chain tag mismatch".to_string()));
        }
        if self.context.number < tx.block_ref.number() {
            return Err(PackError::TxNotAdoptableNow);
        }
        if tx.is_expired(self.context.number) {
            return Err(PackError::BadTx("expired".to_string()));
        }

        if self.gas_used + tx.gas > self.context.gas_limit {
            // enough headroom left to adopt a minimum tx?
            if self.gas_used + TX_GAS + CLAUSE_GAS <= self.context.gas_limit {
                return Err(PackError::TxNotAdoptableNow);
            }
            return Err(PackError::GasLimitReached);
        }

        let id = tx.id().map_err(|e| PackError::BadTx(e.to_string()))?;
        let (found, _) = self.find_tx(id)?;
        if found {
            return Err(PackError::KnownTx);
        }

        if let Some(dep) = tx.depends_on {
            let (found, reverted_dep) = self.find_tx(dep)?;
            if !found {
                return Err(PackError::TxNotAdoptableNow);
            }
            if reverted_dep {
                return Err(PackError::TxNotAdoptableForever);
            }
        }

        let checkpoint = self.state.checkpoint();
        match self
            .engine
            .executor()
            .execute(&mut self.state, tx, &self.context)
        {
            Ok(receipt) => {
                self.processed.insert(id, receipt.reverted);
                self.gas_used += receipt.gas_used;
                self.receipts.push(receipt);
                self.txs.push(tx.clone());
                Ok(())
            }
            Err(err) => {
                self.state.revert_to(checkpoint);
                Err(PackError::BadTx(err.to_string()))
            }
        }
    }

    fn find_tx(&self, id: Bytes32) -> Result<(bool, bool), PackError> {
        if let Some(reverted) = self.processed.get(&id) {
            return Ok((true, *reverted));
        }
        match self
            .engine
            .repo()
            .branch_tx_meta(&self.parent.id(), &id)
            .map_err(|e| ConsensusError::internal("Adopt", e))?
        {
            Some(meta) => Ok((true, meta.reverted)),
            None => Ok((false, false)),
        }
    }

    /// Signs the tx set and block summary, consuming the flow. No
    /// further transactions can be adopted afterwards.
    pub fn summarize(self, sk: &PrivateKey) -> Result<SummarizedFlow<'a, R, T, E>, PackError> {
        if Address::new(sk.public_key().to_address()) != self.context.signer {
            return Err(PackError::PrivateKeyMismatch);
        }

        let tx_set = TxSet::new(self.txs.clone()).sign(sk);
        let summary = Summary::new(
            self.parent.id(),
            tx_set.root(),
            self.context.timestamp,
            self.context.total_score,
        )
        .sign(sk);

        Ok(SummarizedFlow {
            flow: self,
            tx_set,
            summary,
            endorsements: Vec::new(),
            bft_votes: (Bytes32::ZERO, Bytes32::ZERO, Bytes32::ZERO),
        })
    }
}

/// A summarized flow: collecting endorsements.
pub struct SummarizedFlow<'a, R, T, E>
where
    R: Repository,
    T: Stater,
    E: Executor<T::State>,
{
    flow: PackFlow<'a, R, T, E>,
    tx_set: TxSet,
    summary: Summary,
    endorsements: Vec<Endorsement>,
    bft_votes: (Bytes32, Bytes32, Bytes32),
}

impl<'a, R, T, E> SummarizedFlow<'a, R, T, E>
where
    R: Repository,
    T: Stater,
    E: Executor<T::State>,
{
    /// The signed summary to broadcast to potential endorsers.
    pub fn summary(&self) -> &Summary {
        &self.summary
    }

    /// The signed tx set.
    pub fn tx_set(&self) -> &TxSet {
        &self.tx_set
    }

    /// Stores an endorsement after validating it against this flow's
    /// summary. Returns whether it was accepted; duplicates from the
    /// same endorser are dropped.
    pub fn add_endorsement(&mut self, endorsement: &Endorsement) -> bool {
        if endorsement.summary.signing_hash() != self.summary.signing_hash() {
            return false;
        }
        let Ok(endorser) = endorsement.signer() else {
            return false;
        };
        if self
            .endorsements
            .iter()
            .any(|e| e.signer().is_ok_and(|a| a == endorser))
        {
            return false;
        }
        if self
            .engine()
            .validate_endorsement(endorsement, &self.flow.parent, self.flow.when())
            .is_err()
        {
            return false;
        }
        self.endorsements.push(endorsement.clone());
        true
    }

    /// How many distinct endorsements are stored.
    pub fn num_endorsements(&self) -> usize {
        self.endorsements.len()
    }

    /// Sets the BFT vote pointers of the header being packed.
    pub fn set_bft_votes(&mut self, nv: Bytes32, pp: Bytes32, pc: Bytes32) {
        self.bft_votes = (nv, pp, pc);
    }

    fn engine(&self) -> &'a Consensus<R, T, E> {
        self.flow.engine
    }

    /// Builds and signs the block, consuming the flow.
    pub fn pack(
        mut self,
        sk: &PrivateKey,
    ) -> Result<(Block, Box<dyn Stage>, Vec<Receipt>), PackError> {
        if Address::new(sk.public_key().to_address()) != self.flow.context.signer {
            return Err(PackError::PrivateKeyMismatch);
        }

        let vip193 =
            Consensus::<R, T, E>::effective_fork(self.engine().fork_config().vip193);
        if self.flow.context.number >= vip193
            && (self.endorsements.len() as u64) < self.engine().params().committee_size
        {
            return Err(PackError::NotEnoughEndorsements);
        }

        let stage = self
            .flow
            .state
            .stage()
            .map_err(|e| ConsensusError::internal("Pack", e))?;

        let mut sigs = Vec::with_capacity(self.endorsements.len());
        let mut proofs = Vec::with_capacity(self.endorsements.len());
        for endorsement in &self.endorsements {
            sigs.push(endorsement.signature.clone());
            proofs.push(endorsement.vrf_proof);
        }

        let header = HeaderBuilder::new()
            .parent_id(self.flow.parent.id())
            .timestamp(self.flow.context.timestamp)
            .gas_limit(self.flow.context.gas_limit)
            .beneficiary(self.flow.context.beneficiary)
            .gas_used(self.flow.gas_used)
            .total_score(self.flow.context.total_score)
            .txs_root(self.tx_set.root())
            .tx_features(self.flow.features)
            .state_root(stage.hash())
            .receipts_root(receipts_root(&self.flow.receipts))
            .sig_on_summary(self.summary.signature.clone())
            .sigs_on_endorsement(sigs)
            .vrf_proofs(proofs)
            .bft_votes(self.bft_votes.0, self.bft_votes.1, self.bft_votes.2)
            .build()
            .sign(sk);

        let block = Block::compose(header, std::mem::take(&mut self.flow.txs));
        Ok((block, stage, std::mem::take(&mut self.flow.receipts)))
    }
}
