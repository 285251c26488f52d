//! The multi-stage block verification pipeline.
//!
//! Stages run in a fixed order, and each later stage assumes the
//! earlier ones passed: header shape, proposer legitimacy, transaction
//! set rules, committee endorsements (once VIP-193 is active), and
//! finally re-execution against the parent state. The first failing
//! check decides the error; ordering is part of the protocol.

use crate::committee::{self, CommitteeFault};
use crate::errors::{ConsensusError, ErrorTag, FlowError, ProcessError};
use crate::schedule::Scheduler;
use crate::state::{BlockContext, Executor, Stage, StateView, Stater};
use std::collections::HashSet;
use std::sync::Arc;
use thor_crypto::{Signature, VrfPublicKey};
use thor_types::chain::Repository;
use thor_types::endorsement::endorsement_signing_hash;
use thor_types::params::is_valid_gas_limit;
use thor_types::{
    receipts_root, txs_root, Block, Bytes32, Candidate, Endorsement, Features, Header, Receipt,
    Summary,
};
use tracing::warn;

impl<R, T, E> crate::Consensus<R, T, E>
where
    R: Repository,
    T: Stater,
    E: Executor<T::State>,
{
    /// Runs the full pipeline over `block`, returning the pending
    /// state writes and the receipts.
    pub(crate) fn validate(
        &self,
        state: &mut T::State,
        block: &Block,
        parent: &Header,
        now: u64,
    ) -> Result<(Box<dyn Stage>, Vec<Receipt>), ProcessError> {
        let header = block.header();

        self.validate_block_header(header, parent, now)?;
        self.validate_proposer(state, header, parent)?;
        self.validate_block_body(block, parent)?;

        if header.number() >= Self::effective_fork(self.fork_config().vip193) {
            self.validate_summary_endorsements(state, header, parent)?;
        }

        self.verify_block(state, block)
    }

    /// Structural and temporal header checks against the parent.
    pub(crate) fn validate_block_header(
        &self,
        header: &Header,
        parent: &Header,
        now: u64,
    ) -> Result<(), ProcessError> {
        const STAGE: &str = "validateBlockHeader";
        let genesis_ts = self.genesis_header().timestamp;

        if header.timestamp <= parent.timestamp {
            return Err(ConsensusError::new(STAGE, ErrorTag::TimestampBehindParent)
                .with("parent", parent.timestamp)
                .with("curr", header.timestamp)
                .into());
        }

        if (header.timestamp - genesis_ts) % self.params().block_interval != 0 {
            return Err(ConsensusError::new(STAGE, ErrorTag::IntervalNotRounded)
                .with("parent", parent.timestamp)
                .with("curr", header.timestamp)
                .into());
        }

        if header.timestamp > now + self.params().block_tolerance() {
            return Err(FlowError::FutureBlock.into());
        }

        if !is_valid_gas_limit(header.gas_limit, parent.gas_limit, self.params().min_gas_limit) {
            return Err(ConsensusError::new(STAGE, ErrorTag::GasLimitInvalid)
                .with("parent", parent.gas_limit)
                .with("curr", header.gas_limit)
                .into());
        }

        if header.gas_used > header.gas_limit {
            return Err(ConsensusError::new(STAGE, ErrorTag::GasExceeded)
                .with("limit", header.gas_limit)
                .with("used", header.gas_used)
                .into());
        }

        if header.total_score <= parent.total_score {
            return Err(ConsensusError::new(STAGE, ErrorTag::TotalScoreInvalid)
                .with("parent", parent.total_score)
                .with("curr", header.total_score)
                .into());
        }

        let required = self.required_features(header.number());
        if header.tx_features != required {
            return Err(ConsensusError::new(STAGE, ErrorTag::TxFeaturesMismatch)
                .with("expected", required.0)
                .with("curr", header.tx_features.0)
                .into());
        }

        Ok(())
    }

    /// Feature bits every transaction must carry at `number`.
    pub(crate) fn required_features(&self, number: u32) -> Features {
        let mut features = Features::default();
        if number >= Self::effective_fork(self.fork_config().vip191) {
            features.insert(Features::DELEGATION);
        }
        features
    }

    /// Checks that the header signer is the authority scheduled for
    /// its slot and that the claimed total score follows.
    pub(crate) fn validate_proposer(
        &self,
        state: &mut T::State,
        header: &Header,
        parent: &Header,
    ) -> Result<(), ProcessError> {
        const STAGE: &str = "validateProposer";

        let signer = header.signer().map_err(|_| {
            ConsensusError::new(STAGE, ErrorTag::SignerUnavailable)
                .with_cause("invalid signature length")
        })?;

        let candidates = self.candidates_for(state, header, parent)?;
        let authorized = candidates
            .iter()
            .any(|c| c.node_master == signer && c.active);
        if !authorized {
            return Err(ConsensusError::new(STAGE, ErrorTag::UnauthorizedProposer)
                .with("addr", signer)
                .into());
        }

        let scheduler = self.scheduler_at(&candidates, parent)?;
        if !scheduler.is_scheduled(header.timestamp, signer) {
            return Err(ConsensusError::new(STAGE, ErrorTag::UnauthorizedProposer)
                .with("t", header.timestamp)
                .with("addr", signer)
                .into());
        }

        let expected = scheduler.expected_total_score(header.timestamp);
        if header.total_score != expected {
            return Err(ConsensusError::new(STAGE, ErrorTag::TotalScoreInvalid)
                .with("want", expected)
                .with("have", header.total_score)
                .into());
        }

        Ok(())
    }

    /// Block-level transaction set rules that need no execution.
    pub(crate) fn validate_block_body(
        &self,
        block: &Block,
        parent: &Header,
    ) -> Result<(), ProcessError> {
        const STAGE: &str = "validateBlockBody";
        let header = block.header();

        let root = txs_root(block.transactions());
        if root != header.txs_root {
            return Err(ConsensusError::new(STAGE, ErrorTag::TxsRootMismatch)
                .with("want", header.txs_root)
                .with("have", root)
                .into());
        }

        let blocklist_active =
            header.number() >= Self::effective_fork(self.fork_config().blocklist);
        let mut seen: HashSet<Bytes32> = HashSet::new();

        for tx in block.transactions() {
            let origin = tx.origin().map_err(|_| {
                ConsensusError::new(STAGE, ErrorTag::TxSignerUnavailable)
                    .with_cause("invalid signature length")
            })?;

            if tx.chain_tag != self.repo().chain_tag() {
                return Err(ConsensusError::new(STAGE, ErrorTag::TxChainTagMismatch)
                    .with("want", self.repo().chain_tag() as u32)
                    .with("have", tx.chain_tag as u32)
                    .into());
            }

            if tx.block_ref.number() > header.number() {
                return Err(ConsensusError::new(STAGE, ErrorTag::TxRefFutureBlock)
                    .with("ref", tx.block_ref.number())
                    .with("current", header.number())
                    .into());
            }

            if tx.is_expired(header.number()) {
                return Err(ConsensusError::new(STAGE, ErrorTag::TxExpired)
                    .with("ref", tx.block_ref.number())
                    .with("expiration", tx.expiration)
                    .with("current", header.number())
                    .into());
            }

            if blocklist_active && self.blocklist().contains(&origin) {
                return Err(ConsensusError::new(STAGE, ErrorTag::TxOriginBlocked)
                    .with("origin", origin)
                    .into());
            }

            let id = tx
                .id()
                .map_err(|e| ConsensusError::internal(STAGE, e))?;
            if !seen.insert(id) {
                return Err(ConsensusError::new(STAGE, ErrorTag::TxAlreadyExists).into());
            }
            if self
                .repo()
                .branch_tx_meta(&parent.id(), &id)
                .map_err(|e| ConsensusError::internal(STAGE, e))?
                .is_some()
            {
                return Err(ConsensusError::new(STAGE, ErrorTag::TxAlreadyExists).into());
            }

            if let Some(dep) = tx.depends_on {
                // earlier in this block, or an unreverted ancestor
                let in_block = seen.contains(&dep);
                let on_chain = self
                    .repo()
                    .branch_tx_meta(&parent.id(), &dep)
                    .map_err(|e| ConsensusError::internal(STAGE, e))?
                    .is_some_and(|meta| !meta.reverted);
                if !in_block && !on_chain {
                    return Err(ConsensusError::new(STAGE, ErrorTag::TxDepBroken).into());
                }
            }
        }

        Ok(())
    }

    /// Validates the VIP-193 summary signature, the endorser set and
    /// their aggregated VRF proofs.
    pub(crate) fn validate_summary_endorsements(
        &self,
        state: &mut T::State,
        header: &Header,
        parent: &Header,
    ) -> Result<(), ProcessError> {
        const STAGE: &str = "validateEndorsements";

        if header.sigs_on_endorsement.len() != header.vrf_proofs.len() {
            return Err(ConsensusError::new(STAGE, ErrorTag::EndorsementCountMismatch)
                .with("sigs", header.sigs_on_endorsement.len() as u64)
                .with("proofs", header.vrf_proofs.len() as u64)
                .into());
        }

        let summary = Summary::new(
            header.parent_id,
            header.txs_root,
            header.timestamp,
            header.total_score,
        );
        let summary_hash = summary.signing_hash();

        let proposer = header.signer().map_err(|_| {
            ConsensusError::new(STAGE, ErrorTag::SignerUnavailable)
                .with_cause("invalid signature length")
        })?;
        let summary_signer = Signature::from_slice(&header.sig_on_summary)
            .and_then(|sig| sig.recover_address(summary_hash.as_fixed_bytes()))
            .map_err(|_| {
                ConsensusError::new(STAGE, ErrorTag::InvalidSummarySigner).with("addr", proposer)
            })?;
        if thor_types::Address::new(summary_signer) != proposer {
            return Err(ConsensusError::new(STAGE, ErrorTag::InvalidSummarySigner)
                .with("expected", proposer)
                .with("curr", thor_types::Address::new(summary_signer))
                .into());
        }

        let seed = self.seed_for_timestamp(header.timestamp, parent.id())?;
        let candidates = self.candidates_for(state, header, parent)?;
        let mut endorsers: HashSet<thor_types::Address> = HashSet::new();

        for (sig_bytes, proof) in header
            .sigs_on_endorsement
            .iter()
            .zip(header.vrf_proofs.iter())
        {
            let hash = endorsement_signing_hash(summary_hash, proof);
            let endorser = Signature::from_slice(sig_bytes)
                .and_then(|sig| sig.recover_address(hash.as_fixed_bytes()))
                .map_err(|_| {
                    ConsensusError::new(STAGE, ErrorTag::SignerUnavailable)
                        .with_cause("invalid endorsement signature")
                })?;
            let endorser = thor_types::Address::new(endorser);

            let candidate = candidates
                .iter()
                .find(|c| c.node_master == endorser && c.active && !c.vrf_public_key.is_zero())
                .ok_or_else(|| {
                    ConsensusError::new(STAGE, ErrorTag::NotAuthority).with("addr", endorser)
                })?;

            let pk = VrfPublicKey::from_bytes(candidate.vrf_public_key.as_fixed_bytes())
                .ok_or_else(|| {
                    ConsensusError::new(STAGE, ErrorTag::InvalidVrfProof)
                        .with_cause("invalid registered vrf public key")
                        .with("addr", endorser)
                })?;

            match committee::verify_committee(&pk, seed, proof, self.params()) {
                Ok(()) => {}
                Err(CommitteeFault::InvalidProof) => {
                    return Err(ConsensusError::new(STAGE, ErrorTag::InvalidVrfProof)
                        .with("addr", endorser)
                        .into());
                }
                Err(CommitteeFault::NotCommittee) => {
                    return Err(ConsensusError::new(STAGE, ErrorTag::NotCommittee)
                        .with("addr", endorser)
                        .into());
                }
            }

            if !endorsers.insert(endorser) {
                return Err(ConsensusError::new(STAGE, ErrorTag::DuplicateEndorser)
                    .with("addr", endorser)
                    .into());
            }
        }

        if (endorsers.len() as u64) < self.params().committee_size {
            return Err(ConsensusError::new(STAGE, ErrorTag::InsufficientEndorsements)
                .with("expected", self.params().committee_size)
                .with("curr", endorsers.len() as u64)
                .into());
        }

        Ok(())
    }

    /// Re-executes the block against the parent state and checks gas,
    /// receipts root (with the historic exemption table) and state
    /// root.
    pub(crate) fn verify_block(
        &self,
        state: &mut T::State,
        block: &Block,
    ) -> Result<(Box<dyn Stage>, Vec<Receipt>), ProcessError> {
        const STAGE: &str = "verifyBlock";
        let header = block.header();

        let signer = header.signer().map_err(|_| {
            ConsensusError::new(STAGE, ErrorTag::SignerUnavailable)
                .with_cause("invalid signature length")
        })?;
        let ctx = BlockContext {
            beneficiary: header.beneficiary,
            signer,
            number: header.number(),
            timestamp: header.timestamp,
            gas_limit: header.gas_limit,
            total_score: header.total_score,
        };

        let mut receipts: Vec<Receipt> = Vec::with_capacity(block.transactions().len());
        let mut gas_used: u64 = 0;

        for tx in block.transactions() {
            let id = tx
                .id()
                .map_err(|e| ConsensusError::internal(STAGE, e))?;

            let checkpoint = state.checkpoint();
            match self.executor().execute(state, tx, &ctx) {
                Ok(receipt) => {
                    gas_used += receipt.gas_used;
                    receipts.push(receipt);
                }
                Err(err) => {
                    state.revert_to(checkpoint);
                    warn!(tx = %id, error = %err, "transaction execution rejected block");
                    return Err(ConsensusError::new(STAGE, ErrorTag::TxExecutionFailed)
                        .with_cause(err)
                        .into());
                }
            }
        }

        if gas_used != header.gas_used {
            return Err(ConsensusError::new(STAGE, ErrorTag::GasUsedMismatch)
                .with("want", header.gas_used)
                .with("have", gas_used)
                .into());
        }

        let computed = receipts_root(&receipts);
        if computed != header.receipts_root
            && self.exempt_receipts_root(header.id()) != Some(header.receipts_root)
        {
            return Err(ConsensusError::new(STAGE, ErrorTag::ReceiptsRootMismatch)
                .with("want", header.receipts_root)
                .with("have", computed)
                .into());
        }

        let stage = state
            .stage()
            .map_err(|e| ConsensusError::internal(STAGE, e))?;
        if stage.hash() != header.state_root {
            return Err(ConsensusError::new(STAGE, ErrorTag::StateRootMismatch)
                .with("want", header.state_root)
                .with("have", stage.hash())
                .into());
        }

        Ok((stage, receipts))
    }

    /// Validates a broadcast block summary against its claimed parent.
    pub fn validate_block_summary(
        &self,
        summary: &Summary,
        parent: &Header,
        now: u64,
    ) -> Result<(), ProcessError> {
        const STAGE: &str = "ValidateBlockSummary";

        if summary.parent_id != parent.id() {
            return Err(ConsensusError::new(STAGE, ErrorTag::SummaryParentMismatch)
                .with("expected", parent.id())
                .with("curr", summary.parent_id)
                .into());
        }

        let genesis_ts = self.genesis_header().timestamp;
        if summary.timestamp <= parent.timestamp
            || (summary.timestamp - genesis_ts) % self.params().block_interval != 0
        {
            return Err(ConsensusError::new(STAGE, ErrorTag::SummaryTimestampInvalid)
                .with("parent", parent.timestamp)
                .with("curr", summary.timestamp)
                .into());
        }
        if summary.timestamp > now + self.params().block_tolerance() {
            return Err(FlowError::FutureBlock.into());
        }

        let signer = summary.signer().map_err(|_| {
            ConsensusError::new(STAGE, ErrorTag::SignerUnavailable)
                .with_cause("invalid signature length")
        })?;

        let state = self
            .stater()
            .state_at(parent.state_root)
            .map_err(|e| ConsensusError::internal(STAGE, e))?;
        let candidates = self.authority_candidates(&state, Some(parent.state_root))?;

        let authorized = candidates
            .iter()
            .any(|c| c.node_master == signer && c.active);
        if !authorized {
            return Err(ConsensusError::new(STAGE, ErrorTag::UnauthorizedProposer)
                .with("addr", signer)
                .into());
        }
        let scheduler = self.scheduler_at(&candidates, parent)?;
        if !scheduler.is_scheduled(summary.timestamp, signer) {
            return Err(ConsensusError::new(STAGE, ErrorTag::UnauthorizedProposer)
                .with("t", summary.timestamp)
                .with("addr", signer)
                .into());
        }

        Ok(())
    }

    /// Validates a broadcast endorsement: its summary, the endorser's
    /// authority membership, and the VRF proof.
    pub fn validate_endorsement(
        &self,
        endorsement: &Endorsement,
        parent: &Header,
        now: u64,
    ) -> Result<(), ProcessError> {
        const STAGE: &str = "ValidateEndorsement";

        self.validate_block_summary(&endorsement.summary, parent, now)?;

        let endorser = endorsement.signer().map_err(|_| {
            ConsensusError::new(STAGE, ErrorTag::SignerUnavailable)
                .with_cause("invalid signature length")
        })?;

        let state = self
            .stater()
            .state_at(parent.state_root)
            .map_err(|e| ConsensusError::internal(STAGE, e))?;
        let candidates = self.authority_candidates(&state, Some(parent.state_root))?;

        let candidate = candidates
            .iter()
            .find(|c| c.node_master == endorser && c.active && !c.vrf_public_key.is_zero())
            .ok_or_else(|| {
                ConsensusError::new(STAGE, ErrorTag::NotAuthority).with("addr", endorser)
            })?;

        let pk = VrfPublicKey::from_bytes(candidate.vrf_public_key.as_fixed_bytes())
            .ok_or_else(|| {
                ConsensusError::new(STAGE, ErrorTag::InvalidVrfProof)
                    .with_cause("invalid registered vrf public key")
                    .with("addr", endorser)
            })?;

        let seed = self.seed_for_timestamp(endorsement.summary.timestamp, parent.id())?;
        match committee::verify_committee(&pk, seed, &endorsement.vrf_proof, self.params()) {
            Ok(()) => Ok(()),
            Err(CommitteeFault::InvalidProof) => {
                Err(ConsensusError::new(STAGE, ErrorTag::InvalidVrfProof)
                    .with("addr", endorser)
                    .into())
            }
            Err(CommitteeFault::NotCommittee) => {
                Err(ConsensusError::new(STAGE, ErrorTag::NotCommittee)
                    .with("addr", endorser)
                    .into())
            }
        }
    }

    /// The authority snapshot used for validating `header`. Snapshots
    /// are cached by the parent state root, except at the VIP-193
    /// activation block where the view carries in-flight registry
    /// mutations.
    fn candidates_for(
        &self,
        state: &T::State,
        header: &Header,
        parent: &Header,
    ) -> Result<Arc<Vec<Candidate>>, ConsensusError> {
        let at_vip193 = header.number() == Self::effective_fork(self.fork_config().vip193);
        let cache_key = (!at_vip193).then_some(parent.state_root);
        self.authority_candidates(state, cache_key)
    }

    /// Builds the slot scheduler for children of `parent`.
    pub(crate) fn scheduler_at(
        &self,
        candidates: &[Candidate],
        parent: &Header,
    ) -> Result<Scheduler, ConsensusError> {
        let actives = candidates.iter().filter(|c| c.active).count();
        let window =
            (self.params().max_block_proposers as usize - 1).min(actives.saturating_sub(1));
        let recent = self.recent_signers(parent, window)?;
        Ok(Scheduler::new(
            candidates,
            parent,
            &recent,
            self.genesis_header().timestamp,
            *self.params(),
        ))
    }
}
