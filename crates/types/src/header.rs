//! Block headers.
//!
//! A header's number is derived from its parent id rather than stored:
//! block ids carry their number in the first four bytes, so
//! `number = parent_id.number + 1`. The genesis parent id uses the
//! `0xffffffff` number prefix, which wraps to zero.
//!
//! Signing covers every field except the proposer signature itself,
//! including the VIP-193 endorsement material and the BFT vote
//! pointers, so endorsements are collected before the proposer signs.

use crate::transaction::Features;
use crate::{Address, Bytes32, Error, Result};
use rlp::RlpStream;
use serde::{Deserialize, Serialize};
use thor_crypto::{Signature, VrfProof};

/// A block header.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Header {
    /// Id of the parent block.
    pub parent_id: Bytes32,
    /// Unix timestamp in seconds; always a multiple of the block
    /// interval past genesis.
    pub timestamp: u64,
    /// Block gas limit.
    pub gas_limit: u64,
    /// Receiver of block rewards.
    pub beneficiary: Address,
    /// Total gas consumed by the block's transactions.
    pub gas_used: u64,
    /// Cumulative liveness score of the chain up to this block.
    pub total_score: u64,
    /// Merkle root of the transactions.
    pub txs_root: Bytes32,
    /// Feature bits every transaction in the block must carry.
    pub tx_features: Features,
    /// State root after executing this block.
    pub state_root: Bytes32,
    /// Merkle root of the receipts.
    pub receipts_root: Bytes32,

    /// Proposer signature of the block summary (VIP-193).
    pub sig_on_summary: Vec<u8>,
    /// Endorser signatures, index-aligned with `vrf_proofs` (VIP-193).
    pub sigs_on_endorsement: Vec<Vec<u8>>,
    /// Endorser VRF proofs, index-aligned with `sigs_on_endorsement`.
    pub vrf_proofs: Vec<VrfProof>,

    /// BFT new-view pointer: id of the block leading this header's
    /// view. Zero when the header casts no NV vote.
    pub nv: Bytes32,
    /// BFT pre-prepare vote target. Zero when absent.
    pub pp: Bytes32,
    /// BFT pre-commit vote target. Zero when absent.
    pub pc: Bytes32,

    /// Proposer signature over the signing hash; empty until signed.
    pub signature: Vec<u8>,
}

impl Header {
    /// Parent id prefix that makes the genesis number wrap to zero.
    pub fn genesis_parent_id() -> Bytes32 {
        Bytes32::ZERO.with_block_number(u32::MAX)
    }

    /// The block number, derived from the parent id.
    #[inline]
    pub fn number(&self) -> u32 {
        self.parent_id.block_number().wrapping_add(1)
    }

    /// The hash the proposer signs.
    pub fn signing_hash(&self) -> Bytes32 {
        let mut stream = RlpStream::new_list(16);
        stream.append(&self.parent_id);
        stream.append(&self.timestamp);
        stream.append(&self.gas_limit);
        stream.append(&self.beneficiary);
        stream.append(&self.gas_used);
        stream.append(&self.total_score);
        stream.append(&self.txs_root);
        stream.append(&self.tx_features.0);
        stream.append(&self.state_root);
        stream.append(&self.receipts_root);
        stream.append(&self.sig_on_summary);
        stream.begin_list(self.sigs_on_endorsement.len());
        for sig in &self.sigs_on_endorsement {
            stream.append(sig);
        }
        stream.begin_list(self.vrf_proofs.len());
        for proof in &self.vrf_proofs {
            stream.append(&proof.to_bytes().to_vec());
        }
        stream.append(&self.nv);
        stream.append(&self.pp);
        stream.append(&self.pc);
        Bytes32::keccak256(&stream.out())
    }

    /// Recovers the proposer address from the header signature.
    pub fn signer(&self) -> Result<Address> {
        let sig = Signature::from_slice(&self.signature)
            .map_err(|_| Error::Signature("invalid signature length".to_string()))?;
        let addr = sig
            .recover_address(self.signing_hash().as_fixed_bytes())
            .map_err(|e| Error::Signature(e.to_string()))?;
        Ok(Address::new(addr))
    }

    /// The block id: `keccak(signing_hash ‖ signer)` with the block
    /// number spliced into the first four bytes.
    ///
    /// An unsigned header (the genesis case) hashes without a signer.
    pub fn id(&self) -> Bytes32 {
        let digest = match self.signer() {
            Ok(signer) => {
                Bytes32::keccak256_concat(&[self.signing_hash().as_bytes(), signer.as_bytes()])
            }
            Err(_) => self.signing_hash(),
        };
        digest.with_block_number(self.number())
    }

    /// Signs the header in place with `sk` and returns it.
    pub fn sign(mut self, sk: &thor_crypto::PrivateKey) -> Self {
        let sig = sk
            .sign(self.signing_hash().as_fixed_bytes())
            .expect("signing cannot fail for a valid key");
        self.signature = sig.as_bytes().to_vec();
        self
    }
}

/// Builder for [`Header`].
#[derive(Debug, Clone, Default)]
pub struct HeaderBuilder {
    header: Header,
}

impl HeaderBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the parent id.
    pub fn parent_id(mut self, parent_id: Bytes32) -> Self {
        self.header.parent_id = parent_id;
        self
    }

    /// Sets the timestamp.
    pub fn timestamp(mut self, timestamp: u64) -> Self {
        self.header.timestamp = timestamp;
        self
    }

    /// Sets the gas limit.
    pub fn gas_limit(mut self, gas_limit: u64) -> Self {
        self.header.gas_limit = gas_limit;
        self
    }

    /// Sets the beneficiary.
    pub fn beneficiary(mut self, beneficiary: Address) -> Self {
        self.header.beneficiary = beneficiary;
        self
    }

    /// Sets the gas used.
    pub fn gas_used(mut self, gas_used: u64) -> Self {
        self.header.gas_used = gas_used;
        self
    }

    /// Sets the total score.
    pub fn total_score(mut self, total_score: u64) -> Self {
        self.header.total_score = total_score;
        self
    }

    /// Sets the txs root.
    pub fn txs_root(mut self, txs_root: Bytes32) -> Self {
        self.header.txs_root = txs_root;
        self
    }

    /// Sets the tx feature bits.
    pub fn tx_features(mut self, features: Features) -> Self {
        self.header.tx_features = features;
        self
    }

    /// Sets the state root.
    pub fn state_root(mut self, state_root: Bytes32) -> Self {
        self.header.state_root = state_root;
        self
    }

    /// Sets the receipts root.
    pub fn receipts_root(mut self, receipts_root: Bytes32) -> Self {
        self.header.receipts_root = receipts_root;
        self
    }

    /// Sets the proposer's summary signature (VIP-193).
    pub fn sig_on_summary(mut self, sig: Vec<u8>) -> Self {
        self.header.sig_on_summary = sig;
        self
    }

    /// Sets the endorser signatures (VIP-193).
    pub fn sigs_on_endorsement(mut self, sigs: Vec<Vec<u8>>) -> Self {
        self.header.sigs_on_endorsement = sigs;
        self
    }

    /// Sets the endorser VRF proofs (VIP-193).
    pub fn vrf_proofs(mut self, proofs: Vec<VrfProof>) -> Self {
        self.header.vrf_proofs = proofs;
        self
    }

    /// Sets the BFT vote pointers.
    pub fn bft_votes(mut self, nv: Bytes32, pp: Bytes32, pc: Bytes32) -> Self {
        self.header.nv = nv;
        self.header.pp = pp;
        self.header.pc = pc;
        self
    }

    /// Builds the unsigned header.
    pub fn build(self) -> Header {
        self.header
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use thor_crypto::PrivateKey;

    fn genesis_header() -> Header {
        HeaderBuilder::new()
            .parent_id(Header::genesis_parent_id())
            .timestamp(1_526_400_000)
            .gas_limit(10_000_000)
            .build()
    }

    #[test]
    fn test_genesis_number_is_zero() {
        let genesis = genesis_header();
        assert_eq!(genesis.number(), 0);
        assert_eq!(genesis.id().block_number(), 0);
    }

    #[test]
    fn test_child_number_follows_parent() {
        let genesis = genesis_header();
        let child = HeaderBuilder::new()
            .parent_id(genesis.id())
            .timestamp(genesis.timestamp + 10)
            .build();
        assert_eq!(child.number(), 1);
        assert_eq!(child.id().block_number(), 1);
    }

    #[test]
    fn test_signer_recovery() {
        let sk = PrivateKey::random();
        let header = genesis_header().sign(&sk);
        assert_eq!(
            header.signer().unwrap(),
            Address::new(sk.public_key().to_address())
        );
    }

    #[test]
    fn test_id_depends_on_signer() {
        let header = genesis_header();
        let signed_a = header.clone().sign(&PrivateKey::random());
        let signed_b = header.sign(&PrivateKey::random());
        assert_eq!(signed_a.signing_hash(), signed_b.signing_hash());
        assert_ne!(signed_a.id(), signed_b.id());
    }

    #[test]
    fn test_signing_hash_covers_bft_votes() {
        let plain = genesis_header();
        let voting = HeaderBuilder::new()
            .parent_id(Header::genesis_parent_id())
            .timestamp(1_526_400_000)
            .gas_limit(10_000_000)
            .bft_votes(Bytes32::keccak256(b"nv"), Bytes32::ZERO, Bytes32::ZERO)
            .build();
        assert_ne!(plain.signing_hash(), voting.signing_hash());
    }
}
