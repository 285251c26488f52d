//! Block summaries.
//!
//! A summary is the artifact a proposer signs and broadcasts before
//! endorsements are collected: it commits to the parent, the tx set
//! root, the slot timestamp and the total score, but not to state or
//! receipts (those come only after execution).
//!
//! The signing hash is consensus-critical:
//! `keccak256(rlp(parent_id, txs_root, timestamp, total_score))`.

use crate::{Address, Bytes32, Error, Result};
use rlp::RlpStream;
use serde::{Deserialize, Serialize};
use thor_crypto::Signature;

/// A proposer's commitment to a block-in-progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    /// Id of the parent block.
    pub parent_id: Bytes32,
    /// Root of the proposed transaction set.
    pub txs_root: Bytes32,
    /// Slot timestamp of the proposed block.
    pub timestamp: u64,
    /// Total score of the proposed block.
    pub total_score: u64,
    /// Proposer signature; empty until signed.
    pub signature: Vec<u8>,
}

impl Summary {
    /// Creates an unsigned summary.
    pub fn new(parent_id: Bytes32, txs_root: Bytes32, timestamp: u64, total_score: u64) -> Self {
        Self {
            parent_id,
            txs_root,
            timestamp,
            total_score,
            signature: Vec::new(),
        }
    }

    /// The hash the proposer signs.
    pub fn signing_hash(&self) -> Bytes32 {
        let mut stream = RlpStream::new_list(4);
        stream.append(&self.parent_id);
        stream.append(&self.txs_root);
        stream.append(&self.timestamp);
        stream.append(&self.total_score);
        Bytes32::keccak256(&stream.out())
    }

    /// Recovers the proposer address from the signature.
    pub fn signer(&self) -> Result<Address> {
        let sig = Signature::from_slice(&self.signature)
            .map_err(|_| Error::Signature("invalid signature length".to_string()))?;
        let addr = sig
            .recover_address(self.signing_hash().as_fixed_bytes())
            .map_err(|e| Error::Signature(e.to_string()))?;
        Ok(Address::new(addr))
    }

    /// Signs the summary in place with `sk` and returns it.
    pub fn sign(mut self, sk: &thor_crypto::PrivateKey) -> Self {
        let sig = sk
            .sign(self.signing_hash().as_fixed_bytes())
            .expect("signing cannot fail for a valid key");
        self.signature = sig.as_bytes().to_vec();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use thor_crypto::PrivateKey;

    #[test]
    fn test_signer_recovery() {
        let sk = PrivateKey::random();
        let summary = Summary::new(Bytes32::keccak256(b"parent"), Bytes32::ZERO, 100, 1).sign(&sk);
        assert_eq!(
            summary.signer().unwrap(),
            Address::new(sk.public_key().to_address())
        );
    }

    #[test]
    fn test_signing_hash_covers_all_fields() {
        let base = Summary::new(Bytes32::ZERO, Bytes32::ZERO, 100, 1);
        let mut changed = base.clone();
        changed.total_score = 2;
        assert_ne!(base.signing_hash(), changed.signing_hash());
    }
}
