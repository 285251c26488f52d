//! Signed transaction sets.
//!
//! The proposer signs the root of the tx set it intends to pack so
//! endorsers can verify the summary's `txs_root` refers to content the
//! proposer actually committed to.

use crate::block::txs_root;
use crate::transaction::Transaction;
use crate::{Address, Bytes32, Error, Result};
use serde::{Deserialize, Serialize};
use thor_crypto::Signature;

/// An ordered transaction list with a signed root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxSet {
    /// The ordered transactions.
    pub transactions: Vec<Transaction>,
    /// Proposer signature over the root; empty until signed.
    pub signature: Vec<u8>,
}

impl TxSet {
    /// Creates an unsigned tx set.
    pub fn new(transactions: Vec<Transaction>) -> Self {
        Self {
            transactions,
            signature: Vec::new(),
        }
    }

    /// The merkle root of the transactions.
    pub fn root(&self) -> Bytes32 {
        txs_root(&self.transactions)
    }

    /// The hash the proposer signs (the root itself).
    pub fn signing_hash(&self) -> Bytes32 {
        self.root()
    }

    /// Recovers the signer address from the signature.
    pub fn signer(&self) -> Result<Address> {
        let sig = Signature::from_slice(&self.signature)
            .map_err(|_| Error::Signature("invalid signature length".to_string()))?;
        let addr = sig
            .recover_address(self.signing_hash().as_fixed_bytes())
            .map_err(|e| Error::Signature(e.to_string()))?;
        Ok(Address::new(addr))
    }

    /// Signs the tx set in place with `sk` and returns it.
    pub fn sign(mut self, sk: &thor_crypto::PrivateKey) -> Self {
        let sig = sk
            .sign(self.signing_hash().as_fixed_bytes())
            .expect("signing cannot fail for a valid key");
        self.signature = sig.as_bytes().to_vec();
        self
    }
}
