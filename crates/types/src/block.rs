//! Blocks: a header plus its ordered transaction list.

use crate::merkle;
use crate::transaction::Transaction;
use crate::{Bytes32, Header};
use serde::{Deserialize, Serialize};

/// An immutable block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    header: Header,
    transactions: Vec<Transaction>,
}

impl Block {
    /// Composes a block from a header and a transaction list. The
    /// header's txs root is NOT recomputed; verification catches any
    /// mismatch.
    pub fn compose(header: Header, transactions: Vec<Transaction>) -> Self {
        Self {
            header,
            transactions,
        }
    }

    /// The block header.
    #[inline]
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// The ordered transactions.
    #[inline]
    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// The block id.
    #[inline]
    pub fn id(&self) -> Bytes32 {
        self.header.id()
    }
}

/// Computes the merkle root of an ordered transaction list.
pub fn txs_root(transactions: &[Transaction]) -> Bytes32 {
    merkle::root_of(transactions.iter().map(|tx| tx.encoded()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::TransactionBuilder;
    use thor_crypto::PrivateKey;

    #[test]
    fn test_txs_root_empty() {
        assert_eq!(txs_root(&[]), merkle::empty_root());
    }

    #[test]
    fn test_txs_root_sensitive_to_signature() {
        let tx = TransactionBuilder::new(1).gas(100_000).build();
        let signed = TransactionBuilder::new(1)
            .gas(100_000)
            .build_signed(&PrivateKey::random());
        assert_ne!(txs_root(&[tx]), txs_root(&[signed]));
    }
}
