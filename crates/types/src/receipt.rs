//! Transaction receipts.

use crate::{Address, Bytes32};
use rlp::RlpStream;
use serde::{Deserialize, Serialize};

/// Outcome of executing one transaction.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Receipt {
    /// Gas consumed by the transaction.
    pub gas_used: u64,
    /// Account that paid for the gas.
    pub gas_payer: Address,
    /// Whether execution reverted. A reverted tx is still included and
    /// still pays gas; dependent transactions may not build on it.
    pub reverted: bool,
    /// Aggregate of the clause outputs.
    pub outputs_hash: Bytes32,
}

impl Receipt {
    /// The wire encoding used as the merkle leaf for the receipts root.
    pub fn encoded(&self) -> Vec<u8> {
        let mut stream = RlpStream::new_list(4);
        stream.append(&self.gas_used);
        stream.append(&self.gas_payer);
        stream.append(&self.reverted);
        stream.append(&self.outputs_hash);
        stream.out().to_vec()
    }
}

/// Computes the receipts root of an ordered receipt list.
pub fn receipts_root(receipts: &[Receipt]) -> Bytes32 {
    crate::merkle::root_of(receipts.iter().map(|r| r.encoded()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_changes_with_content() {
        let a = Receipt {
            gas_used: 21_000,
            ..Default::default()
        };
        let b = Receipt {
            gas_used: 21_001,
            ..Default::default()
        };
        assert_ne!(receipts_root(&[a]), receipts_root(&[b]));
    }

    #[test]
    fn test_empty_root_matches_merkle_empty() {
        assert_eq!(receipts_root(&[]), crate::merkle::empty_root());
    }
}
