//! Binary merkle root over ordered item encodings.
//!
//! Transactions and receipts commit to their block-level roots with the
//! same derivation: hash each item's encoding, then fold pairs upward,
//! promoting an odd tail node unchanged.

use crate::Bytes32;

/// Root of an empty item list.
pub fn empty_root() -> Bytes32 {
    Bytes32::keccak256(&rlp::EMPTY_LIST_RLP)
}

/// Computes the merkle root of ordered item encodings.
pub fn root_of<I, E>(items: I) -> Bytes32
where
    I: IntoIterator<Item = E>,
    E: AsRef<[u8]>,
{
    let mut layer: Vec<Bytes32> = items
        .into_iter()
        .map(|encoded| Bytes32::keccak256(encoded.as_ref()))
        .collect();

    if layer.is_empty() {
        return empty_root();
    }

    while layer.len() > 1 {
        let mut next = Vec::with_capacity(layer.len().div_ceil(2));
        for pair in layer.chunks(2) {
            match pair {
                [left, right] => next.push(Bytes32::keccak256_concat(&[
                    left.as_bytes(),
                    right.as_bytes(),
                ])),
                [odd] => next.push(*odd),
                _ => unreachable!(),
            }
        }
        layer = next;
    }
    layer[0]
}
