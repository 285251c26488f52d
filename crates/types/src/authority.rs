//! Authority registry entries.

use crate::{Address, Bytes32};
use serde::{Deserialize, Serialize};

/// One entry of the on-chain authority registry, iterable in insertion
/// order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    /// Address the node signs blocks with.
    pub node_master: Address,
    /// Address receiving block rewards for this node.
    pub endorsor: Address,
    /// Identity commitment of the node operator.
    pub identity: Bytes32,
    /// Registered VRF public key; zero before VIP-193 backfill.
    pub vrf_public_key: Bytes32,
    /// Whether the node currently participates in scheduling.
    pub active: bool,
}

impl Candidate {
    /// Creates an active candidate without a VRF key.
    pub fn new(node_master: Address, endorsor: Address, identity: Bytes32) -> Self {
        Self {
            node_master,
            endorsor,
            identity,
            vrf_public_key: Bytes32::ZERO,
            active: true,
        }
    }

    /// Sets the VRF public key.
    pub fn with_vrf_public_key(mut self, key: Bytes32) -> Self {
        self.vrf_public_key = key;
        self
    }
}
