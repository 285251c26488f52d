//! Committee endorsements of block summaries.
//!
//! An endorsement binds a committee member's VRF proof to a specific
//! summary. The signing hash is consensus-critical:
//! `keccak256(summary_hash ‖ vrf_proof_bytes)`.

use crate::summary::Summary;
use crate::{Address, Bytes32, Error, Result};
use serde::{Deserialize, Serialize};
use thor_crypto::{Signature, VrfProof};

/// A committee member's attestation of a block summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endorsement {
    /// The endorsed summary.
    pub summary: Summary,
    /// The endorser's VRF proof over the round seed.
    pub vrf_proof: VrfProof,
    /// Endorser signature; empty until signed.
    pub signature: Vec<u8>,
}

impl Endorsement {
    /// Creates an unsigned endorsement.
    pub fn new(summary: Summary, vrf_proof: VrfProof) -> Self {
        Self {
            summary,
            vrf_proof,
            signature: Vec::new(),
        }
    }

    /// The hash the endorser signs.
    pub fn signing_hash(&self) -> Bytes32 {
        endorsement_signing_hash(self.summary.signing_hash(), &self.vrf_proof)
    }

    /// Recovers the endorser address from the signature.
    pub fn signer(&self) -> Result<Address> {
        let sig = Signature::from_slice(&self.signature)
            .map_err(|_| Error::Signature("invalid signature length".to_string()))?;
        let addr = sig
            .recover_address(self.signing_hash().as_fixed_bytes())
            .map_err(|e| Error::Signature(e.to_string()))?;
        Ok(Address::new(addr))
    }

    /// Signs the endorsement in place with `sk` and returns it.
    pub fn sign(mut self, sk: &thor_crypto::PrivateKey) -> Self {
        let sig = sk
            .sign(self.signing_hash().as_fixed_bytes())
            .expect("signing cannot fail for a valid key");
        self.signature = sig.as_bytes().to_vec();
        self
    }
}

/// The endorsement signing hash for a summary hash and proof, used by
/// block verification which reconstructs endorsements from header
/// fields.
pub fn endorsement_signing_hash(summary_hash: Bytes32, proof: &VrfProof) -> Bytes32 {
    Bytes32::keccak256_concat(&[summary_hash.as_bytes(), &proof.to_bytes()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use thor_crypto::{PrivateKey, VrfSecretKey};

    #[test]
    fn test_signer_recovery() {
        let sk = PrivateKey::random();
        let vrf = VrfSecretKey::from_seed(&[7u8; 32]);
        let summary = Summary::new(Bytes32::keccak256(b"parent"), Bytes32::ZERO, 100, 1);
        let (_, proof) = vrf.prove(b"seed");

        let ed = Endorsement::new(summary, proof).sign(&sk);
        assert_eq!(
            ed.signer().unwrap(),
            Address::new(sk.public_key().to_address())
        );
    }

    #[test]
    fn test_hash_binds_proof() {
        let vrf = VrfSecretKey::from_seed(&[8u8; 32]);
        let summary = Summary::new(Bytes32::ZERO, Bytes32::ZERO, 100, 1);
        let (_, proof_a) = vrf.prove(b"seed a");
        let (_, proof_b) = vrf.prove(b"seed b");

        let ed_a = Endorsement::new(summary.clone(), proof_a);
        let ed_b = Endorsement::new(summary, proof_b);
        assert_ne!(ed_a.signing_hash(), ed_b.signing_hash());
    }
}
