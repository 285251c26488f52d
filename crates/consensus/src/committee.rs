//! VRF committee election.
//!
//! Per round, each authority evaluates its VRF over the round seed.
//! The authority joins the committee when the leading four bytes of
//! its serialized proof, read as a big-endian u32, fall at or below
//! the election threshold. The seed is `keccak(beacon ‖ round)` where
//! the beacon is the id of the last block of the previous epoch, so
//! election is unpredictable ahead of the epoch but verifiable by
//! anyone holding the registered public key.

use thor_crypto::{VrfProof, VrfPublicKey, VrfSecretKey};
use thor_types::{Bytes32, Params};

/// Why a proof failed committee verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitteeFault {
    /// The proof does not verify under the given public key and seed.
    InvalidProof,
    /// The proof verifies but loses the election lottery.
    NotCommittee,
}

/// The election threshold for the configured committee ratio:
/// `floor(u32::MAX * committee_size * factor / max_block_proposers)`,
/// saturating at `u32::MAX`.
pub fn committee_threshold(params: &Params) -> u32 {
    let scaled = (u32::MAX as u64)
        .saturating_mul(params.committee_size)
        .saturating_mul(params.committee_threshold_factor)
        / params.max_block_proposers;
    scaled.min(u32::MAX as u64) as u32
}

/// Threshold comparison on the proof's leading four bytes.
pub fn is_committee_by_proof(proof: &VrfProof, params: &Params) -> bool {
    let bytes = proof.to_bytes();
    let lottery = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    lottery <= committee_threshold(params)
}

/// Computes a proof over `seed` and checks the threshold. Returns the
/// proof only on election so a losing ticket is never revealed.
pub fn is_committee_by_private_key(
    sk: &VrfSecretKey,
    seed: Bytes32,
    params: &Params,
) -> (bool, Option<VrfProof>) {
    let (_, proof) = sk.prove(seed.as_bytes());
    if is_committee_by_proof(&proof, params) {
        (true, Some(proof))
    } else {
        (false, None)
    }
}

/// Cryptographically verifies `proof` over `seed` and checks the
/// threshold.
pub fn verify_committee(
    pk: &VrfPublicKey,
    seed: Bytes32,
    proof: &VrfProof,
    params: &Params,
) -> Result<(), CommitteeFault> {
    if pk.verify(seed.as_bytes(), proof).is_none() {
        return Err(CommitteeFault::InvalidProof);
    }
    if !is_committee_by_proof(proof, params) {
        return Err(CommitteeFault::NotCommittee);
    }
    Ok(())
}

/// The round of timestamp `t`: slots elapsed since genesis, zero for
/// anything at or before genesis.
pub fn round_number(t: u64, genesis_timestamp: u64, params: &Params) -> u32 {
    if t <= genesis_timestamp {
        return 0;
    }
    ((t - genesis_timestamp) / params.block_interval) as u32
}

/// The epoch of timestamp `t`. Epoch 0 covers everything before the
/// first round; epoch `e ≥ 1` covers rounds `(e−1)·EpochInterval + 1`
/// through `e·EpochInterval`.
pub fn epoch_number(t: u64, genesis_timestamp: u64, params: &Params) -> u32 {
    let round = round_number(t, genesis_timestamp, params);
    if round == 0 {
        0
    } else {
        (round - 1) / params.epoch_interval + 1
    }
}

/// The block number whose id seeds epoch `epoch`: the last block of
/// the previous epoch (genesis for the first epoch).
pub fn beacon_block_number(epoch: u32, params: &Params) -> u32 {
    epoch.saturating_sub(1) * params.epoch_interval
}

/// Derives the epoch beacon from the chosen header's id.
pub fn beacon_from_header(header: &thor_types::Header) -> Bytes32 {
    header.id()
}

/// The committee seed for a round.
pub fn seed(beacon: Bytes32, round: u32) -> Bytes32 {
    Bytes32::keccak256_concat(&[beacon.as_bytes(), &round.to_be_bytes()])
}

#[cfg(test)]
mod tests {
    use super::*;

    const GENESIS_TS: u64 = 1_526_400_000;

    fn lenient_params() -> Params {
        // threshold saturates; every proof wins
        Params {
            max_block_proposers: 10,
            committee_size: 10,
            committee_threshold_factor: 2,
            ..Params::default()
        }
    }

    #[test]
    fn test_threshold_ratio_bound() {
        let params = Params::default();
        let threshold = committee_threshold(&params);
        let ratio = threshold as f64 / u32::MAX as f64;
        let bound = params.committee_size as f64 / params.max_block_proposers as f64
            * params.committee_threshold_factor as f64;
        assert!(ratio <= bound);
    }

    #[test]
    fn test_threshold_monotone_in_committee_ratio() {
        let mut params = Params::default();
        let mut last = committee_threshold(&params);
        for size in [30, 50, 80, 101] {
            params.committee_size = size;
            let threshold = committee_threshold(&params);
            assert!(threshold >= last);
            last = threshold;
        }
    }

    #[test]
    fn test_saturated_threshold_accepts_everything() {
        let params = lenient_params();
        assert_eq!(committee_threshold(&params), u32::MAX);

        let sk = VrfSecretKey::from_seed(&[1u8; 32]);
        let (elected, proof) =
            is_committee_by_private_key(&sk, Bytes32::keccak256(b"seed"), &params);
        assert!(elected);
        assert!(proof.is_some());
    }

    #[test]
    fn test_by_key_matches_by_proof() {
        let params = Params::default();
        let sk = VrfSecretKey::from_seed(&[2u8; 32]);

        // scan rounds until both outcomes observed
        let mut hit = false;
        let mut miss = false;
        for nonce in 0u32..512 {
            let round_seed = seed(Bytes32::keccak256(b"beacon"), nonce);
            let (_, proof) = sk.prove(round_seed.as_bytes());
            let expected = is_committee_by_proof(&proof, &params);
            let (elected, returned) = is_committee_by_private_key(&sk, round_seed, &params);
            assert_eq!(elected, expected);
            assert_eq!(returned.is_some(), expected);
            if expected {
                hit = true;
            } else {
                miss = true;
            }
            if hit && miss {
                return;
            }
        }
        panic!("expected both elected and non-elected samples in 512 rounds");
    }

    #[test]
    fn test_verify_committee_faults() {
        let params = lenient_params();
        let sk = VrfSecretKey::from_seed(&[3u8; 32]);
        let round_seed = seed(Bytes32::keccak256(b"beacon"), 1);
        let (_, proof) = sk.prove(round_seed.as_bytes());

        assert_eq!(
            verify_committee(sk.public_key(), round_seed, &proof, &params),
            Ok(())
        );
        assert_eq!(
            verify_committee(sk.public_key(), seed(Bytes32::ZERO, 2), &proof, &params),
            Err(CommitteeFault::InvalidProof)
        );

        let strict = Params {
            committee_size: 0,
            ..params
        };
        assert_eq!(
            verify_committee(sk.public_key(), round_seed, &proof, &strict),
            Err(CommitteeFault::NotCommittee)
        );
    }

    #[test]
    fn test_epoch_numbering() {
        let params = Params::default();
        let interval = params.block_interval;
        let epoch_len = params.epoch_interval as u64;

        assert_eq!(epoch_number(GENESIS_TS - 1, GENESIS_TS, &params), 0);
        assert_eq!(epoch_number(GENESIS_TS + 1, GENESIS_TS, &params), 0);
        assert_eq!(epoch_number(GENESIS_TS + interval, GENESIS_TS, &params), 1);
        assert_eq!(
            epoch_number(GENESIS_TS + interval * epoch_len, GENESIS_TS, &params),
            1
        );
        assert_eq!(
            epoch_number(GENESIS_TS + interval * epoch_len + 1, GENESIS_TS, &params),
            1
        );
        assert_eq!(
            epoch_number(GENESIS_TS + interval * (epoch_len + 1), GENESIS_TS, &params),
            2
        );
    }

    #[test]
    fn test_beacon_block_number() {
        let params = Params::default();
        assert_eq!(beacon_block_number(0, &params), 0);
        assert_eq!(beacon_block_number(1, &params), 0);
        assert_eq!(beacon_block_number(2, &params), params.epoch_interval);
        assert_eq!(beacon_block_number(3, &params), 2 * params.epoch_interval);
    }

    #[test]
    fn test_seed_binds_round() {
        let beacon = Bytes32::keccak256(b"beacon");
        assert_ne!(seed(beacon, 1), seed(beacon, 2));
    }
}
