//! Protocol constants and the injectable parameter set.
//!
//! The constants are the wire-level values every peer must agree on.
//! Components take a [`Params`] value (defaulting to these constants)
//! instead of reading globals, so tests can shrink the proposer set or
//! the committee without touching consensus code.

use serde::{Deserialize, Serialize};

/// Seconds between consecutive block slots.
pub const BLOCK_INTERVAL: u64 = 10;

/// Number of rounds per epoch; the committee beacon is stable within an
/// epoch.
pub const EPOCH_INTERVAL: u32 = 180;

/// Maximum number of block proposers (authority nodes).
pub const MAX_BLOCK_PROPOSERS: u64 = 101;

/// Number of committee members required to endorse a block summary.
pub const COMMITTEE_SIZE: u64 = 25;

/// Amplification factor applied to the committee election probability.
pub const COMMITTEE_THRESHOLD_FACTOR: u64 = 2;

/// Lower bound of block gas limit.
pub const MIN_GAS_LIMIT: u64 = 1_000 * 1_000;

/// Gas limit of the genesis block.
pub const INITIAL_GAS_LIMIT: u64 = 10_000_000;

/// Bound divisor limiting gas-limit drift between parent and child.
pub const GAS_LIMIT_BOUND_DIVISOR: u64 = 1024;

/// Intrinsic gas of a transaction.
pub const TX_GAS: u64 = 5_000;

/// Intrinsic gas of a clause calling an existing account.
pub const CLAUSE_GAS: u64 = 16_000;

/// Intrinsic gas of a clause creating a contract.
pub const CLAUSE_GAS_CONTRACT_CREATION: u64 = 48_000;

/// Protocol parameters carried by the engine.
///
/// `Params::default()` is the production configuration; constructing a
/// custom value is reserved for tests and private deployments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Params {
    /// Seconds between block slots.
    pub block_interval: u64,
    /// Rounds per epoch.
    pub epoch_interval: u32,
    /// Maximum number of proposers.
    pub max_block_proposers: u64,
    /// Required number of endorsements.
    pub committee_size: u64,
    /// Election probability amplification.
    pub committee_threshold_factor: u64,
    /// Lower bound of block gas limit.
    pub min_gas_limit: u64,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            block_interval: BLOCK_INTERVAL,
            epoch_interval: EPOCH_INTERVAL,
            max_block_proposers: MAX_BLOCK_PROPOSERS,
            committee_size: COMMITTEE_SIZE,
            committee_threshold_factor: COMMITTEE_THRESHOLD_FACTOR,
            min_gas_limit: MIN_GAS_LIMIT,
        }
    }
}

impl Params {
    /// Clock tolerance for accepting blocks from the future.
    #[inline]
    pub fn block_tolerance(&self) -> u64 {
        self.block_interval / 2
    }

    /// Byzantine fault bound `f` for the BFT overlay, with quorums of
    /// `2f + 1` proposers.
    #[inline]
    pub fn bft_fault_bound(&self) -> u64 {
        (self.max_block_proposers - 1) / 3
    }

    /// Size of a BFT quorum certificate.
    #[inline]
    pub fn bft_quorum(&self) -> u64 {
        2 * self.bft_fault_bound() + 1
    }
}

/// Validates a candidate gas limit against its parent.
///
/// The child limit may drift from the parent by at most
/// `parent / GAS_LIMIT_BOUND_DIVISOR` and must stay above
/// `min_gas_limit`.
pub fn is_valid_gas_limit(gas_limit: u64, parent_gas_limit: u64, min_gas_limit: u64) -> bool {
    let delta = parent_gas_limit / GAS_LIMIT_BOUND_DIVISOR;
    if gas_limit < min_gas_limit {
        return false;
    }
    if gas_limit > parent_gas_limit && gas_limit - parent_gas_limit > delta {
        return false;
    }
    if gas_limit < parent_gas_limit && parent_gas_limit - gas_limit > delta {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gas_limit_band() {
        let parent = INITIAL_GAS_LIMIT;
        let delta = parent / GAS_LIMIT_BOUND_DIVISOR;

        assert!(is_valid_gas_limit(parent, parent, MIN_GAS_LIMIT));
        assert!(is_valid_gas_limit(parent + delta, parent, MIN_GAS_LIMIT));
        assert!(is_valid_gas_limit(parent - delta, parent, MIN_GAS_LIMIT));
        assert!(!is_valid_gas_limit(parent + delta + 1, parent, MIN_GAS_LIMIT));
        assert!(!is_valid_gas_limit(parent - delta - 1, parent, MIN_GAS_LIMIT));
        assert!(!is_valid_gas_limit(MIN_GAS_LIMIT - 1, MIN_GAS_LIMIT, MIN_GAS_LIMIT));
    }

    #[test]
    fn test_default_params_match_constants() {
        let params = Params::default();
        assert_eq!(params.block_interval, BLOCK_INTERVAL);
        assert_eq!(params.max_block_proposers, MAX_BLOCK_PROPOSERS);
        assert_eq!(params.block_tolerance(), BLOCK_INTERVAL / 2);
    }

    #[test]
    fn test_bft_quorum_for_production_set() {
        let params = Params::default();
        // 101 proposers tolerate f = 33 faults with 67-vote quorums.
        assert_eq!(params.bft_fault_bound(), 33);
        assert_eq!(params.bft_quorum(), 67);
    }
}
