//! Fork activation heights.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel height for a fork that never activates.
pub const NEVER: u32 = u32::MAX;

/// Block numbers at which the recognized protocol forks activate.
///
/// A field equal to [`NEVER`] means the fork is disabled on the
/// network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForkConfig {
    /// VIP-191: designated gas payer (extension contract v2).
    pub vip191: u32,
    /// Ethereum-constantinople opcode set.
    pub eth_const: u32,
    /// Origin blocklist enforcement.
    pub blocklist: u32,
    /// VIP-193: VRF committee endorsement of block summaries.
    pub vip193: u32,
}

/// A config without any forks.
pub const NO_FORK: ForkConfig = ForkConfig {
    vip191: NEVER,
    eth_const: NEVER,
    blocklist: NEVER,
    vip193: NEVER,
};

impl Default for ForkConfig {
    fn default() -> Self {
        NO_FORK
    }
}

impl fmt::Display for ForkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        let mut push = |name: &str, number: u32| {
            if number != NEVER {
                parts.push(format!("{}: #{}", name, number));
            }
        };
        push("VIP191", self.vip191);
        push("ETH_CONST", self.eth_const);
        push("BLOCKLIST", self.blocklist);
        push("VIP193", self.vip193);
        write!(f, "{}", parts.join(", "))
    }
}
