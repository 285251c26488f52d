//! Static tables for well-known networks.
//!
//! These values are consensus-critical and compiled in: fork heights
//! keyed by genesis id, the VRF public keys backfilled into the
//! authority registry at the VIP-193 fork, and the receipts-root
//! exemptions for historic mainnet blocks.

use crate::address::must_parse_address;
use crate::bytes32::must_parse_bytes32;
use crate::fork_config::{ForkConfig, NEVER};
use crate::{Address, Bytes32};
use std::collections::HashMap;

/// Returns the fork config for a well-known genesis id, or `None` for
/// private networks (which must supply their own).
pub fn fork_config_for_genesis(genesis_id: Bytes32) -> Option<ForkConfig> {
    // mainnet
    if genesis_id
        == must_parse_bytes32("0x00000000851caf3cfdb6e899cf5958bfb1ac3413d346d43539627e6be7ec1b4a")
    {
        return Some(ForkConfig {
            vip191: 3_337_300,
            eth_const: 3_337_300,
            blocklist: 4_817_300,
            vip193: NEVER,
        });
    }
    // testnet
    if genesis_id
        == must_parse_bytes32("0x000000000b2bce3c70bc649a02749e8687721b09ed2e15997f466536b20bb127")
    {
        return Some(ForkConfig {
            vip191: 2_898_800,
            eth_const: 3_192_500,
            blocklist: NEVER,
            vip193: NEVER,
        });
    }
    None
}

/// Returns the registered VRF public key for a legacy masternode.
///
/// Used exactly once, at VIP-193 activation, to backfill the authority
/// registry of nodes that predate VRF registration.
pub fn legacy_vrf_public_key(node_master: Address) -> Option<Bytes32> {
    let table: [(&str, &str); 3] = [
        (
            "0x2a02604a8b7aaa84991c21d7de1c3238046c5275",
            "0x96893d6f2d785dbdf75d635d74ee53b85a3e7837150d321c4965de3def134182",
        ),
        (
            "0x86fd9eb1cf082d7d6b0c6033fc89ccfcbf648549",
            "0x97b182c4d88435c3781bf5f29a59c169a91564acbf193c9ba95a4db3fa703f26",
        ),
        (
            "0x8f53d18bb03c84ed92abe0b6a9a8c277dbbf719f",
            "0x2ab534b885f45e7e628e3bea8bb1a7e914f0009d077a44ac2d4461e7731fcb2c",
        ),
    ];
    for (addr, key) in table {
        if must_parse_address(addr) == node_master {
            return Some(must_parse_bytes32(key));
        }
    }
    None
}

/// Loads the receipts-root exemptions for historic blocks whose stored
/// roots differ from recomputation due to pre-fork quirks, keyed by
/// block-id hex.
pub fn load_correct_receipts_roots() -> HashMap<String, Bytes32> {
    let mut roots = HashMap::new();
    roots.insert(
        "0x000af0c4a54b66e1ecd59fa07e8b504c9bfd18d7dcbd3b94bb0388c184b45bc8".to_string(),
        must_parse_bytes32("0x53d0b85b953203e0ebe1a3982968e37689be225e4bb4dbb02a1f5b25cf747cd2"),
    );
    roots
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mainnet_fork_heights() {
        let config = fork_config_for_genesis(must_parse_bytes32(
            "0x00000000851caf3cfdb6e899cf5958bfb1ac3413d346d43539627e6be7ec1b4a",
        ))
        .unwrap();
        assert_eq!(config.vip191, 3_337_300);
        assert_eq!(config.eth_const, 3_337_300);
        assert_eq!(config.blocklist, 4_817_300);
        assert_eq!(config.vip193, NEVER);
    }

    #[test]
    fn test_testnet_fork_heights() {
        let config = fork_config_for_genesis(must_parse_bytes32(
            "0x000000000b2bce3c70bc649a02749e8687721b09ed2e15997f466536b20bb127",
        ))
        .unwrap();
        assert_eq!(config.vip191, 2_898_800);
        assert_eq!(config.eth_const, 3_192_500);
        assert_eq!(config.blocklist, NEVER);
    }

    #[test]
    fn test_unknown_genesis_has_no_config() {
        assert!(fork_config_for_genesis(Bytes32::ZERO).is_none());
    }

    #[test]
    fn test_legacy_vrf_keys_present_for_all_three_masternodes() {
        for addr in [
            "0x2a02604a8b7aaa84991c21d7de1c3238046c5275",
            "0x86fd9eb1cf082d7d6b0c6033fc89ccfcbf648549",
            "0x8f53d18bb03c84ed92abe0b6a9a8c277dbbf719f",
        ] {
            assert!(legacy_vrf_public_key(must_parse_address(addr)).is_some());
        }
        assert!(legacy_vrf_public_key(Address::ZERO).is_none());
    }
}
