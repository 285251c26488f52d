//! Builtin contract addresses and fork-upgrade bytecodes.
//!
//! Builtin addresses are ASCII names left-padded to 20 bytes. The v2
//! runtime bytecodes are opaque blobs written into state at the
//! activation heights; the consensus core never interprets them.

use thor_types::Address;

/// Address of the authority registry contract ("Authority").
pub fn authority_address() -> Address {
    named_address(b"Authority")
}

/// Address of the extension contract ("Extension").
pub fn extension_address() -> Address {
    named_address(b"Extension")
}

/// Runtime bytecode of the extension contract v2, activated at VIP-191.
pub fn extension_v2_bytecode() -> Vec<u8> {
    // Opaque upgrade blob; the verifier only writes it.
    const CODE: &[u8] = &[0x60, 0x80, 0x60, 0x40, 0x52, 0x19, 0x01, 0xfe];
    CODE.to_vec()
}

/// Runtime bytecode of the authority registry v2, activated at VIP-193.
pub fn authority_v2_bytecode() -> Vec<u8> {
    const CODE: &[u8] = &[0x60, 0x80, 0x60, 0x40, 0x52, 0x19, 0x03, 0xfe];
    CODE.to_vec()
}

fn named_address(name: &[u8]) -> Address {
    let mut bytes = [0u8; 20];
    bytes[20 - name.len()..].copy_from_slice(name);
    Address::new(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_addresses() {
        assert_eq!(
            authority_address().to_hex(),
            "0x0000000000000000000000417574686f72697479"
        );
        assert_eq!(
            extension_address().to_hex(),
            "0x0000000000000000000000457874656e73696f6e"
        );
    }
}
