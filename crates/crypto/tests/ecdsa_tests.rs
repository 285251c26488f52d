//! Recoverable signature behavior at the crate boundary.

use thor_crypto::ecdsa::{PrivateKey, Signature};
use thor_crypto::keccak256;

#[test]
fn test_recovery_is_stable_across_serialization() {
    let sk = PrivateKey::random();
    let hash = keccak256(b"header signing hash");
    let sig = sk.sign(&hash).unwrap();

    let restored = Signature::from_slice(sig.as_bytes()).unwrap();
    assert_eq!(
        restored.recover_address(&hash).unwrap(),
        sk.public_key().to_address()
    );
}

#[test]
fn test_distinct_keys_recover_distinct_addresses() {
    let hash = keccak256(b"shared content");
    let a = PrivateKey::random();
    let b = PrivateKey::random();
    let addr_a = a.sign(&hash).unwrap().recover_address(&hash).unwrap();
    let addr_b = b.sign(&hash).unwrap().recover_address(&hash).unwrap();
    assert_ne!(addr_a, addr_b);
}

#[test]
fn test_key_from_bytes_roundtrip() {
    let sk = PrivateKey::random();
    let restored = PrivateKey::from_bytes(&sk.to_bytes()).unwrap();
    assert_eq!(
        restored.public_key().to_address(),
        sk.public_key().to_address()
    );
}

#[test]
fn test_zero_secret_rejected() {
    assert!(PrivateKey::from_bytes(&[0u8; 32]).is_err());
}

#[test]
fn test_garbage_signature_does_not_recover_signer() {
    let sk = PrivateKey::random();
    let hash = keccak256(b"message");
    let mut bytes = [0u8; 65];
    bytes[..64].copy_from_slice(&[0x11; 64]);
    let garbage = Signature::new(bytes);
    if let Ok(addr) = garbage.recover_address(&hash) {
        assert_ne!(addr, sk.public_key().to_address());
    }
}
