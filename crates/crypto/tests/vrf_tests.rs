//! VRF proof tamper-resistance.

use thor_crypto::vrf::{VrfProof, VrfPublicKey, VrfSecretKey};

fn key(tag: u8) -> VrfSecretKey {
    let mut seed = [0u8; 32];
    seed[31] = tag;
    VrfSecretKey::from_seed(&seed)
}

#[test]
fn test_outputs_differ_across_keys() {
    let input = b"same input";
    let (out1, _) = key(1).prove(input);
    let (out2, _) = key(2).prove(input);
    assert_ne!(out1, out2);
}

#[test]
fn test_tampered_proof_fields_rejected() {
    let sk = key(3);
    let input = b"round seed";
    let (_, proof) = sk.prove(input);

    for field in 0..3 {
        let mut tampered = proof;
        match field {
            0 => tampered.gamma[0] ^= 1,
            1 => tampered.c[0] ^= 1,
            _ => tampered.s[0] ^= 1,
        }
        assert!(
            sk.public_key().verify(input, &tampered).is_none(),
            "tampered field {} accepted",
            field
        );
    }
}

#[test]
fn test_proof_from_truncated_bytes_rejected() {
    let (_, proof) = key(4).prove(b"x");
    let bytes = proof.to_bytes();
    assert!(VrfProof::from_bytes(&bytes[..64]).is_none());
    assert_eq!(VrfProof::from_bytes(&bytes), Some(proof));
}

#[test]
fn test_public_key_rejects_non_curve_bytes() {
    // not every 32-byte string decompresses to a curve point
    let mut found_invalid = false;
    for i in 0u8..32 {
        let mut bytes = [0xFFu8; 32];
        bytes[0] = i;
        if VrfPublicKey::from_bytes(&bytes).is_none() {
            found_invalid = true;
            break;
        }
    }
    assert!(found_invalid);
}

#[test]
fn test_registered_key_roundtrip_verifies() {
    let sk = key(5);
    let registered = sk.public_key().to_bytes();
    let restored = VrfPublicKey::from_bytes(&registered).unwrap();

    let input = b"committee seed";
    let (output, proof) = sk.prove(input);
    assert_eq!(restored.verify(input, &proof), Some(output));
}
