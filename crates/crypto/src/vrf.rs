//! # Verifiable random function for committee election
//!
//! Each authority holds an Ed25519-curve VRF key pair. For a round seed
//! the secret key produces a pseudorandom output plus a proof; anyone
//! holding the registered 32-byte public key can verify the proof and
//! recompute the output. Committee membership is decided by comparing
//! the leading four bytes of the serialized proof against the election
//! threshold, so a proof is simultaneously an attestation and a lottery
//! ticket.
//!
//! The construction follows ECVRF-EDWARDS25519-SHA512-TAI: hash the
//! input to a curve point, multiply by the secret scalar, and prove the
//! discrete-log equality with a Chaum-Pedersen style challenge.

use curve25519_dalek::{
    constants::ED25519_BASEPOINT_POINT,
    edwards::{CompressedEdwardsY, EdwardsPoint},
    scalar::Scalar,
    traits::VartimeMultiscalarMul,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};

/// Serialized proof length in bytes (gamma ‖ c ‖ s)
pub const PROOF_LENGTH: usize = 96;

const DOMAIN_HASH_TO_CURVE: &[u8] = b"thor_vrf_h2c";
const DOMAIN_NONCE: &[u8] = b"thor_vrf_nonce";
const DOMAIN_CHALLENGE: &[u8] = b"thor_vrf_challenge";
const DOMAIN_OUTPUT: &[u8] = b"thor_vrf_output";

/// A VRF secret key derived from a 32-byte seed.
#[derive(Clone)]
pub struct VrfSecretKey {
    scalar: Scalar,
    public: VrfPublicKey,
}

/// A VRF public key: a point on the Ed25519 curve, registered on-chain
/// as its 32-byte compressed encoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VrfPublicKey {
    point: EdwardsPoint,
    compressed: [u8; 32],
}

/// A VRF proof: gamma point plus the challenge/response scalars.
///
/// The serialized form is `gamma ‖ c ‖ s` (96 bytes). Committee
/// election reads the leading 4 bytes of this encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct VrfProof {
    /// Gamma point (compressed)
    pub gamma: [u8; 32],
    /// Challenge scalar
    pub c: [u8; 32],
    /// Response scalar
    pub s: [u8; 32],
}

impl VrfProof {
    /// Serializes the proof to its 96-byte wire form.
    pub fn to_bytes(&self) -> [u8; PROOF_LENGTH] {
        let mut out = [0u8; PROOF_LENGTH];
        out[..32].copy_from_slice(&self.gamma);
        out[32..64].copy_from_slice(&self.c);
        out[64..].copy_from_slice(&self.s);
        out
    }

    /// Deserializes a proof from its 96-byte wire form.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != PROOF_LENGTH {
            return None;
        }
        let mut gamma = [0u8; 32];
        let mut c = [0u8; 32];
        let mut s = [0u8; 32];
        gamma.copy_from_slice(&bytes[..32]);
        c.copy_from_slice(&bytes[32..64]);
        s.copy_from_slice(&bytes[64..]);
        Some(Self { gamma, c, s })
    }
}

impl VrfSecretKey {
    /// Derives a secret key from a 32-byte seed, following the Ed25519
    /// expansion: SHA-512 the seed and clamp the low half.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let digest = Sha512::digest(seed);

        let mut scalar_bytes = [0u8; 32];
        scalar_bytes.copy_from_slice(&digest[..32]);
        scalar_bytes[0] &= 248;
        scalar_bytes[31] &= 127;
        scalar_bytes[31] |= 64;

        let scalar = Scalar::from_bytes_mod_order(scalar_bytes);
        let point = &scalar * ED25519_BASEPOINT_POINT;

        Self {
            scalar,
            public: VrfPublicKey {
                point,
                compressed: point.compress().to_bytes(),
            },
        }
    }

    /// Returns the corresponding public key.
    pub fn public_key(&self) -> &VrfPublicKey {
        &self.public
    }

    /// Computes the VRF output and proof for `input`.
    pub fn prove(&self, input: &[u8]) -> ([u8; 64], VrfProof) {
        let h = hash_to_curve(input);
        let gamma = self.scalar * h;

        // Deterministic nonce keeps the proof stable for a given input.
        let k = {
            let mut hasher = Sha512::new();
            hasher.update(DOMAIN_NONCE);
            hasher.update(self.scalar.as_bytes());
            hasher.update(input);
            Scalar::from_bytes_mod_order_wide(&hasher.finalize().into())
        };

        let u = &k * ED25519_BASEPOINT_POINT;
        let v = k * h;

        let c = challenge(&self.public.compressed, &h, &gamma, &u, &v);
        let s = k - c * self.scalar;

        let proof = VrfProof {
            gamma: gamma.compress().to_bytes(),
            c: c.to_bytes(),
            s: s.to_bytes(),
        };
        (output_from_gamma(&gamma), proof)
    }
}

impl VrfPublicKey {
    /// Decodes a public key from its compressed 32-byte encoding.
    ///
    /// Returns `None` if the bytes are not a valid curve point.
    pub fn from_bytes(bytes: &[u8; 32]) -> Option<Self> {
        let point = CompressedEdwardsY::from_slice(bytes).ok()?.decompress()?;
        Some(Self {
            point,
            compressed: *bytes,
        })
    }

    /// Returns the compressed 32-byte encoding.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.compressed
    }

    /// Verifies `proof` against `input`, returning the VRF output when
    /// the proof is valid.
    pub fn verify(&self, input: &[u8], proof: &VrfProof) -> Option<[u8; 64]> {
        let gamma = CompressedEdwardsY::from_slice(&proof.gamma)
            .ok()?
            .decompress()?;

        // Scalars must be canonical; anything else is a forgery attempt.
        let c = Option::<Scalar>::from(Scalar::from_canonical_bytes(proof.c))?;
        let s = Option::<Scalar>::from(Scalar::from_canonical_bytes(proof.s))?;

        let h = hash_to_curve(input);

        // U = s·G + c·pk, V = s·H + c·gamma
        let u = EdwardsPoint::vartime_double_scalar_mul_basepoint(&c, &self.point, &s);
        let v = EdwardsPoint::vartime_multiscalar_mul(&[s, c], &[h, gamma]);

        if challenge(&self.compressed, &h, &gamma, &u, &v) == c {
            Some(output_from_gamma(&gamma))
        } else {
            None
        }
    }
}

impl Serialize for VrfPublicKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&format!("0x{}", hex::encode(self.compressed)))
    }
}

impl<'de> Deserialize<'de> for VrfPublicKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error;
        let s = String::deserialize(deserializer)?;
        let s = s.strip_prefix("0x").unwrap_or(&s);
        let bytes = hex::decode(s).map_err(D::Error::custom)?;
        if bytes.len() != 32 {
            return Err(D::Error::custom("VRF public key must be 32 bytes"));
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        VrfPublicKey::from_bytes(&arr).ok_or_else(|| D::Error::custom("invalid VRF public key"))
    }
}

fn challenge(
    pk: &[u8; 32],
    h: &EdwardsPoint,
    gamma: &EdwardsPoint,
    u: &EdwardsPoint,
    v: &EdwardsPoint,
) -> Scalar {
    let mut hasher = Sha512::new();
    hasher.update(DOMAIN_CHALLENGE);
    hasher.update(ED25519_BASEPOINT_POINT.compress().as_bytes());
    hasher.update(h.compress().as_bytes());
    hasher.update(pk);
    hasher.update(gamma.compress().as_bytes());
    hasher.update(u.compress().as_bytes());
    hasher.update(v.compress().as_bytes());
    Scalar::from_bytes_mod_order_wide(&hasher.finalize().into())
}

/// Deterministic map from arbitrary bytes to a curve point (Elligator2
/// over a SHA-512 digest).
fn hash_to_curve(data: &[u8]) -> EdwardsPoint {
    let mut hasher = Sha512::new();
    hasher.update(DOMAIN_HASH_TO_CURVE);
    hasher.update(data);
    EdwardsPoint::nonspec_map_to_curve::<Sha512>(&hasher.finalize())
}

fn output_from_gamma(gamma: &EdwardsPoint) -> [u8; 64] {
    let mut hasher = Sha512::new();
    hasher.update(DOMAIN_OUTPUT);
    hasher.update(gamma.compress().as_bytes());
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_key(tag: u8) -> VrfSecretKey {
        let mut seed = [0u8; 32];
        seed[0] = tag;
        VrfSecretKey::from_seed(&seed)
    }

    #[test]
    fn test_prove_verify_roundtrip() {
        let sk = seeded_key(1);
        let input = b"round seed";

        let (output, proof) = sk.prove(input);
        let verified = sk.public_key().verify(input, &proof);
        assert_eq!(verified, Some(output));
    }

    #[test]
    fn test_verify_rejects_wrong_input() {
        let sk = seeded_key(2);
        let (_, proof) = sk.prove(b"input a");
        assert!(sk.public_key().verify(b"input b", &proof).is_none());
    }

    #[test]
    fn test_verify_rejects_wrong_key() {
        let sk = seeded_key(3);
        let other = seeded_key(4);
        let (_, proof) = sk.prove(b"input");
        assert!(other.public_key().verify(b"input", &proof).is_none());
    }

    #[test]
    fn test_verify_rejects_garbage_proof() {
        let sk = seeded_key(5);
        let mut proof = VrfProof::default();
        proof.gamma = [0xAB; 32];
        assert!(sk.public_key().verify(b"input", &proof).is_none());
    }

    #[test]
    fn test_proof_is_deterministic() {
        let sk = seeded_key(6);
        let (o1, p1) = sk.prove(b"same input");
        let (o2, p2) = sk.prove(b"same input");
        assert_eq!(o1, o2);
        assert_eq!(p1, p2);
    }

    #[test]
    fn test_proof_wire_roundtrip() {
        let sk = seeded_key(7);
        let (_, proof) = sk.prove(b"wire");
        let decoded = VrfProof::from_bytes(&proof.to_bytes()).unwrap();
        assert_eq!(proof, decoded);
        assert!(VrfProof::from_bytes(&[0u8; 95]).is_none());
    }

    #[test]
    fn test_public_key_encoding_roundtrip() {
        let sk = seeded_key(8);
        let pk = sk.public_key();
        let decoded = VrfPublicKey::from_bytes(&pk.to_bytes()).unwrap();
        assert_eq!(*pk, decoded);
    }
}
