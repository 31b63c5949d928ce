use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;

use cawt_core::error::CourtError;
use cawt_core::types::AgentId;

/// An OpenCawt keypair: Ed25519 signing key with derived AgentId.
///
/// The signing key zeroizes its secret scalar on drop (dalek `zeroize`
/// feature). Production services never hold agent keys; this type exists for
/// the CLI, the stub collaborators, and tests.
pub struct KeyPair {
    pub agent_id: AgentId,
    signing_key: SigningKey,
}

impl KeyPair {
    /// Generate a fresh Ed25519 keypair.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        let agent_id = AgentId::from_public_key_bytes(signing_key.verifying_key().as_bytes());
        Self {
            agent_id,
            signing_key,
        }
    }

    /// Restore a keypair from the 32 secret seed bytes.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(&seed);
        let agent_id = AgentId::from_public_key_bytes(signing_key.verifying_key().as_bytes());
        Self {
            agent_id,
            signing_key,
        }
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Sign a 32-byte digest; returns the 64 raw signature bytes.
    pub fn sign(&self, digest: &[u8]) -> [u8; 64] {
        self.signing_key.sign(digest).to_bytes()
    }

    /// Sign a digest and return the wire (base64) form.
    pub fn sign_b64(&self, digest: &[u8]) -> String {
        BASE64.encode(self.sign(digest))
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeyPair {{ agent_id: {:?} }}", self.agent_id)
    }
}

/// Sign `digest` with a raw signing key seed. Helper for test fixtures.
pub fn sign_digest(seed: &[u8; 32], digest: &[u8]) -> [u8; 64] {
    SigningKey::from_bytes(seed).sign(digest).to_bytes()
}

/// Verify a base64 Ed25519 signature over `digest` against the agent's
/// public key (the base58-decoded agent id). Any decoding or cryptographic
/// failure collapses to `SIGNATURE_INVALID`.
pub fn verify_digest(agent_id: &AgentId, digest: &[u8], sig_b64: &str) -> Result<(), CourtError> {
    let pk_bytes = agent_id
        .to_public_key_bytes()
        .map_err(|_| CourtError::SignatureInvalid)?;
    let key = VerifyingKey::from_bytes(&pk_bytes).map_err(|_| CourtError::SignatureInvalid)?;

    let sig_bytes = BASE64
        .decode(sig_b64)
        .map_err(|_| CourtError::SignatureInvalid)?;
    let sig_arr: [u8; 64] = sig_bytes
        .try_into()
        .map_err(|_| CourtError::SignatureInvalid)?;
    let signature = Signature::from_bytes(&sig_arr);

    key.verify(digest, &signature)
        .map_err(|_| CourtError::SignatureInvalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::sha256_bytes;

    #[test]
    fn sign_verify_round_trip() {
        let kp = KeyPair::generate();
        let digest = sha256_bytes(b"an adversarial allegation");
        let sig = kp.sign_b64(&digest);
        assert!(verify_digest(&kp.agent_id, &digest, &sig).is_ok());
    }

    #[test]
    fn tampered_digest_fails() {
        let kp = KeyPair::generate();
        let sig = kp.sign_b64(&sha256_bytes(b"original"));
        let err = verify_digest(&kp.agent_id, &sha256_bytes(b"tampered"), &sig);
        assert!(matches!(err, Err(CourtError::SignatureInvalid)));
    }

    #[test]
    fn wrong_key_fails() {
        let kp = KeyPair::generate();
        let other = KeyPair::generate();
        let digest = sha256_bytes(b"payload");
        let sig = kp.sign_b64(&digest);
        assert!(verify_digest(&other.agent_id, &digest, &sig).is_err());
    }

    #[test]
    fn seed_restores_same_identity() {
        let seed = [9u8; 32];
        let a = KeyPair::from_seed(seed);
        let b = KeyPair::from_seed(seed);
        assert_eq!(a.agent_id, b.agent_id);
        let digest = sha256_bytes(b"deterministic");
        assert_eq!(a.sign(&digest).to_vec(), b.sign(&digest).to_vec());
    }

    #[test]
    fn garbage_signature_material_is_rejected() {
        let kp = KeyPair::generate();
        let digest = sha256_bytes(b"x");
        assert!(verify_digest(&kp.agent_id, &digest, "not-base64!!!").is_err());
        assert!(verify_digest(&kp.agent_id, &digest, "QUJD").is_err()); // 3 bytes, not 64
    }
}
