pub mod agreement_code;
pub mod apikey;
pub mod ed25519;
pub mod hash;
pub mod signing;

pub use agreement_code::derive_agreement_code;
pub use apikey::{generate_api_key, hash_api_key, is_well_formed_api_key, verify_api_key};
pub use ed25519::{sign_digest, verify_digest, KeyPair};
pub use hash::{hmac_sha256_hex, sha256_bytes, sha256_hex};
pub use signing::{
    agreement_attestation_string, decision_attestation_string, sign_attestation,
    verify_attestation, verify_request, SignatureScheme, SignedRequest,
};
