//! API-key material for read-friendly endpoints.
//!
//! A raw key is `ocp_` + 43 URL-safe characters (base64url of 32 random
//! bytes). Storage keeps only the SHA-256 of the full raw key; presentation
//! checks hash-compare in constant time so the lookup never leaks prefix
//! timing.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::RngCore;

use cawt_core::constants::{API_KEY_PREFIX, API_KEY_SECRET_MAX_LEN, API_KEY_SECRET_MIN_LEN};

use crate::hash::{ct_eq, sha256_hex};

/// Generate a fresh raw API key. Returned exactly once; only its hash is
/// ever persisted.
pub fn generate_api_key() -> String {
    let mut secret = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut secret);
    format!("{API_KEY_PREFIX}{}", URL_SAFE_NO_PAD.encode(secret))
}

/// Storage form: sha256 hex of the full raw key.
pub fn hash_api_key(raw: &str) -> String {
    sha256_hex(raw.as_bytes())
}

/// Shape check before any lookup: fixed prefix + 31–59 URL-safe chars.
pub fn is_well_formed_api_key(raw: &str) -> bool {
    let Some(secret) = raw.strip_prefix(API_KEY_PREFIX) else {
        return false;
    };
    if secret.len() < API_KEY_SECRET_MIN_LEN || secret.len() > API_KEY_SECRET_MAX_LEN {
        return false;
    }
    secret
        .bytes()
        .all(|c| c.is_ascii_alphanumeric() || c == b'-' || c == b'_')
}

/// Compare a presented raw key against a stored hash, constant time.
pub fn verify_api_key(raw: &str, stored_hash_hex: &str) -> bool {
    if !is_well_formed_api_key(raw) {
        return false;
    }
    ct_eq(hash_api_key(raw).as_bytes(), stored_hash_hex.as_bytes())
}
