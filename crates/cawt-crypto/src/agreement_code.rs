//! Agreement codes: the short human-pasteable handle for a sealed contract.
//!
//! Derivation: `sha256(AGREEMENT_CODE_DOMAIN + terms_hash_hex)`, take the
//! first 8 bytes as a big-endian u64, emit the top 50 bits as 10 Crockford
//! base-32 digits, most significant first. Crockford's alphabet drops I, L,
//! O, U so codes survive transcription.

use cawt_core::constants::{AGREEMENT_CODE_DOMAIN, AGREEMENT_CODE_LEN};

use crate::hash::sha256_bytes;

const CROCKFORD: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

/// Derive the 10-character agreement code for a terms hash.
pub fn derive_agreement_code(terms_hash_hex: &str) -> String {
    let mut input = Vec::with_capacity(AGREEMENT_CODE_DOMAIN.len() + terms_hash_hex.len());
    input.extend_from_slice(AGREEMENT_CODE_DOMAIN.as_bytes());
    input.extend_from_slice(terms_hash_hex.as_bytes());
    let digest = sha256_bytes(&input);

    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    let value = u64::from_be_bytes(prefix);

    let mut code = String::with_capacity(AGREEMENT_CODE_LEN);
    for i in 0..AGREEMENT_CODE_LEN {
        let digit = ((value >> (59 - 5 * i)) & 31) as usize;
        code.push(CROCKFORD[digit] as char);
    }
    code
}
