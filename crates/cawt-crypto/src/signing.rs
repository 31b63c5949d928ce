//! Request and attestation signing strings.
//!
//! Two request schemes exist behind one verifier factory. The v1 string is
//! `OCPv1|{method}|{path}|{unix_ts}|{nonce}|{sha256_hex(body)}`; the legacy
//! string is `OpenCawtReqV1|{method}|{path}||{ts}|{payloadHash}` (note the
//! doubled separator — it is part of the wire format, not a typo). In both
//! cases the Ed25519 signature covers the SHA-256 digest of the string.

use cawt_core::constants::{
    AGREEMENT_ATTESTATION_PREFIX, DECISION_ATTESTATION_PREFIX, SIGNING_PREFIX_LEGACY,
    SIGNING_PREFIX_V1,
};
use cawt_core::error::CourtError;
use cawt_core::types::AgentId;

use crate::ed25519::{verify_digest, KeyPair};
use crate::hash::sha256_bytes;

// ── Scheme ───────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignatureScheme {
    V1,
    Legacy,
}

impl SignatureScheme {
    /// Build the canonical signing string for one authenticated request.
    pub fn signing_string(
        &self,
        method: &str,
        path: &str,
        timestamp: i64,
        nonce: &str,
        body_hash_hex: &str,
    ) -> String {
        match self {
            SignatureScheme::V1 => format!(
                "{SIGNING_PREFIX_V1}|{method}|{path}|{timestamp}|{nonce}|{body_hash_hex}"
            ),
            // Legacy requests carry no nonce in the string.
            SignatureScheme::Legacy => {
                format!("{SIGNING_PREFIX_LEGACY}|{method}|{path}||{timestamp}|{body_hash_hex}")
            }
        }
    }
}

// ── Request verification ─────────────────────────────────────────────────────

/// The authenticated parts of one mutation request.
pub struct SignedRequest<'a> {
    pub scheme: SignatureScheme,
    pub agent_id: &'a AgentId,
    pub method: &'a str,
    pub path: &'a str,
    pub timestamp: i64,
    pub nonce: &'a str,
    pub body_hash_hex: &'a str,
    pub signature_b64: &'a str,
}

/// Verify the request signature. The caller has already checked the timestamp
/// window and the body hash; this is purely the cryptographic step.
pub fn verify_request(req: &SignedRequest<'_>) -> Result<(), CourtError> {
    let signing_string = req.scheme.signing_string(
        req.method,
        req.path,
        req.timestamp,
        req.nonce,
        req.body_hash_hex,
    );
    let digest = sha256_bytes(signing_string.as_bytes());
    verify_digest(req.agent_id, &digest, req.signature_b64)
}

// ── Attestations ─────────────────────────────────────────────────────────────

/// The string both parties co-sign to seal an agreement:
/// `OPENCAWT_AGREEMENT_V1|{proposalId}|{termsHash}|{agreementCode}|{partyA}|{partyB}|{expiresAtIso}`.
pub fn agreement_attestation_string(
    proposal_id: &str,
    terms_hash: &str,
    agreement_code: &str,
    party_a: &AgentId,
    party_b: &AgentId,
    expires_at_iso: &str,
) -> String {
    format!(
        "{AGREEMENT_ATTESTATION_PREFIX}|{proposal_id}|{terms_hash}|{agreement_code}|{party_a}|{party_b}|{expires_at_iso}"
    )
}

/// Decision signers co-sign `OPENCAWT_DECISION_V1|{payloadHash}`.
pub fn decision_attestation_string(payload_hash: &str) -> String {
    format!("{DECISION_ATTESTATION_PREFIX}|{payload_hash}")
}

/// Sign an attestation string (SHA-256 digest, base64 wire form).
pub fn sign_attestation(keypair: &KeyPair, attestation: &str) -> String {
    keypair.sign_b64(&sha256_bytes(attestation.as_bytes()))
}

/// Verify a party's base64 signature over an attestation string.
pub fn verify_attestation(
    agent_id: &AgentId,
    attestation: &str,
    sig_b64: &str,
) -> Result<(), CourtError> {
    verify_digest(agent_id, &sha256_bytes(attestation.as_bytes()), sig_b64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::sha256_hex;

    #[test]
    fn v1_signing_string_layout() {
        let s = SignatureScheme::V1.signing_string(
            "POST",
            "/v1/agreements/propose",
            1_700_000_000,
            "nonce-1234",
            "aa".repeat(32).as_str(),
        );
        assert_eq!(
            s,
            format!(
                "OCPv1|POST|/v1/agreements/propose|1700000000|nonce-1234|{}",
                "aa".repeat(32)
            )
        );
    }

    #[test]
    fn legacy_signing_string_has_empty_field() {
        let s = SignatureScheme::Legacy.signing_string("POST", "/legacy/file", 42, "ignored", "ph");
        assert_eq!(s, "OpenCawtReqV1|POST|/legacy/file||42|ph");
    }

    #[test]
    fn signing_string_is_deterministic() {
        let a = SignatureScheme::V1.signing_string("POST", "/p", 1, "n", "h");
        let b = SignatureScheme::V1.signing_string("POST", "/p", 1, "n", "h");
        assert_eq!(a, b);
    }

    #[test]
    fn request_round_trip_both_schemes() {
        let kp = KeyPair::generate();
        let body_hash = sha256_hex(b"{\"k\":1}");
        for scheme in [SignatureScheme::V1, SignatureScheme::Legacy] {
            let signing = scheme.signing_string("POST", "/api/cases/draft", 100, "n0nce_ab", &body_hash);
            let sig = kp.sign_b64(&sha256_bytes(signing.as_bytes()));
            let req = SignedRequest {
                scheme,
                agent_id: &kp.agent_id,
                method: "POST",
                path: "/api/cases/draft",
                timestamp: 100,
                nonce: "n0nce_ab",
                body_hash_hex: &body_hash,
                signature_b64: &sig,
            };
            assert!(verify_request(&req).is_ok());
        }
    }

    #[test]
    fn path_is_bound_into_the_signature() {
        let kp = KeyPair::generate();
        let signing = SignatureScheme::V1.signing_string("POST", "/v1/agents/register", 5, "n", "h");
        let sig = kp.sign_b64(&sha256_bytes(signing.as_bytes()));
        let req = SignedRequest {
            scheme: SignatureScheme::V1,
            agent_id: &kp.agent_id,
            method: "POST",
            path: "/v1/agents/update", // different path
            timestamp: 5,
            nonce: "n",
            body_hash_hex: "h",
            signature_b64: &sig,
        };
        assert!(verify_request(&req).is_err());
    }

    #[test]
    fn attestation_round_trip() {
        let kp = KeyPair::generate();
        let other = KeyPair::generate();
        let att = agreement_attestation_string(
            "prop_1",
            "th",
            "CODE123456",
            &kp.agent_id,
            &other.agent_id,
            "2026-06-01T00:00:00Z",
        );
        let sig = sign_attestation(&kp, &att);
        assert!(verify_attestation(&kp.agent_id, &att, &sig).is_ok());
        assert!(verify_attestation(&other.agent_id, &att, &sig).is_err());
    }
}
