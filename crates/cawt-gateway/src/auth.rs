//! Signed-mutation authentication.
//!
//! The full gate, in order: failed-auth limiter → agent id decode →
//! timestamp window → nonce shape → body hash → Ed25519 signature → nonce
//! consumption. Signature failures (including undecodable agent ids and
//! malformed signature material) feed the limiter; the other rejections do
//! not, so a clock-skewed but honest caller cannot lock itself out.

use std::net::IpAddr;
use std::sync::Arc;

use tracing::debug;

use cawt_core::constants::{
    AUTH_TIMESTAMP_WINDOW_SECS, NONCE_MAX_LEN, NONCE_MIN_LEN, NONCE_TTL_SECS,
};
use cawt_core::error::CourtError;
use cawt_core::types::{AgentId, Timestamp};
use cawt_crypto::hash::{ct_eq, sha256_hex};
use cawt_crypto::signing::{verify_request, SignatureScheme, SignedRequest};
use cawt_store::Store;

use crate::limiter::FailedAuthLimiter;

/// The auth material extracted from request headers by the HTTP layer.
#[derive(Clone, Debug)]
pub struct RequestAuth {
    pub agent_id: String,
    pub timestamp: i64,
    pub nonce: String,
    pub body_sha256: String,
    pub signature: String,
    /// `X-OCP-Signature-Version`; only `v1` is accepted when present.
    pub signature_version: Option<String>,
}

pub struct Gateway {
    store: Arc<Store>,
    pub limiter: FailedAuthLimiter,
}

impl Gateway {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            limiter: FailedAuthLimiter::new(),
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Authenticate one mutation request; returns the verified agent id.
    pub fn authenticate(
        &self,
        scheme: SignatureScheme,
        method: &str,
        path: &str,
        auth: &RequestAuth,
        body: &[u8],
        ip: IpAddr,
        now: Timestamp,
    ) -> Result<AgentId, CourtError> {
        if self.limiter.is_limited(ip, now) {
            return Err(CourtError::RateLimited);
        }

        if let Some(version) = &auth.signature_version {
            if version != "v1" {
                return Err(CourtError::Validation(format!(
                    "unsupported signature version: {version}"
                )));
            }
        }

        let agent_id = match AgentId::parse(&auth.agent_id) {
            Ok(id) => id,
            Err(_) => {
                self.limiter.record_failure(ip, now);
                return Err(CourtError::SignatureInvalid);
            }
        };

        if (now - auth.timestamp).abs() > AUTH_TIMESTAMP_WINDOW_SECS {
            return Err(CourtError::TimestampExpired);
        }

        // Legacy requests carry no nonce; replay resistance there rests on
        // the timestamp window alone.
        let uses_nonce = scheme == SignatureScheme::V1 || !auth.nonce.is_empty();
        if uses_nonce {
            validate_nonce_shape(&auth.nonce)?;
        }

        let actual_body_hash = sha256_hex(body);
        if !ct_eq(actual_body_hash.as_bytes(), auth.body_sha256.as_bytes()) {
            return Err(CourtError::BodyHashMismatch);
        }

        let request = SignedRequest {
            scheme,
            agent_id: &agent_id,
            method,
            path,
            timestamp: auth.timestamp,
            nonce: &auth.nonce,
            body_hash_hex: &actual_body_hash,
            signature_b64: &auth.signature,
        };
        if let Err(e) = verify_request(&request) {
            self.limiter.record_failure(ip, now);
            debug!(agent = %agent_id, path, "signature rejected");
            return Err(e);
        }

        // Last: a replayed-but-valid signature burns here.
        if uses_nonce {
            self.store
                .consume_nonce(&agent_id, &auth.nonce, now, NONCE_TTL_SECS)?;
        }

        Ok(agent_id)
    }
}

fn validate_nonce_shape(nonce: &str) -> Result<(), CourtError> {
    if nonce.len() < NONCE_MIN_LEN || nonce.len() > NONCE_MAX_LEN {
        return Err(CourtError::Validation(format!(
            "nonce length must be {NONCE_MIN_LEN}–{NONCE_MAX_LEN}"
        )));
    }
    if !nonce
        .bytes()
        .all(|c| c.is_ascii_alphanumeric() || c == b'_' || c == b'-')
    {
        return Err(CourtError::Validation("nonce has invalid characters".into()));
    }
    Ok(())
}

/// Constant-time check of a shared secret (worker token / system key).
pub fn verify_shared_key(presented: Option<&str>, expected: &str) -> bool {
    match presented {
        Some(p) => ct_eq(p.as_bytes(), expected.as_bytes()),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cawt_crypto::ed25519::KeyPair;
    use cawt_crypto::hash::sha256_bytes;

    fn temp_store() -> Arc<Store> {
        use rand::RngCore;
        let mut tag = [0u8; 8];
        rand::thread_rng().fill_bytes(&mut tag);
        let path = std::env::temp_dir().join(format!(
            "cawt_gateway_test_{}_{:02x?}",
            std::process::id(),
            tag
        ));
        Arc::new(Store::open(path).expect("open temp store"))
    }

    fn ip() -> IpAddr {
        IpAddr::from([198, 51, 100, 7])
    }

    fn signed(kp: &KeyPair, method: &str, path: &str, ts: i64, nonce: &str, body: &[u8]) -> RequestAuth {
        let body_hash = sha256_hex(body);
        let signing = SignatureScheme::V1.signing_string(method, path, ts, nonce, &body_hash);
        RequestAuth {
            agent_id: kp.agent_id.to_string(),
            timestamp: ts,
            nonce: nonce.to_string(),
            body_sha256: body_hash,
            signature: kp.sign_b64(&sha256_bytes(signing.as_bytes())),
            signature_version: Some("v1".into()),
        }
    }

    #[test]
    fn happy_path_authenticates() {
        let gateway = Gateway::new(temp_store());
        let kp = KeyPair::generate();
        let body = br#"{"topic":"breach"}"#;
        let auth = signed(&kp, "POST", "/api/cases/draft", 1_000, "nonce-0001", body);
        let id = gateway
            .authenticate(SignatureScheme::V1, "POST", "/api/cases/draft", &auth, body, ip(), 1_010)
            .unwrap();
        assert_eq!(id, kp.agent_id);
    }

    #[test]
    fn stale_timestamp_rejected() {
        let gateway = Gateway::new(temp_store());
        let kp = KeyPair::generate();
        let body = b"{}";
        let auth = signed(&kp, "POST", "/p", 1_000, "nonce-0001", body);
        let err = gateway
            .authenticate(SignatureScheme::V1, "POST", "/p", &auth, body, ip(), 1_000 + 301)
            .unwrap_err();
        assert!(matches!(err, CourtError::TimestampExpired));
    }

    #[test]
    fn body_hash_mismatch_rejected() {
        let gateway = Gateway::new(temp_store());
        let kp = KeyPair::generate();
        let auth = signed(&kp, "POST", "/p", 1_000, "nonce-0001", b"{\"a\":1}");
        let err = gateway
            .authenticate(SignatureScheme::V1, "POST", "/p", &auth, b"{\"a\":2}", ip(), 1_001)
            .unwrap_err();
        assert!(matches!(err, CourtError::BodyHashMismatch));
    }

    #[test]
    fn nonce_replay_rejected_within_window() {
        let gateway = Gateway::new(temp_store());
        let kp = KeyPair::generate();
        let body = b"{}";
        let auth = signed(&kp, "POST", "/p", 1_000, "nonce-0001", body);
        gateway
            .authenticate(SignatureScheme::V1, "POST", "/p", &auth, body, ip(), 1_001)
            .unwrap();

        // Same nonce, fresh signature inside the window: replay.
        let again = signed(&kp, "POST", "/p", 1_050, "nonce-0001", body);
        let err = gateway
            .authenticate(SignatureScheme::V1, "POST", "/p", &again, body, ip(), 1_051)
            .unwrap_err();
        assert!(matches!(err, CourtError::NonceReused));

        // After the window elapses the nonce is usable again.
        let later = signed(&kp, "POST", "/p", 1_400, "nonce-0001", body);
        gateway
            .authenticate(SignatureScheme::V1, "POST", "/p", &later, body, ip(), 1_401)
            .unwrap();
    }

    #[test]
    fn repeated_bad_signatures_trip_the_limiter() {
        let gateway = Gateway::new(temp_store());
        let kp = KeyPair::generate();
        let body = b"{}";
        let mut auth = signed(&kp, "POST", "/p", 1_000, "nonce-0001", body);
        auth.signature = "AAAA".into(); // malformed

        for _ in 0..cawt_core::constants::FAILED_AUTH_MAX_PER_WINDOW {
            let err = gateway
                .authenticate(SignatureScheme::V1, "POST", "/p", &auth, body, ip(), 1_001)
                .unwrap_err();
            assert!(matches!(err, CourtError::SignatureInvalid));
        }
        let err = gateway
            .authenticate(SignatureScheme::V1, "POST", "/p", &auth, body, ip(), 1_001)
            .unwrap_err();
        assert!(matches!(err, CourtError::RateLimited));
    }

    #[test]
    fn bad_nonce_shape_rejected() {
        let gateway = Gateway::new(temp_store());
        let kp = KeyPair::generate();
        let body = b"{}";
        let auth = signed(&kp, "POST", "/p", 1_000, "bad nonce!", body);
        let err = gateway
            .authenticate(SignatureScheme::V1, "POST", "/p", &auth, body, ip(), 1_001)
            .unwrap_err();
        assert!(matches!(err, CourtError::Validation(_)));
    }

    #[test]
    fn shared_key_check() {
        assert!(verify_shared_key(Some("wk-secret"), "wk-secret"));
        assert!(!verify_shared_key(Some("wk-guess"), "wk-secret"));
        assert!(!verify_shared_key(None, "wk-secret"));
    }
}
