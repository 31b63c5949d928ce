use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unix timestamp (seconds, UTC).
pub type Timestamp = i64;

/// Render a unix timestamp as ISO-8601 UTC (`2026-03-01T12:00:00Z`).
///
/// Deadlines and audit fields are stored as unix seconds; the wire and every
/// canonical hash input use this rendering.
pub fn to_iso(ts: Timestamp) -> String {
    use chrono::{SecondsFormat, TimeZone, Utc};
    Utc.timestamp_opt(ts, 0)
        .single()
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| format!("invalid-timestamp({ts})"))
}

/// Parse an ISO-8601 UTC string back to unix seconds.
pub fn from_iso(s: &str) -> Option<Timestamp> {
    chrono::DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.timestamp())
}

fn random_suffix() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

// ── AgentId ──────────────────────────────────────────────────────────────────

/// Base-58 encoding of a 32-byte Ed25519 public key. The id *is* the key:
/// every signature an agent produces verifies against the decoded bytes.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(pub String);

impl AgentId {
    /// Validate and wrap a base-58 string; the decoded key must be 32 bytes.
    pub fn parse(s: &str) -> Result<Self, crate::error::CourtError> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|_| crate::error::CourtError::InvalidAgentId(s.to_string()))?;
        if bytes.len() != 32 {
            return Err(crate::error::CourtError::InvalidAgentId(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    /// Decode the id back to the raw public-key bytes.
    pub fn to_public_key_bytes(&self) -> Result<[u8; 32], crate::error::CourtError> {
        let bytes = bs58::decode(&self.0)
            .into_vec()
            .map_err(|_| crate::error::CourtError::InvalidAgentId(self.0.clone()))?;
        let mut arr = [0u8; 32];
        if bytes.len() != 32 {
            return Err(crate::error::CourtError::InvalidAgentId(self.0.clone()));
        }
        arr.copy_from_slice(&bytes);
        Ok(arr)
    }

    pub fn from_public_key_bytes(pk: &[u8; 32]) -> Self {
        Self(bs58::encode(pk).into_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let head = self.0.get(..8).unwrap_or(&self.0);
        write!(f, "AgentId({head}…)")
    }
}

// ── Opaque entity ids ────────────────────────────────────────────────────────

macro_rules! opaque_id {
    ($(#[$doc:meta])* $name:ident, $prefix:literal) => {
        $(#[$doc])*
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            /// Mint a fresh random id (`{prefix}_{32 hex chars}`).
            pub fn generate() -> Self {
                Self(format!(concat!($prefix, "_{}"), random_suffix()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

opaque_id!(
    /// Case identifier.
    CaseId,
    "case"
);
opaque_id!(
    /// Claim identifier (one allegation within a case).
    ClaimId,
    "claim"
);
opaque_id!(
    /// Evidence record identifier.
    EvidenceId,
    "evd"
);
opaque_id!(
    /// Submission identifier (one per case/side/phase).
    SubmissionId,
    "sub"
);
opaque_id!(
    /// OCP agreement proposal identifier.
    ProposalId,
    "prop"
);
opaque_id!(
    /// OCP multisig decision identifier.
    DecisionId,
    "dec"
);
opaque_id!(
    /// Seal job identifier.
    JobId,
    "job"
);
opaque_id!(
    /// Webhook event identifier.
    EventId,
    "evt"
);
opaque_id!(
    /// API key identifier (public handle; never the secret).
    ApiKeyId,
    "key"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_id_roundtrip() {
        let pk = [7u8; 32];
        let id = AgentId::from_public_key_bytes(&pk);
        assert_eq!(id.to_public_key_bytes().unwrap(), pk);
        assert!(AgentId::parse(id.as_str()).is_ok());
    }

    #[test]
    fn agent_id_rejects_short_keys() {
        let short = bs58::encode([1u8; 16]).into_string();
        assert!(AgentId::parse(&short).is_err());
    }

    #[test]
    fn generated_ids_carry_prefix_and_differ() {
        let a = CaseId::generate();
        let b = CaseId::generate();
        assert!(a.as_str().starts_with("case_"));
        assert_ne!(a, b);
    }

    #[test]
    fn iso_rendering_is_utc_seconds() {
        assert_eq!(to_iso(0), "1970-01-01T00:00:00Z");
        assert_eq!(from_iso("1970-01-01T00:00:00Z"), Some(0));
    }
}
