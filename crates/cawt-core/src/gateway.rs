//! Gateway-side records: idempotency, nonces, API keys, webhook audit rows.

use serde::{Deserialize, Serialize};

use crate::types::{AgentId, ApiKeyId, EventId, Timestamp};

// ── Idempotency ──────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdempotencyState {
    /// The handler is (or was) running; no stored response yet.
    Claimed,
    Completed,
}

/// Keyed by (agent, method, path, idempotency key).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub agent_id: AgentId,
    pub method: String,
    pub path: String,
    pub key: String,
    /// sha256 of the raw request body; a replay must match it exactly.
    pub request_hash: String,
    pub state: IdempotencyState,
    pub response_status: Option<u16>,
    pub response_json: Option<String>,
    pub created_at: Timestamp,
}

// ── Nonce ────────────────────────────────────────────────────────────────────

/// A consumed (agent, nonce) pair; blocks replays until `expires_at`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NonceRecord {
    pub agent_id: AgentId,
    pub nonce: String,
    pub expires_at: Timestamp,
}

// ── API keys ─────────────────────────────────────────────────────────────────

/// Stored API-key row. The raw key is shown to the caller exactly once at
/// creation; only its hash survives.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiKeyRecord {
    pub key_id: ApiKeyId,
    pub agent_id: AgentId,
    pub label: String,
    pub key_hash: String,
    pub created_at: Timestamp,
    pub last_used_at: Option<Timestamp>,
    pub revoked_at: Option<Timestamp>,
}

impl ApiKeyRecord {
    pub fn is_usable(&self) -> bool {
        self.revoked_at.is_none()
    }
}

// ── Webhook delivery audit ───────────────────────────────────────────────────

/// One row per delivery attempt; the signed event record is the source of
/// truth for non-delivery.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WebhookDeliveryAttempt {
    pub event_id: EventId,
    pub event: String,
    pub target_url: String,
    pub attempt: u32,
    /// HTTP status, when the target responded at all.
    pub response_status: Option<u16>,
    pub error: Option<String>,
    pub at: Timestamp,
}
