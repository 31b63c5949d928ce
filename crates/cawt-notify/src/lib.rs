//! Signed webhook dispatcher.
//!
//! Deliveries are fire-and-forget from the caller's perspective: the signed
//! event record is the source of truth and non-delivery never propagates to
//! the originating request. Each attempt is HMAC-signed over the canonical
//! body and logged; retries back off exponentially up to a 30-second step.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, warn};

use cawt_core::agent::validate_notify_url;
use cawt_core::canonical::canonical_json;
use cawt_core::constants::{
    WEBHOOK_BACKOFF_BASE_SECS, WEBHOOK_BACKOFF_CAP_SECS, WEBHOOK_MAX_ATTEMPTS,
    WEBHOOK_TIMEOUT_SECS,
};
use cawt_core::gateway::WebhookDeliveryAttempt;
use cawt_core::types::{to_iso, AgentId, EventId, Timestamp};
use cawt_crypto::hash::hmac_sha256_hex;
use cawt_store::Store;

/// One outbound notification before canonicalisation.
#[derive(Clone, Debug)]
pub struct WebhookEvent {
    pub event: String,
    pub agent_id: AgentId,
    pub proposal_id: Option<String>,
    pub agreement_code: Option<String>,
    pub body: Value,
}

pub struct WebhookDispatcher {
    client: reqwest::Client,
    secret: Vec<u8>,
    store: Arc<Store>,
}

impl WebhookDispatcher {
    pub fn new(secret: impl Into<Vec<u8>>, store: Arc<Store>) -> Arc<Self> {
        Arc::new(Self {
            client: reqwest::Client::new(),
            secret: secret.into(),
            store,
        })
    }

    /// Canonical body + HMAC signature for one event instance.
    pub fn sign_event(
        &self,
        event: &WebhookEvent,
        event_id: &EventId,
        sent_at: Timestamp,
    ) -> (String, String) {
        let value = json!({
            "event": event.event,
            "eventId": event_id.as_str(),
            "sentAtIso": to_iso(sent_at),
            "agentId": event.agent_id.as_str(),
            "proposalId": event.proposal_id,
            "agreementCode": event.agreement_code,
            "body": event.body,
        });
        let body = canonical_json(&value);
        let signature = hmac_sha256_hex(&self.secret, body.as_bytes());
        (body, signature)
    }

    /// Queue a delivery. Invalid targets are dropped (and logged) rather
    /// than erroring; the caller's request must never depend on this.
    pub fn dispatch(self: &Arc<Self>, target_url: &str, event: WebhookEvent, now: Timestamp) {
        if validate_notify_url(target_url).is_err() {
            warn!(url = %target_url, event = %event.event, "webhook target rejected by filter");
            return;
        }
        let dispatcher = Arc::clone(self);
        let target = target_url.to_string();
        tokio::spawn(async move {
            dispatcher.deliver(&target, event, now).await;
        });
    }

    async fn deliver(&self, target_url: &str, event: WebhookEvent, now: Timestamp) {
        let event_id = EventId::generate();
        let (body, signature) = self.sign_event(&event, &event_id, now);

        let mut delay = Duration::from_secs(WEBHOOK_BACKOFF_BASE_SECS);
        for attempt in 1..=WEBHOOK_MAX_ATTEMPTS {
            let result = self
                .client
                .post(target_url)
                .header("Content-Type", "application/json")
                .header("X-OCP-Signature", &signature)
                .body(body.clone())
                .timeout(Duration::from_secs(WEBHOOK_TIMEOUT_SECS))
                .send()
                .await;

            let (status, error, delivered) = match result {
                Ok(response) => {
                    let status = response.status().as_u16();
                    (Some(status), None, response.status().is_success())
                }
                Err(e) => (None, Some(e.to_string()), false),
            };

            let log = self.store.log_webhook_attempt(&WebhookDeliveryAttempt {
                event_id: event_id.clone(),
                event: event.event.clone(),
                target_url: target_url.to_string(),
                attempt,
                response_status: status,
                error: error.clone(),
                at: now,
            });
            if let Err(e) = log {
                warn!(error = %e, "failed to log webhook attempt");
            }

            if delivered {
                debug!(event = %event.event, url = %target_url, attempt, "webhook delivered");
                return;
            }

            if attempt < WEBHOOK_MAX_ATTEMPTS {
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(Duration::from_secs(WEBHOOK_BACKOFF_CAP_SECS));
            }
        }
        warn!(event = %event.event, url = %target_url, "webhook delivery exhausted retries");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cawt_crypto::hash::hmac_sha256_hex;

    fn temp_store() -> Arc<Store> {
        let path = std::env::temp_dir().join(format!(
            "cawt_notify_test_{}_{}",
            std::process::id(),
            EventId::generate()
        ));
        Arc::new(Store::open(path).expect("open temp store"))
    }

    #[tokio::test]
    async fn canonical_body_and_signature_are_stable() {
        let dispatcher = WebhookDispatcher::new(b"secret".to_vec(), temp_store());
        let event = WebhookEvent {
            event: "agreement_proposed".into(),
            agent_id: AgentId("agentB".into()),
            proposal_id: Some("prop_1".into()),
            agreement_code: Some("PV4DBJZ9WQ".into()),
            body: json!({"z": 1, "a": 2}),
        };
        let event_id = EventId("evt_fixed".into());
        let (body_a, sig_a) = dispatcher.sign_event(&event, &event_id, 1_700_000_000);
        let (body_b, sig_b) = dispatcher.sign_event(&event, &event_id, 1_700_000_000);
        assert_eq!(body_a, body_b);
        assert_eq!(sig_a, sig_b);
        // Keys are sorted in the canonical body.
        assert!(body_a.starts_with("{\"agentId\""));
        assert_eq!(sig_a, hmac_sha256_hex(b"secret", body_a.as_bytes()));
    }

    #[tokio::test]
    async fn signature_depends_on_secret() {
        let store = temp_store();
        let a = WebhookDispatcher::new(b"one".to_vec(), Arc::clone(&store));
        let b = WebhookDispatcher::new(b"two".to_vec(), store);
        let event = WebhookEvent {
            event: "agreement_sealed".into(),
            agent_id: AgentId("agentA".into()),
            proposal_id: None,
            agreement_code: None,
            body: Value::Null,
        };
        let id = EventId("evt_x".into());
        assert_ne!(
            a.sign_event(&event, &id, 0).1,
            b.sign_event(&event, &id, 0).1
        );
    }

    #[tokio::test]
    async fn rejected_target_is_not_dispatched() {
        let dispatcher = WebhookDispatcher::new(b"s".to_vec(), temp_store());
        // Must not panic or spawn anything useful; simply drops.
        dispatcher.dispatch(
            "https://127.0.0.1/hook",
            WebhookEvent {
                event: "agreement_proposed".into(),
                agent_id: AgentId("agentB".into()),
                proposal_id: None,
                agreement_code: None,
                body: Value::Null,
            },
            0,
        );
    }
}
