//! Idempotency wrapper around mutation handlers.

use std::future::Future;
use std::sync::Arc;

use cawt_core::constants::{IDEMPOTENCY_KEY_MAX_LEN, IDEMPOTENCY_TTL_SECS};
use cawt_core::error::CourtError;
use cawt_core::types::{AgentId, Timestamp};
use cawt_store::Store;

/// The (status, body) pair a handler produced or a replay returns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredResponse {
    pub status: u16,
    pub body: String,
    /// True when this response was served from the idempotency record.
    pub replayed: bool,
}

/// Run `handler` under an optional idempotency key.
///
/// With a key: the tuple is claimed before the handler runs; a completed
/// record with the same request hash short-circuits to the stored response;
/// a differing hash is a conflict; a handler error releases the claim so a
/// genuine retry can proceed.
pub async fn with_idempotency<F, Fut>(
    store: &Arc<Store>,
    agent: &AgentId,
    method: &str,
    path: &str,
    key: Option<&str>,
    request_hash: &str,
    now: Timestamp,
    handler: F,
) -> Result<StoredResponse, CourtError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<(u16, String), CourtError>>,
{
    let Some(key) = key else {
        let (status, body) = handler().await?;
        return Ok(StoredResponse {
            status,
            body,
            replayed: false,
        });
    };

    if key.is_empty() || key.len() > IDEMPOTENCY_KEY_MAX_LEN {
        return Err(CourtError::Validation(format!(
            "idempotency key must be 1–{IDEMPOTENCY_KEY_MAX_LEN} characters"
        )));
    }

    if let Some(stored) = store.claim_idempotency(
        agent,
        method,
        path,
        key,
        request_hash,
        now,
        IDEMPOTENCY_TTL_SECS,
    )? {
        return Ok(StoredResponse {
            status: stored.response_status.unwrap_or(200),
            body: stored.response_json.unwrap_or_default(),
            replayed: true,
        });
    }

    match handler().await {
        Ok((status, body)) => {
            store.complete_idempotency(agent, method, path, key, status, &body)?;
            Ok(StoredResponse {
                status,
                body,
                replayed: false,
            })
        }
        Err(e) => {
            // Best effort: the claim must not outlive the failure.
            if let Err(release_err) = store.release_idempotency(agent, method, path, key) {
                tracing::warn!(error = %release_err, "failed to release idempotency claim");
            }
            Err(e)
        }
    }
}
