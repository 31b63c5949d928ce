//! Handler plumbing shared by the court and OCP route families.

pub mod court;
pub mod internal;
pub mod ocp;

use std::future::Future;
use std::net::SocketAddr;

use axum::body::Bytes;
use axum::extract::OriginalUri;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;

use cawt_core::error::CourtError;
use cawt_core::types::AgentId;
use cawt_crypto::hash::sha256_hex;
use cawt_crypto::signing::SignatureScheme;
use cawt_gateway::{with_idempotency, RequestAuth};

use crate::error::ApiError;
use crate::server::AppState;

pub async fn healthz() -> Json<Value> {
    Json(serde_json::json!({ "ok": true }))
}

fn header<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Pull the signing material out of the request headers. A missing or
/// malformed set is a signature failure, not a validation error.
fn request_auth(headers: &HeaderMap) -> Result<RequestAuth, CourtError> {
    let agent_id = header(headers, "X-OCP-Agent-Id").ok_or(CourtError::SignatureInvalid)?;
    let timestamp = header(headers, "X-OCP-Timestamp")
        .and_then(|t| t.parse::<i64>().ok())
        .ok_or(CourtError::SignatureInvalid)?;
    let nonce = header(headers, "X-OCP-Nonce").unwrap_or_default();
    let body_sha256 = header(headers, "X-OCP-Body-Sha256").ok_or(CourtError::SignatureInvalid)?;
    let signature = header(headers, "X-OCP-Signature").ok_or(CourtError::SignatureInvalid)?;
    Ok(RequestAuth {
        agent_id: agent_id.to_string(),
        timestamp,
        nonce: nonce.to_string(),
        body_sha256: body_sha256.to_string(),
        signature: signature.to_string(),
        signature_version: header(headers, "X-OCP-Signature-Version").map(str::to_string),
    })
}

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, CourtError> {
    let raw: &[u8] = if body.is_empty() { b"{}" } else { body };
    serde_json::from_slice(raw).map_err(|e| CourtError::Validation(format!("invalid body: {e}")))
}

pub(crate) fn json_response(status: u16, body: String) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::OK);
    (
        status,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response()
}

/// The signed-mutation pipeline for one handler: authenticate, deduplicate
/// by idempotency key, run, persist the outcome.
pub(crate) async fn signed_call<T, F, Fut>(
    state: &AppState,
    scheme: SignatureScheme,
    method: &'static str,
    uri: &OriginalUri,
    headers: &HeaderMap,
    addr: SocketAddr,
    body: Bytes,
    handler: F,
) -> Result<Response, ApiError>
where
    T: DeserializeOwned,
    F: FnOnce(AgentId, T) -> Fut,
    Fut: Future<Output = Result<(u16, Value), CourtError>>,
{
    let now = chrono::Utc::now().timestamp();
    let path = uri.path().to_string();
    let auth = request_auth(headers)?;

    let agent = state
        .gateway
        .authenticate(scheme, method, &path, &auth, &body, addr.ip(), now)?;

    let request_hash = sha256_hex(&body);
    let parsed: T = parse_body(&body)?;
    let idempotency_key = header(headers, "Idempotency-Key").map(str::to_string);

    let handler_agent = agent.clone();
    let stored = with_idempotency(
        state.gateway.store(),
        &agent,
        method,
        &path,
        idempotency_key.as_deref(),
        &request_hash,
        now,
        move || async move {
            let (status, value) = handler(handler_agent, parsed).await?;
            Ok((status, value.to_string()))
        },
    )
    .await?;

    Ok(json_response(stored.status, stored.body))
}

/// Shared-secret guard for worker/system endpoints.
pub(crate) fn require_shared_key(
    headers: &HeaderMap,
    header_name: &str,
    expected: &str,
    error: CourtError,
) -> Result<(), ApiError> {
    let presented = header(headers, header_name)
        .or_else(|| header(headers, "Authorization").and_then(|v| v.strip_prefix("Bearer ")));
    if cawt_gateway::verify_shared_key(presented, expected) {
        Ok(())
    } else {
        Err(error.into())
    }
}

pub(crate) fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}
