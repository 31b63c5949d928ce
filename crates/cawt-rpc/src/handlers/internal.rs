//! Internal routes: the mint worker's callback and the operator surface.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::{Json, Response};
use serde_json::{json, Value};

use cawt_core::case::VoidReason;
use cawt_core::error::CourtError;
use cawt_core::seal::WorkerSealResult;
use cawt_core::types::{CaseId, JobId, ProposalId};
use cawt_session::{apply_seal_result, seal::reopen_seal_job};

use crate::error::ApiError;
use crate::server::AppState;
use crate::types::{CaseView, VoidCaseRequest};

use super::{json_response, now_ts, require_shared_key};

/// `POST /api/internal/seal-result` — worker token.
///
/// Replay-safe by contract: an identical terminal result returns success, a
/// divergent one conflicts.
pub async fn seal_result(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(result): Json<WorkerSealResult>,
) -> Result<Response, ApiError> {
    require_shared_key(
        &headers,
        "X-Worker-Token",
        &state.config.worker_token,
        CourtError::WorkerTokenInvalid,
    )?;
    let job = apply_seal_result(&state.store, &result, now_ts())?;
    Ok(json_response(
        200,
        json!({ "jobId": job.job_id.to_string(), "status": job.status }).to_string(),
    ))
}

/// `POST /api/internal/cases/:id/void` — system key.
pub async fn void_case(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Option<Json<VoidCaseRequest>>,
) -> Result<Json<Value>, ApiError> {
    require_shared_key(
        &headers,
        "X-System-Key",
        &state.config.system_key,
        CourtError::SystemKeyInvalid,
    )?;
    let detail = body
        .and_then(|b| b.0.detail)
        .unwrap_or_else(|| "voided by operator".into());
    let case = state
        .court
        .void_case(&CaseId(id), VoidReason::Manual, &detail, now_ts())?;
    Ok(Json(json!(CaseView::from(&case))))
}

/// `POST /api/internal/seal-jobs/:id/retry` — system key. Reopens a failed
/// job; the next engine tick re-dispatches it.
pub async fn retry_seal_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    require_shared_key(
        &headers,
        "X-System-Key",
        &state.config.system_key,
        CourtError::SystemKeyInvalid,
    )?;
    let job = reopen_seal_job(&state.store, &JobId(id), now_ts())?;
    Ok(Json(json!({ "jobId": job.job_id.to_string(), "status": job.status })))
}

/// `POST /api/internal/agreements/:id/cancel` — system key, pending only.
pub async fn cancel_agreement(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    require_shared_key(
        &headers,
        "X-System-Key",
        &state.config.system_key,
        CourtError::SystemKeyInvalid,
    )?;
    let agreement = state.ocp.cancel(&ProposalId(id), now_ts())?;
    Ok(Json(json!({
        "proposalId": agreement.proposal_id.to_string(),
        "status": agreement.status,
    })))
}

/// `POST /api/internal/agreements/:id/suspend` — system key, pending only.
pub async fn suspend_agreement(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    require_shared_key(
        &headers,
        "X-System-Key",
        &state.config.system_key,
        CourtError::SystemKeyInvalid,
    )?;
    let agreement = state.ocp.suspend(&ProposalId(id), now_ts())?;
    Ok(Json(json!({
        "proposalId": agreement.proposal_id.to_string(),
        "status": agreement.status,
    })))
}
