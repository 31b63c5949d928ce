//! Court route handlers.

use std::net::SocketAddr;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, OriginalUri, Path, State};
use axum::http::HeaderMap;
use axum::response::{Json, Response};
use serde_json::{json, Value};

use cawt_core::types::{AgentId, CaseId, EvidenceId};
use cawt_crypto::signing::SignatureScheme;
use cawt_session::{BallotInput, DraftCaseInput, EvidenceInput, StageMessageInput};

use crate::error::ApiError;
use crate::server::AppState;
use crate::types::{
    BallotRequest, CaseView, DraftCaseRequest, EvidenceRequest, StageMessageRequest,
};

use super::{now_ts, signed_call};

pub async fn draft_case(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    uri: OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let court = state.court.clone();
    signed_call(
        &state,
        SignatureScheme::V1,
        "POST",
        &uri,
        &headers,
        addr,
        body,
        move |agent, request: DraftCaseRequest| async move {
            let defendant = request
                .defendant_agent_id
                .as_deref()
                .map(AgentId::parse)
                .transpose()?;
            let input = DraftCaseInput {
                mode: request.mode,
                topic: request.topic,
                stake_level: request.stake_level,
                requested_remedy: request.requested_remedy,
                claim_summary: request.claim_summary,
                claims: request
                    .claims
                    .into_iter()
                    .map(|c| (c.summary, c.requested_remedy, c.alleged_principles))
                    .collect(),
                defendant,
                open_defence: request.open_defence,
                scheduled_for: request.scheduled_for,
            };
            let case = court.draft_case(&agent, input, now_ts())?;
            Ok((201, json!(CaseView::from(&case))))
        },
    )
    .await
}

pub async fn file_case(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(id): Path<String>,
    uri: OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let court = state.court.clone();
    signed_call(
        &state,
        SignatureScheme::V1,
        "POST",
        &uri,
        &headers,
        addr,
        body,
        move |agent, _request: Value| async move {
            let case = court.file_case(&CaseId(id), &agent, now_ts())?;
            Ok((200, json!(CaseView::from(&case))))
        },
    )
    .await
}

pub async fn volunteer_defence(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(id): Path<String>,
    uri: OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let court = state.court.clone();
    signed_call(
        &state,
        SignatureScheme::V1,
        "POST",
        &uri,
        &headers,
        addr,
        body,
        move |agent, _request: Value| async move {
            let case = court.volunteer_defence(&CaseId(id), &agent, now_ts())?;
            Ok((200, json!(CaseView::from(&case))))
        },
    )
    .await
}

pub async fn submit_evidence(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(id): Path<String>,
    uri: OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let court = state.court.clone();
    signed_call(
        &state,
        SignatureScheme::V1,
        "POST",
        &uri,
        &headers,
        addr,
        body,
        move |agent, request: EvidenceRequest| async move {
            let evidence = court.submit_evidence(
                &CaseId(id),
                &agent,
                EvidenceInput {
                    kind: request.kind,
                    title: request.title,
                    body: request.body,
                    attachment_url: request.attachment_url,
                },
                now_ts(),
            )?;
            Ok((
                201,
                json!({
                    "evidenceId": evidence.evidence_id.to_string(),
                    "bodyHash": evidence.body_hash,
                }),
            ))
        },
    )
    .await
}

pub async fn stage_message(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(id): Path<String>,
    uri: OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let court = state.court.clone();
    signed_call(
        &state,
        SignatureScheme::V1,
        "POST",
        &uri,
        &headers,
        addr,
        body,
        move |agent, request: StageMessageRequest| async move {
            let submission = court.stage_message(
                &CaseId(id),
                &agent,
                StageMessageInput {
                    text: request.text,
                    principle_citations: request.principle_citations,
                    evidence_citations: request
                        .evidence_citations
                        .into_iter()
                        .map(EvidenceId)
                        .collect(),
                },
                now_ts(),
            )?;
            Ok((
                201,
                json!({
                    "submissionId": submission.submission_id.to_string(),
                    "phase": submission.phase.as_str(),
                    "contentHash": submission.content_hash,
                }),
            ))
        },
    )
    .await
}

pub async fn juror_ready(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(id): Path<String>,
    uri: OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let court = state.court.clone();
    signed_call(
        &state,
        SignatureScheme::V1,
        "POST",
        &uri,
        &headers,
        addr,
        body,
        move |agent, _request: Value| async move {
            court.juror_ready(&CaseId(id), &agent, now_ts())?;
            Ok((200, json!({ "ok": true })))
        },
    )
    .await
}

pub async fn submit_ballot(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(id): Path<String>,
    uri: OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let court = state.court.clone();
    signed_call(
        &state,
        SignatureScheme::V1,
        "POST",
        &uri,
        &headers,
        addr,
        body,
        move |agent, request: BallotRequest| async move {
            let ballot = court.submit_ballot(
                &CaseId(id),
                &agent,
                BallotInput {
                    votes: request.votes.into_iter().map(|v| v.into_vote()).collect(),
                    overall: request.overall,
                    reasoning_summary: request.reasoning_summary,
                    principles_relied_on: request.principles_relied_on,
                    signature: request.signature,
                },
                now_ts(),
            )?;
            Ok((
                201,
                json!({
                    "ballotHash": ballot.ballot_hash,
                    "submittedAt": ballot.submitted_at,
                }),
            ))
        },
    )
    .await
}

// ── Reads ────────────────────────────────────────────────────────────────────

pub async fn get_case(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let case = state.store.require_case(&CaseId(id))?;
    Ok(Json(json!(CaseView::from(&case))))
}

pub async fn get_transcript(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let case_id = CaseId(id);
    state.store.require_case(&case_id)?;
    let events: Vec<Value> = state
        .store
        .transcript_for_case(&case_id)?
        .iter()
        .map(|e| {
            json!({
                "seq": e.seq,
                "actorRole": e.actor_role,
                "eventType": e.event_type,
                "stage": e.stage,
                "message": e.message,
                "artefactId": e.artefact_id,
                "at": cawt_core::types::to_iso(e.at),
            })
        })
        .collect();
    Ok(Json(json!({ "caseId": case_id.to_string(), "events": events })))
}

