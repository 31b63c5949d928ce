//! OCP route handlers: agents, agreements, decisions, API keys, verify.

use std::net::SocketAddr;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, OriginalUri, Path, Query, State};
use axum::http::HeaderMap;
use axum::response::{Json, Response};
use serde::Deserialize;
use serde_json::{json, Value};

use cawt_core::agent::{validate_notify_url, Agent};
use cawt_core::error::CourtError;
use cawt_core::gateway::ApiKeyRecord;
use cawt_core::types::{AgentId, ApiKeyId, DecisionId, ProposalId};
use cawt_clients::TreasuryPayment;
use cawt_crypto::apikey::{generate_api_key, hash_api_key};
use cawt_crypto::signing::SignatureScheme;
use cawt_gateway::authenticate_api_key;
use cawt_ocp::{AcceptInput, ProposeInput};

use crate::error::ApiError;
use crate::server::AppState;
use crate::types::{
    AcceptAgreementRequest, AgreementView, CreateApiKeyRequest, DraftDecisionRequest,
    ProposeAgreementRequest, ReceiptView, RegisterAgentRequest, SignDecisionRequest,
    UpdateAgentRequest,
};

use super::{now_ts, signed_call};

// ── Agents ───────────────────────────────────────────────────────────────────

async fn register_with_scheme(
    state: AppState,
    scheme: SignatureScheme,
    addr: SocketAddr,
    uri: OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let store = state.store.clone();
    signed_call(
        &state,
        scheme,
        "POST",
        &uri,
        &headers,
        addr,
        body,
        move |agent_id, request: RegisterAgentRequest| async move {
            let now = now_ts();
            if let Some(url) = &request.notify_url {
                validate_notify_url(url)?;
            }
            let mut agent = store
                .get_agent(&agent_id)?
                .unwrap_or_else(|| Agent::new(agent_id.clone(), now));
            agent.notify_url = request.notify_url;
            agent.display_name = request.display_name;
            agent.bio = request.bio;
            agent.juror_eligible = request.juror_eligible;
            agent.updated_at = now;
            store.put_agent(&agent)?;
            Ok((
                201,
                json!({
                    "agentId": agent.agent_id.to_string(),
                    "status": agent.status,
                    "jurorEligible": agent.juror_eligible,
                }),
            ))
        },
    )
    .await
}

pub async fn register_agent(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    uri: OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    register_with_scheme(state, SignatureScheme::V1, addr, uri, headers, body).await
}

pub async fn register_agent_legacy(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    uri: OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    register_with_scheme(state, SignatureScheme::Legacy, addr, uri, headers, body).await
}

async fn update_with_scheme(
    state: AppState,
    scheme: SignatureScheme,
    addr: SocketAddr,
    uri: OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let store = state.store.clone();
    signed_call(
        &state,
        scheme,
        "POST",
        &uri,
        &headers,
        addr,
        body,
        move |agent_id, request: UpdateAgentRequest| async move {
            let now = now_ts();
            let mut agent = store.get_agent(&agent_id)?.ok_or(CourtError::NotFound {
                entity: "agent",
                id: agent_id.to_string(),
            })?;
            if let Some(url) = &request.notify_url {
                validate_notify_url(url)?;
                agent.notify_url = Some(url.clone());
            }
            if let Some(name) = request.display_name {
                agent.display_name = Some(name);
            }
            if let Some(bio) = request.bio {
                agent.bio = Some(bio);
            }
            if let Some(eligible) = request.juror_eligible {
                agent.juror_eligible = eligible;
            }
            agent.updated_at = now;
            store.put_agent(&agent)?;
            Ok((200, json!({ "agentId": agent.agent_id.to_string() })))
        },
    )
    .await
}

pub async fn update_agent(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    uri: OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    update_with_scheme(state, SignatureScheme::V1, addr, uri, headers, body).await
}

pub async fn update_agent_legacy(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    uri: OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    update_with_scheme(state, SignatureScheme::Legacy, addr, uri, headers, body).await
}

// ── Agreements ───────────────────────────────────────────────────────────────

pub async fn propose_agreement(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    uri: OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let ocp = state.ocp.clone();
    signed_call(
        &state,
        SignatureScheme::V1,
        "POST",
        &uri,
        &headers,
        addr,
        body,
        move |agent_id, request: ProposeAgreementRequest| async move {
            let party_b = AgentId::parse(&request.party_b)?;
            let fee = request.fee_tx_sig.map(|tx_sig| TreasuryPayment {
                tx_sig,
                payer: request.fee_payer,
            });
            let agreement = ocp
                .propose(
                    ProposeInput {
                        proposal_id: ProposalId(request.proposal_id),
                        party_a: agent_id,
                        party_b,
                        visibility: request.visibility,
                        terms: request.terms,
                        expires_at: request.expires_at,
                        sig_a: request.sig_a,
                        fee,
                    },
                    now_ts(),
                )
                .await?;
            Ok((201, json!(AgreementView::from(&agreement))))
        },
    )
    .await
}

pub async fn accept_agreement(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(id): Path<String>,
    uri: OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let ocp = state.ocp.clone();
    signed_call(
        &state,
        SignatureScheme::V1,
        "POST",
        &uri,
        &headers,
        addr,
        body,
        move |agent_id, request: AcceptAgreementRequest| async move {
            let (agreement, receipt) = ocp
                .accept(
                    AcceptInput {
                        proposal_id: ProposalId(id),
                        signer: agent_id,
                        sig_b: request.sig_b,
                    },
                    now_ts(),
                )
                .await?;
            Ok((
                200,
                json!({
                    "agreement": AgreementView::from(&agreement),
                    "receipt": ReceiptView::from(&receipt),
                }),
            ))
        },
    )
    .await
}

pub async fn get_agreement(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let agreement = state.store.require_agreement(&ProposalId(id))?;
    let receipt = state.store.get_receipt(&agreement.proposal_id)?;
    Ok(Json(json!({
        "agreement": AgreementView::from(&agreement),
        "receipt": receipt.as_ref().map(ReceiptView::from),
    })))
}

pub async fn get_agreement_by_code(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let agreement = state
        .store
        .get_agreement_by_code(&code)?
        .ok_or(CourtError::NotFound {
            entity: "agreement",
            id: code,
        })?;
    let receipt = state.store.get_receipt(&agreement.proposal_id)?;
    Ok(Json(json!({
        "agreement": AgreementView::from(&agreement),
        "receipt": receipt.as_ref().map(ReceiptView::from),
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyQuery {
    pub proposal_id: Option<String>,
    pub code: Option<String>,
}

/// Public verification: resolve a proposal id or agreement code to its
/// status, terms hash and mint receipt.
pub async fn verify(
    State(state): State<AppState>,
    Query(query): Query<VerifyQuery>,
) -> Result<Json<Value>, ApiError> {
    let agreement = match (&query.proposal_id, &query.code) {
        (Some(id), _) => state.store.get_agreement(&ProposalId(id.clone()))?,
        (None, Some(code)) => state.store.get_agreement_by_code(code)?,
        (None, None) => {
            return Err(CourtError::Validation("pass proposalId or code".into()).into())
        }
    };
    let Some(agreement) = agreement else {
        return Ok(Json(json!({ "found": false })));
    };
    let receipt = state.store.get_receipt(&agreement.proposal_id)?;
    Ok(Json(json!({
        "found": true,
        "status": agreement.status,
        "termsHash": agreement.terms_hash,
        "agreementCode": agreement.agreement_code,
        "partyA": agreement.party_a.to_string(),
        "partyB": agreement.party_b.to_string(),
        "receipt": receipt.as_ref().map(ReceiptView::from),
    })))
}

// ── Decisions ────────────────────────────────────────────────────────────────

pub async fn draft_decision(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    uri: OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let store = state.store.clone();
    signed_call(
        &state,
        SignatureScheme::V1,
        "POST",
        &uri,
        &headers,
        addr,
        body,
        move |agent_id, request: DraftDecisionRequest| async move {
            let signers = request
                .signers
                .iter()
                .map(|s| AgentId::parse(s))
                .collect::<Result<Vec<_>, _>>()?;
            let decision = cawt_ocp::draft_decision(
                &store,
                agent_id,
                signers,
                request.threshold,
                &request.payload,
                now_ts(),
            )?;
            Ok((
                201,
                json!({
                    "decisionId": decision.decision_id.to_string(),
                    "payloadHash": decision.payload_hash,
                    "threshold": decision.threshold,
                }),
            ))
        },
    )
    .await
}

pub async fn sign_decision(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(id): Path<String>,
    uri: OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let store = state.store.clone();
    signed_call(
        &state,
        SignatureScheme::V1,
        "POST",
        &uri,
        &headers,
        addr,
        body,
        move |agent_id, request: SignDecisionRequest| async move {
            let decision = cawt_ocp::sign_decision(
                &store,
                &DecisionId(id),
                agent_id,
                request.signature,
                now_ts(),
            )?;
            let collected = store.decision_signatures(&decision.decision_id)?.len();
            Ok((
                200,
                json!({
                    "decisionId": decision.decision_id.to_string(),
                    "signatures": collected,
                    "threshold": decision.threshold,
                }),
            ))
        },
    )
    .await
}

pub async fn seal_decision(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(id): Path<String>,
    uri: OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let store = state.store.clone();
    signed_call(
        &state,
        SignatureScheme::V1,
        "POST",
        &uri,
        &headers,
        addr,
        body,
        move |_agent_id, _request: Value| async move {
            let decision = cawt_ocp::seal_decision(&store, &DecisionId(id), now_ts())?;
            Ok((
                200,
                json!({
                    "decisionId": decision.decision_id.to_string(),
                    "status": decision.status,
                }),
            ))
        },
    )
    .await
}

// ── API keys ─────────────────────────────────────────────────────────────────

pub async fn create_api_key(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    uri: OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let store = state.store.clone();
    signed_call(
        &state,
        SignatureScheme::V1,
        "POST",
        &uri,
        &headers,
        addr,
        body,
        move |agent_id, request: CreateApiKeyRequest| async move {
            let raw = generate_api_key();
            let record = ApiKeyRecord {
                key_id: ApiKeyId::generate(),
                agent_id,
                label: request.label,
                key_hash: hash_api_key(&raw),
                created_at: now_ts(),
                last_used_at: None,
                revoked_at: None,
            };
            store.put_api_key(&record)?;
            // The raw key appears exactly once, here.
            Ok((
                201,
                json!({
                    "keyId": record.key_id.to_string(),
                    "apiKey": raw,
                    "label": record.label,
                }),
            ))
        },
    )
    .await
}

pub async fn list_api_keys(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let presented = headers
        .get("X-OCP-Api-Key")
        .or_else(|| headers.get("Authorization"))
        .and_then(|v| v.to_str().ok());
    let caller = authenticate_api_key(&state.store, presented, now_ts())?;
    let keys: Vec<Value> = state
        .store
        .api_keys_for_agent(&caller.agent_id)?
        .iter()
        .map(|k| {
            json!({
                "keyId": k.key_id.to_string(),
                "label": k.label,
                "createdAt": cawt_core::types::to_iso(k.created_at),
                "lastUsedAt": k.last_used_at.map(cawt_core::types::to_iso),
                "revoked": k.revoked_at.is_some(),
            })
        })
        .collect();
    Ok(Json(json!({ "keys": keys })))
}

pub async fn revoke_api_key(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(id): Path<String>,
    uri: OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let store = state.store.clone();
    signed_call(
        &state,
        SignatureScheme::V1,
        "DELETE",
        &uri,
        &headers,
        addr,
        body,
        move |agent_id, _request: Value| async move {
            let key_id = ApiKeyId(id);
            let mut record = store.get_api_key(&key_id)?.ok_or(CourtError::NotFound {
                entity: "api key",
                id: key_id.to_string(),
            })?;
            if record.agent_id != agent_id {
                return Err(CourtError::WrongParty("not your key".into()));
            }
            record.revoked_at = Some(now_ts());
            store.put_api_key(&record)?;
            Ok((200, json!({ "keyId": record.key_id.to_string(), "revoked": true })))
        },
    )
    .await
}
