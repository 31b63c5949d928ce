//! Multisig decisions: draft → sign (N-of-M) → seal.
//!
//! Payloads are canonicalised with the shared sorted-key primitive before
//! hashing; signers co-sign `OPENCAWT_DECISION_V1|{payloadHash}`.

use std::sync::Arc;

use serde_json::Value;

use cawt_core::agreement::{Decision, DecisionSignature, DecisionStatus};
use cawt_core::canonical::canonical_json;
use cawt_core::error::CourtError;
use cawt_core::types::{AgentId, DecisionId, Timestamp};
use cawt_crypto::hash::sha256_hex;
use cawt_crypto::signing::{decision_attestation_string, verify_attestation};
use cawt_store::Store;

pub fn draft_decision(
    store: &Arc<Store>,
    created_by: AgentId,
    signers: Vec<AgentId>,
    threshold: u32,
    payload: &Value,
    now: Timestamp,
) -> Result<Decision, CourtError> {
    if signers.is_empty() {
        return Err(CourtError::Validation("a decision needs signers".into()));
    }
    if threshold == 0 || threshold as usize > signers.len() {
        return Err(CourtError::Validation(format!(
            "threshold must be 1–{}",
            signers.len()
        )));
    }
    if !signers.contains(&created_by) {
        return Err(CourtError::WrongParty(
            "drafter must be one of the signers".into(),
        ));
    }

    let canonical = canonical_json(payload);
    let decision = Decision {
        decision_id: DecisionId::generate(),
        created_by,
        signers,
        threshold,
        payload_hash: sha256_hex(canonical.as_bytes()),
        canonical_payload_json: canonical,
        status: DecisionStatus::Draft,
        created_at: now,
        sealed_at: None,
    };
    store.put_decision(&decision)?;
    Ok(decision)
}

pub fn sign_decision(
    store: &Arc<Store>,
    id: &DecisionId,
    signer: AgentId,
    sig: String,
    now: Timestamp,
) -> Result<Decision, CourtError> {
    let decision = store.require_decision(id)?;
    if decision.status != DecisionStatus::Draft {
        return Err(CourtError::DecisionStateConflict);
    }
    if !decision.signers.contains(&signer) {
        return Err(CourtError::WrongParty("not a declared signer".into()));
    }

    let attestation = decision_attestation_string(&decision.payload_hash);
    verify_attestation(&signer, &attestation, &sig)?;

    store.insert_decision_signature(&DecisionSignature {
        decision_id: id.clone(),
        agent_id: signer,
        sig,
        signed_at: now,
    })?;
    Ok(decision)
}

pub fn seal_decision(
    store: &Arc<Store>,
    id: &DecisionId,
    now: Timestamp,
) -> Result<Decision, CourtError> {
    let mut decision = store.require_decision(id)?;
    if decision.status != DecisionStatus::Draft {
        return Err(CourtError::DecisionStateConflict);
    }
    let collected = store.decision_signatures(id)?.len() as u32;
    if collected < decision.threshold {
        return Err(CourtError::Validation(format!(
            "{collected} of {} required signatures collected",
            decision.threshold
        )));
    }
    decision.status = DecisionStatus::Sealed;
    decision.sealed_at = Some(now);
    store.put_decision(&decision)?;
    Ok(decision)
}
