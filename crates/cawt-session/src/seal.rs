//! Seal pipeline: job creation, worker dispatch bookkeeping, and idempotent
//! result application (shared by the engine and the worker callback route).

use std::sync::Arc;

use tracing::{info, warn};

use cawt_core::canonical::canonical_json;
use cawt_core::case::{SealStatus, SessionStage};
use cawt_core::error::CourtError;
use cawt_core::seal::{SealJob, SealJobStatus, WorkerSealRequest, WorkerSealResult};
use cawt_core::transcript::{ActorRole, TranscriptEvent, TranscriptEventType};
use cawt_core::types::{JobId, Timestamp};
use cawt_crypto::hash::sha256_hex;
use cawt_store::Store;

/// Canonical hash of a worker result; the replay-detection anchor.
pub fn result_canonical_hash(result: &WorkerSealResult) -> Result<String, CourtError> {
    let value =
        serde_json::to_value(result).map_err(|e| CourtError::Serialization(e.to_string()))?;
    Ok(sha256_hex(canonical_json(&value).as_bytes()))
}

/// Create (or fetch) the case's seal job for a built request.
pub fn enqueue_seal_job(
    store: &Arc<Store>,
    request: &WorkerSealRequest,
    now: Timestamp,
) -> Result<SealJob, CourtError> {
    let request_value =
        serde_json::to_value(request).map_err(|e| CourtError::Serialization(e.to_string()))?;
    let request_canonical = canonical_json(&request_value);
    let job = SealJob {
        job_id: request.job_id.clone(),
        case_id: request.case_id.clone(),
        payload_hash: sha256_hex(request_canonical.as_bytes()),
        request_json: request_canonical,
        status: SealJobStatus::Queued,
        attempts: 0,
        response_json: None,
        last_error: None,
        created_at: now,
        updated_at: now,
    };
    store.create_seal_job_if_absent(&job)
}

/// Mark a dispatch failure; the tick retries stale failed jobs.
pub fn mark_seal_failure(
    store: &Arc<Store>,
    job_id: &JobId,
    error: &str,
    now: Timestamp,
) -> Result<(), CourtError> {
    store.transition_seal_job(
        job_id,
        &[SealJobStatus::Queued, SealJobStatus::Minting, SealJobStatus::Failed],
        |job| {
            job.status = SealJobStatus::Failed;
            job.attempts += 1;
            job.last_error = Some(error.to_string());
            job.updated_at = now;
        },
    )?;
    warn!(job = %job_id, error, "seal dispatch failed");
    Ok(())
}

/// Reopen a failed job (system-key manual retry endpoint).
pub fn reopen_seal_job(store: &Arc<Store>, job_id: &JobId, now: Timestamp) -> Result<SealJob, CourtError> {
    store.transition_seal_job(job_id, &[SealJobStatus::Failed], |job| {
        job.status = SealJobStatus::Queued;
        job.last_error = None;
        job.updated_at = now;
    })
}

/// Apply a worker result idempotently — the §seal-result callback contract.
///
/// The job's stored verdict hash must match; a terminal job replayed with an
/// identical canonical result succeeds, anything else conflicts. A `minted`
/// result seals the case in the same guarded section.
pub fn apply_seal_result(
    store: &Arc<Store>,
    result: &WorkerSealResult,
    now: Timestamp,
) -> Result<SealJob, CourtError> {
    let _guard = store.write_guard();

    let job = store.get_seal_job(&result.job_id)?.ok_or_else(|| CourtError::NotFound {
        entity: "seal job",
        id: result.job_id.to_string(),
    })?;
    if job.case_id != result.case_id {
        return Err(CourtError::Validation("job/case mismatch".into()));
    }

    let mut case = store.require_case(&result.case_id)?;
    if case.verdict_hash.as_deref() != Some(result.verdict_hash.as_str()) {
        return Err(CourtError::SealResultConflict);
    }

    let incoming_hash = result_canonical_hash(result)?;
    if job.status.is_terminal() {
        let stored_hash = job
            .response_json
            .as_deref()
            .map(|r| sha256_hex(r.as_bytes()));
        // Replay-safe: the identical result may land any number of times.
        return if stored_hash.as_deref() == Some(incoming_hash.as_str()) {
            Ok(job)
        } else {
            Err(CourtError::SealResultConflict)
        };
    }

    match result.status {
        SealJobStatus::Minted => {
            let response_value = serde_json::to_value(result)
                .map_err(|e| CourtError::Serialization(e.to_string()))?;
            let response_canonical = canonical_json(&response_value);
            let job = store.transition_seal_job(
                &result.job_id,
                &[SealJobStatus::Queued, SealJobStatus::Minting, SealJobStatus::Failed],
                |j| {
                    j.status = SealJobStatus::Minted;
                    j.response_json = Some(response_canonical.clone());
                    j.last_error = None;
                    j.updated_at = now;
                },
            )?;

            case.seal_status = SealStatus::Minted;
            case.seal_asset_id = result.asset_id.clone();
            case.seal_tx_sig = result.tx_sig.clone();
            case.metadata_uri = result.metadata_uri.clone();
            case.enter_stage(SessionStage::Sealed);
            store.put_case(&case)?;
            store.append_transcript(TranscriptEvent {
                case_id: case.case_id.clone(),
                seq: 0,
                actor_role: ActorRole::Worker,
                event_type: TranscriptEventType::CaseSealed,
                stage: case.stage.as_str().to_string(),
                message: format!(
                    "seal minted: asset {}",
                    result.asset_id.as_deref().unwrap_or("?")
                ),
                artefact_id: result.tx_sig.clone(),
                payload: None,
                at: now,
            })?;
            info!(case = %case.case_id, "case sealed");
            Ok(job)
        }
        SealJobStatus::Failed => {
            let job = store.transition_seal_job(
                &result.job_id,
                &[SealJobStatus::Queued, SealJobStatus::Minting, SealJobStatus::Failed],
                |j| {
                    j.status = SealJobStatus::Failed;
                    j.attempts += 1;
                    j.last_error = result.error.clone();
                    j.updated_at = now;
                },
            )?;
            case.seal_status = SealStatus::Failed;
            store.put_case(&case)?;
            Ok(job)
        }
        SealJobStatus::Queued | SealJobStatus::Minting => Err(CourtError::Validation(
            "worker results must be terminal".into(),
        )),
    }
}
