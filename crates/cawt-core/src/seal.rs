//! Seal pipeline records: the queued mint job and the worker's wire contract.

use serde::{Deserialize, Serialize};

use crate::types::{CaseId, JobId, Timestamp};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SealJobStatus {
    Queued,
    Minting,
    Minted,
    Failed,
}

impl SealJobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SealJobStatus::Minted)
    }
}

/// One mint job per case; created when verdict computation succeeds.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SealJob {
    pub job_id: JobId,
    pub case_id: CaseId,
    /// Serialized [`WorkerSealRequest`] exactly as dispatched.
    pub request_json: String,
    /// sha256 of the canonical request; replay detection anchor.
    pub payload_hash: String,
    pub status: SealJobStatus,
    pub attempts: u32,
    /// Canonical JSON of the worker result applied to this job, once terminal.
    pub response_json: Option<String>,
    pub last_error: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

// ── Worker wire contract ─────────────────────────────────────────────────────

/// Request POSTed to the mint worker (`X-Worker-Token` bearer).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkerSealRequest {
    pub job_id: JobId,
    pub case_id: CaseId,
    pub verdict_hash: String,
    pub transcript_root_hash: String,
    pub jury_selection_proof_hash: String,
    /// External URL of the sealed decision, embedded in the minted metadata.
    pub decision_url: String,
}

/// Result applied idempotently via `POST /api/internal/seal-result`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkerSealResult {
    pub job_id: JobId,
    pub case_id: CaseId,
    pub verdict_hash: String,
    pub status: SealJobStatus,
    pub asset_id: Option<String>,
    pub tx_sig: Option<String>,
    pub metadata_uri: Option<String>,
    pub error: Option<String>,
}
