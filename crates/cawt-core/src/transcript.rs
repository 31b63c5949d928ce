//! Append-only per-case transcript. The transcript is the serial history of a
//! case: every state change writes an event in the same store transaction,
//! sequenced by a per-case monotonic counter.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{CaseId, Timestamp};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Prosecution,
    Defence,
    Juror,
    Judge,
    Court,
    Worker,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptEventType {
    CaseFiled,
    DefenceAssigned,
    StageStarted,
    StageDeadline,
    StageMessage,
    EvidenceSubmitted,
    SubmissionReceived,
    JurorReady,
    JurorReplaced,
    BallotReceived,
    JudgeScreening,
    JudgeTiebreak,
    CaseClosed,
    CaseVoided,
    CaseSealed,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TranscriptEvent {
    pub case_id: CaseId,
    /// Monotonic per-case sequence number, allocated by the repository.
    pub seq: u64,
    pub actor_role: ActorRole,
    pub event_type: TranscriptEventType,
    /// Stage the case was in when the event was written.
    pub stage: String,
    pub message: String,
    /// Reference to an evidence/submission/ballot record, when applicable.
    pub artefact_id: Option<String>,
    #[serde(default)]
    pub payload: Option<Value>,
    pub at: Timestamp,
}
