//! Core case types: the dispute record, its claims, evidence, submissions,
//! ballots, and the jury panel bookkeeping.
//!
//! A case moves draft → filed → jury_selected → voting → closed → sealed, or
//! short-circuits to void at any pre-closed stage. `CaseStatus` is the coarse
//! lifecycle; `SessionStage` is the fine-grained session node. The two are
//! kept consistent via [`CaseStatus::for_stage`].

use serde::{Deserialize, Serialize};

use crate::types::{AgentId, CaseId, ClaimId, EvidenceId, SubmissionId, Timestamp};

// ── Mode / status / stage ────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseMode {
    /// Eleven-juror panel with deterministic selection.
    Jury,
    /// Single LLM judge: screening, tiebreaks, remedies.
    Judge,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Draft,
    Filed,
    JurySelected,
    Voting,
    Closed,
    Sealed,
    Void,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStage {
    Draft,
    JudgeScreening,
    PreSession,
    JuryReadiness,
    OpeningAddresses,
    Evidence,
    ClosingAddresses,
    SummingUp,
    Voting,
    Closed,
    Sealed,
    Void,
}

impl SessionStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStage::Draft => "draft",
            SessionStage::JudgeScreening => "judge_screening",
            SessionStage::PreSession => "pre_session",
            SessionStage::JuryReadiness => "jury_readiness",
            SessionStage::OpeningAddresses => "opening_addresses",
            SessionStage::Evidence => "evidence",
            SessionStage::ClosingAddresses => "closing_addresses",
            SessionStage::SummingUp => "summing_up",
            SessionStage::Voting => "voting",
            SessionStage::Closed => "closed",
            SessionStage::Sealed => "sealed",
            SessionStage::Void => "void",
        }
    }

    /// The submission phase collected during this stage, if any.
    pub fn submission_phase(&self) -> Option<SubmissionPhase> {
        match self {
            SessionStage::OpeningAddresses => Some(SubmissionPhase::Opening),
            SessionStage::Evidence => Some(SubmissionPhase::Evidence),
            SessionStage::ClosingAddresses => Some(SubmissionPhase::Closing),
            SessionStage::SummingUp => Some(SubmissionPhase::SummingUp),
            _ => None,
        }
    }
}

impl CaseStatus {
    /// The coarse status each session stage implies. Invariant (a) of the
    /// data model: a stored case always satisfies `status == for_stage(stage)`.
    pub fn for_stage(stage: SessionStage) -> CaseStatus {
        match stage {
            SessionStage::Draft => CaseStatus::Draft,
            SessionStage::JudgeScreening | SessionStage::PreSession => CaseStatus::Filed,
            SessionStage::JuryReadiness
            | SessionStage::OpeningAddresses
            | SessionStage::Evidence
            | SessionStage::ClosingAddresses
            | SessionStage::SummingUp => CaseStatus::JurySelected,
            SessionStage::Voting => CaseStatus::Voting,
            SessionStage::Closed => CaseStatus::Closed,
            SessionStage::Sealed => CaseStatus::Sealed,
            SessionStage::Void => CaseStatus::Void,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CaseStatus::Sealed | CaseStatus::Void)
    }
}

// ── Void reasons ─────────────────────────────────────────────────────────────

/// Terminal non-sealed reasons. Each maps 1:1 onto the stage-gate that failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoidReason {
    JudgeScreeningRejected,
    JudgeScreeningFailed,
    MissingDefenceAssignment,
    JuryReadinessTimeout,
    MissingOpeningSubmission,
    MissingEvidenceSubmission,
    MissingClosingSubmission,
    MissingSummingSubmission,
    VotingTimeout,
    InconclusiveVerdict,
    ReplacementCapExceeded,
    Manual,
}

impl VoidReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoidReason::JudgeScreeningRejected => "judge_screening_rejected",
            VoidReason::JudgeScreeningFailed => "judge_screening_failed",
            VoidReason::MissingDefenceAssignment => "missing_defence_assignment",
            VoidReason::JuryReadinessTimeout => "jury_readiness_timeout",
            VoidReason::MissingOpeningSubmission => "missing_opening_submission",
            VoidReason::MissingEvidenceSubmission => "missing_evidence_submission",
            VoidReason::MissingClosingSubmission => "missing_closing_submission",
            VoidReason::MissingSummingSubmission => "missing_summing_submission",
            VoidReason::VotingTimeout => "voting_timeout",
            VoidReason::InconclusiveVerdict => "inconclusive_verdict",
            VoidReason::ReplacementCapExceeded => "replacement_cap_exceeded",
            VoidReason::Manual => "manual",
        }
    }
}

// ── Outcome / seal status ────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseOutcome {
    ForProsecution,
    ForDefence,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SealStatus {
    None,
    Queued,
    Minting,
    Minted,
    Failed,
}

// ── ScoredCandidate ──────────────────────────────────────────────────────────

/// One entry of a selection proof: the full score-sorted candidate list that
/// produced a panel. Replacements are drawn from this order without a new
/// drand round.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub candidate_id: AgentId,
    pub score_hash: String,
}

// ── Case ─────────────────────────────────────────────────────────────────────

/// A single dispute as stored in the repository.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Case {
    pub case_id: CaseId,
    pub prosecution_agent_id: AgentId,
    /// Named defendant, if the filing targeted a specific agent.
    pub defendant_agent_id: Option<AgentId>,
    /// Filed without a named defendant; any eligible agent may volunteer.
    pub open_defence: bool,
    /// Set exactly once, by naming-acceptance or volunteering (compare-and-set).
    pub defence_agent_id: Option<AgentId>,
    pub mode: CaseMode,
    pub topic: String,
    pub stake_level: u8,
    pub requested_remedy: String,
    pub claim_summary: String,
    pub status: CaseStatus,
    pub stage: SessionStage,
    /// Session start: pre_session advances once the wall clock passes this.
    pub scheduled_for: Option<Timestamp>,
    /// Open-defence volunteering closes at this time.
    pub defence_deadline: Option<Timestamp>,
    /// Deadline of the current stage, where the stage is deadline-bounded.
    pub stage_deadline: Option<Timestamp>,
    /// Hard ceiling on the voting stage regardless of juror-level deadlines.
    pub voting_hard_deadline: Option<Timestamp>,
    /// Consecutive readiness windows consumed so far.
    pub readiness_windows_used: u32,
    /// Screening attempts consumed so far (judge mode).
    pub screening_attempts: u32,
    pub drand_round: Option<u64>,
    pub drand_randomness: Option<String>,
    pub pool_snapshot_hash: Option<String>,
    pub selection_proof: Vec<ScoredCandidate>,
    pub verdict_hash: Option<String>,
    /// Canonical verdict bundle JSON, set at close.
    pub verdict_bundle: Option<String>,
    pub transcript_root_hash: Option<String>,
    pub outcome: Option<CaseOutcome>,
    /// Judge remedy recommendation; stored on the row only, never hashed.
    #[serde(default)]
    pub judge_remedy: Option<String>,
    pub void_reason: Option<VoidReason>,
    pub seal_status: SealStatus,
    pub seal_asset_id: Option<String>,
    pub seal_tx_sig: Option<String>,
    pub metadata_uri: Option<String>,
    pub created_at: Timestamp,
    pub filed_at: Option<Timestamp>,
    pub closed_at: Option<Timestamp>,
}

impl Case {
    pub fn draft(
        case_id: CaseId,
        prosecution: AgentId,
        mode: CaseMode,
        topic: String,
        now: Timestamp,
    ) -> Self {
        Self {
            case_id,
            prosecution_agent_id: prosecution,
            defendant_agent_id: None,
            open_defence: false,
            defence_agent_id: None,
            mode,
            topic,
            stake_level: 1,
            requested_remedy: String::new(),
            claim_summary: String::new(),
            status: CaseStatus::Draft,
            stage: SessionStage::Draft,
            scheduled_for: None,
            defence_deadline: None,
            stage_deadline: None,
            voting_hard_deadline: None,
            readiness_windows_used: 0,
            screening_attempts: 0,
            drand_round: None,
            drand_randomness: None,
            pool_snapshot_hash: None,
            selection_proof: Vec::new(),
            verdict_hash: None,
            verdict_bundle: None,
            transcript_root_hash: None,
            outcome: None,
            judge_remedy: None,
            void_reason: None,
            seal_status: SealStatus::None,
            seal_asset_id: None,
            seal_tx_sig: None,
            metadata_uri: None,
            created_at: now,
            filed_at: None,
            closed_at: None,
        }
    }

    /// Move to `stage`, keeping the coarse status consistent (invariant a).
    pub fn enter_stage(&mut self, stage: SessionStage) {
        self.stage = stage;
        self.status = CaseStatus::for_stage(stage);
    }

    /// Invariants (b)/(c): a sealed case carries a verdict hash, a void case
    /// carries a reason, and the two states are mutually exclusive.
    pub fn check_terminal_invariants(&self) -> Result<(), crate::error::CourtError> {
        if self.status == CaseStatus::Sealed && self.verdict_hash.as_deref().unwrap_or("").is_empty()
        {
            return Err(crate::error::CourtError::Internal(format!(
                "case {} sealed without verdict hash",
                self.case_id
            )));
        }
        if self.status == CaseStatus::Void && self.void_reason.is_none() {
            return Err(crate::error::CourtError::Internal(format!(
                "case {} void without reason",
                self.case_id
            )));
        }
        Ok(())
    }
}

// ── Claim ────────────────────────────────────────────────────────────────────

/// Atomic allegation within a case.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Claim {
    pub claim_id: ClaimId,
    pub case_id: CaseId,
    pub summary: String,
    pub requested_remedy: String,
    /// Subset of the fixed principle labels P1..P12.
    pub alleged_principles: Vec<String>,
    pub created_at: Timestamp,
}

// ── Evidence ─────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceKind {
    Log,
    Transcript,
    Code,
    Link,
    Attestation,
    Other,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseSide {
    Prosecution,
    Defence,
}

impl CaseSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaseSide::Prosecution => "prosecution",
            CaseSide::Defence => "defence",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Evidence {
    pub evidence_id: EvidenceId,
    pub case_id: CaseId,
    pub side: CaseSide,
    pub kind: EvidenceKind,
    pub title: String,
    pub body: String,
    pub attachment_url: Option<String>,
    /// sha256 of the canonicalised record; cited by submissions and hashed
    /// into the verdict bundle.
    pub body_hash: String,
    pub submitted_at: Timestamp,
}

// ── Submission ───────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionPhase {
    Opening,
    Evidence,
    Closing,
    SummingUp,
}

impl SubmissionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionPhase::Opening => "opening",
            SubmissionPhase::Evidence => "evidence",
            SubmissionPhase::Closing => "closing",
            SubmissionPhase::SummingUp => "summing_up",
        }
    }
}

/// One per (case, side, phase); the repository enforces uniqueness.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Submission {
    pub submission_id: SubmissionId,
    pub case_id: CaseId,
    pub side: CaseSide,
    pub phase: SubmissionPhase,
    pub text: String,
    pub principle_citations: Vec<String>,
    pub evidence_citations: Vec<EvidenceId>,
    pub content_hash: String,
    pub submitted_at: Timestamp,
}

// ── Ballot ───────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Finding {
    Proven,
    NotProven,
    Insufficient,
}

impl Finding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Finding::Proven => "proven",
            Finding::NotProven => "not_proven",
            Finding::Insufficient => "insufficient",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallVote {
    ForProsecution,
    ForDefence,
    Mixed,
}

/// One juror's verdict on one claim.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClaimVote {
    pub claim_id: ClaimId,
    pub finding: Finding,
    /// Severity 1–3 (only meaningful when the finding is proven).
    pub severity: u8,
    pub recommended_remedy: Option<String>,
}

/// One per (case, juror). The double-ballot guard lives in the repository.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Ballot {
    pub case_id: CaseId,
    pub juror_id: AgentId,
    pub votes: Vec<ClaimVote>,
    pub overall: OverallVote,
    pub reasoning_summary: String,
    /// 1–3 of the fixed principle labels.
    pub principles_relied_on: Vec<String>,
    pub ballot_hash: String,
    /// base64 Ed25519 signature over the ballot hash digest.
    pub signature: String,
    pub submitted_at: Timestamp,
}

// ── Jury panel ───────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PanelStatus {
    PendingReady,
    Ready,
    ActiveVoting,
    Voted,
    Replaced,
    TimedOut,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JuryPanelMember {
    pub case_id: CaseId,
    pub juror_id: AgentId,
    pub score_hash: String,
    /// Seat index 0..panel_size; replacements inherit the seat of the member
    /// they replace, which is what the per-seat cap counts.
    pub seat: u32,
    pub status: PanelStatus,
    pub ready_deadline: Option<Timestamp>,
    pub voting_deadline: Option<Timestamp>,
    pub replacement_of: Option<AgentId>,
    pub joined_at: Timestamp,
}

impl JuryPanelMember {
    /// Seats still counted toward quorum: anything not replaced or timed out.
    pub fn is_seated(&self) -> bool {
        !matches!(self.status, PanelStatus::Replaced | PanelStatus::TimedOut)
    }
}

// ── JurySelectionRun ─────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionKind {
    Initial,
    Replacement,
}

/// Audit record of one selection pass (initial or replacement).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JurySelectionRun {
    pub case_id: CaseId,
    pub kind: SelectionKind,
    pub drand_round: u64,
    pub drand_randomness: String,
    pub pool_snapshot_hash: String,
    pub scored: Vec<ScoredCandidate>,
    pub created_at: Timestamp,
}
