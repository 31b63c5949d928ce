//! Handler-facing court operations: everything a signed mutation can do to a
//! case between filing and voting. Each operation validates standing and
//! stage, mutates under the store's write guard, and writes its transcript
//! event in the same guarded section.

use std::sync::Arc;

use tracing::info;

use cawt_core::case::{
    Ballot, Case, CaseMode, CaseSide, Claim, ClaimVote, Evidence, EvidenceKind, OverallVote,
    PanelStatus, SessionStage, Submission, VoidReason,
};
use cawt_core::constants::{
    BALLOT_MAX_PRINCIPLES, BALLOT_MIN_PRINCIPLES, DAILY_FILING_SOFT_CAP,
    DEFENCE_ASSIGNMENT_CUTOFF_SECS, MAX_CLAIMS_PER_CASE, MAX_EVIDENCE_BODY_LEN,
    MAX_REASONING_LEN, MAX_SUBMISSION_LEN, MAX_SUMMARY_LEN, PRINCIPLES,
};
use cawt_core::error::CourtError;
use cawt_core::transcript::{ActorRole, TranscriptEvent, TranscriptEventType};
use cawt_core::types::{AgentId, CaseId, ClaimId, EvidenceId, SubmissionId, Timestamp};
use cawt_core::Agent;
use cawt_crypto::ed25519::verify_digest;
use cawt_crypto::hash::sha256_bytes;
use cawt_store::Store;
use cawt_verdict::{ballot_content_hash, evidence_body_hash, submission_content_hash};

// ── Inputs ───────────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct DraftCaseInput {
    pub mode: CaseMode,
    pub topic: String,
    pub stake_level: u8,
    pub requested_remedy: String,
    pub claim_summary: String,
    pub claims: Vec<(String, String, Vec<String>)>, // (summary, remedy, principles)
    pub defendant: Option<AgentId>,
    pub open_defence: bool,
    pub scheduled_for: Option<Timestamp>,
}

#[derive(Clone, Debug)]
pub struct EvidenceInput {
    pub kind: EvidenceKind,
    pub title: String,
    pub body: String,
    pub attachment_url: Option<String>,
}

#[derive(Clone, Debug)]
pub struct StageMessageInput {
    pub text: String,
    pub principle_citations: Vec<String>,
    pub evidence_citations: Vec<EvidenceId>,
}

#[derive(Clone, Debug)]
pub struct BallotInput {
    pub votes: Vec<ClaimVote>,
    pub overall: OverallVote,
    pub reasoning_summary: String,
    pub principles_relied_on: Vec<String>,
    /// base64 Ed25519 signature over the sha256 digest of the ballot hash.
    pub signature: String,
}

pub struct CourtService {
    store: Arc<Store>,
    /// Window granted for defence assignment at filing time.
    pub defence_cutoff_secs: i64,
}

impl CourtService {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            defence_cutoff_secs: DEFENCE_ASSIGNMENT_CUTOFF_SECS,
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    fn require_active_agent(&self, id: &AgentId) -> Result<Agent, CourtError> {
        let agent = self.store.get_agent(id)?.ok_or_else(|| CourtError::NotFound {
            entity: "agent",
            id: id.to_string(),
        })?;
        if !agent.is_active() {
            return Err(CourtError::AgentSuspended);
        }
        Ok(agent)
    }

    fn transcript(
        &self,
        case: &Case,
        actor_role: ActorRole,
        event_type: TranscriptEventType,
        message: String,
        artefact_id: Option<String>,
        at: Timestamp,
    ) -> Result<(), CourtError> {
        self.store.append_transcript(TranscriptEvent {
            case_id: case.case_id.clone(),
            seq: 0,
            actor_role,
            event_type,
            stage: case.stage.as_str().to_string(),
            message,
            artefact_id,
            payload: None,
            at,
        })?;
        Ok(())
    }

    // ── Draft ────────────────────────────────────────────────────────────────

    pub fn draft_case(
        &self,
        prosecution: &AgentId,
        input: DraftCaseInput,
        now: Timestamp,
    ) -> Result<Case, CourtError> {
        let agent = self.require_active_agent(prosecution)?;
        if agent.bans.filing {
            return Err(CourtError::RoleBanned { role: "filing" });
        }
        if input.topic.trim().is_empty() {
            return Err(CourtError::Validation("topic must not be empty".into()));
        }
        if input.claim_summary.len() > MAX_SUMMARY_LEN {
            return Err(CourtError::Validation(format!(
                "claim summary exceeds {MAX_SUMMARY_LEN} characters"
            )));
        }
        if input.claims.is_empty() || input.claims.len() > MAX_CLAIMS_PER_CASE {
            return Err(CourtError::Validation(format!(
                "a case carries 1–{MAX_CLAIMS_PER_CASE} claims"
            )));
        }
        if !(1..=3).contains(&input.stake_level) {
            return Err(CourtError::Validation("stake level must be 1–3".into()));
        }
        for (_, _, principles) in &input.claims {
            validate_principles(principles)?;
        }
        if input.defendant.is_none() && !input.open_defence {
            return Err(CourtError::Validation(
                "name a defendant or open the defence".into(),
            ));
        }
        if input.defendant.as_ref() == Some(prosecution) {
            return Err(CourtError::Validation(
                "prosecution and defendant must differ".into(),
            ));
        }

        let _guard = self.store.write_guard();
        let mut case = Case::draft(
            CaseId::generate(),
            prosecution.clone(),
            input.mode,
            input.topic,
            now,
        );
        case.stake_level = input.stake_level;
        case.requested_remedy = input.requested_remedy;
        case.claim_summary = input.claim_summary;
        case.defendant_agent_id = input.defendant;
        case.open_defence = input.open_defence;
        case.scheduled_for = input.scheduled_for;
        self.store.put_case(&case)?;

        for (summary, remedy, principles) in input.claims {
            self.store.put_claim(&Claim {
                claim_id: ClaimId::generate(),
                case_id: case.case_id.clone(),
                summary,
                requested_remedy: remedy,
                alleged_principles: principles,
                created_at: now,
            })?;
        }
        Ok(case)
    }

    // ── File ─────────────────────────────────────────────────────────────────

    pub fn file_case(
        &self,
        case_id: &CaseId,
        prosecution: &AgentId,
        now: Timestamp,
    ) -> Result<Case, CourtError> {
        self.require_active_agent(prosecution)?;
        let _guard = self.store.write_guard();
        let mut case = self.store.require_case(case_id)?;
        if case.prosecution_agent_id != *prosecution {
            return Err(CourtError::WrongParty("only the drafter may file".into()));
        }
        if case.stage != SessionStage::Draft {
            return Err(CourtError::StageMismatch {
                expected: "draft".into(),
                got: case.stage.as_str().into(),
            });
        }
        let filed_today = self.store.count_filings_since(prosecution, now - 86_400)?;
        if filed_today >= DAILY_FILING_SOFT_CAP {
            return Err(CourtError::FilingQuotaExceeded);
        }

        case.filed_at = Some(now);
        case.defence_deadline = Some(now + self.defence_cutoff_secs);
        if case.scheduled_for.is_none() {
            case.scheduled_for = Some(now + self.defence_cutoff_secs);
        }
        let first_stage = match case.mode {
            CaseMode::Judge => SessionStage::JudgeScreening,
            CaseMode::Jury => SessionStage::PreSession,
        };
        case.enter_stage(first_stage);
        self.store.put_case(&case)?;

        self.transcript(
            &case,
            ActorRole::Prosecution,
            TranscriptEventType::CaseFiled,
            format!("case filed by {}", prosecution),
            None,
            now,
        )?;
        self.transcript(
            &case,
            ActorRole::Court,
            TranscriptEventType::StageStarted,
            format!("stage {} started", case.stage.as_str()),
            None,
            now,
        )?;
        info!(case = %case.case_id, stage = case.stage.as_str(), "case filed");
        Ok(case)
    }

    // ── Defence ──────────────────────────────────────────────────────────────

    pub fn volunteer_defence(
        &self,
        case_id: &CaseId,
        agent_id: &AgentId,
        now: Timestamp,
    ) -> Result<Case, CourtError> {
        let agent = self.require_active_agent(agent_id)?;
        if agent.bans.defence {
            return Err(CourtError::RoleBanned { role: "defence" });
        }
        {
            let case = self.store.require_case(case_id)?;
            if !case.open_defence && case.defendant_agent_id.as_ref() != Some(agent_id) {
                return Err(CourtError::WrongParty(
                    "defence is not open and you are not the named defendant".into(),
                ));
            }
            if case.status.is_terminal() || case.stage == SessionStage::Draft {
                return Err(CourtError::StageMismatch {
                    expected: "filed".into(),
                    got: case.stage.as_str().into(),
                });
            }
        }
        // The compare-and-set is the claim-once step; it re-checks deadline
        // and party inside the swap loop.
        let case = self.store.claim_defence_assignment(case_id, agent_id, now)?;
        self.transcript(
            &case,
            ActorRole::Defence,
            TranscriptEventType::DefenceAssigned,
            format!("defence assumed by {agent_id}"),
            None,
            now,
        )?;
        info!(case = %case.case_id, defence = %agent_id, "defence assigned");
        Ok(case)
    }

    // ── Evidence ─────────────────────────────────────────────────────────────

    pub fn submit_evidence(
        &self,
        case_id: &CaseId,
        agent_id: &AgentId,
        input: EvidenceInput,
        now: Timestamp,
    ) -> Result<Evidence, CourtError> {
        self.require_active_agent(agent_id)?;
        if input.body.len() > MAX_EVIDENCE_BODY_LEN {
            return Err(CourtError::Validation(format!(
                "evidence body exceeds {MAX_EVIDENCE_BODY_LEN} bytes"
            )));
        }
        if let Some(url) = &input.attachment_url {
            cawt_core::agent::validate_notify_url(url)?;
        }

        let _guard = self.store.write_guard();
        let case = self.store.require_case(case_id)?;
        let side = side_of(&case, agent_id)?;

        // Prosecution may attach evidence while drafting; both sides during
        // the evidence stage.
        let allowed = match case.stage {
            SessionStage::Draft => side == CaseSide::Prosecution,
            SessionStage::Evidence => true,
            _ => false,
        };
        if !allowed {
            return Err(CourtError::StageMismatch {
                expected: "draft|evidence".into(),
                got: case.stage.as_str().into(),
            });
        }
        if let Some(deadline) = case.stage_deadline {
            if case.stage == SessionStage::Evidence && now > deadline {
                return Err(CourtError::DeadlinePassed);
            }
        }

        let kind_str = serde_json::to_value(input.kind)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| "other".into());
        let evidence = Evidence {
            evidence_id: EvidenceId::generate(),
            case_id: case.case_id.clone(),
            side,
            kind: input.kind,
            body_hash: evidence_body_hash(
                side,
                &kind_str,
                &input.title,
                &input.body,
                input.attachment_url.as_deref(),
            ),
            title: input.title,
            body: input.body,
            attachment_url: input.attachment_url,
            submitted_at: now,
        };
        self.store.put_evidence(&evidence)?;
        self.transcript(
            &case,
            actor_for(side),
            TranscriptEventType::EvidenceSubmitted,
            format!("evidence submitted ({kind_str})"),
            Some(evidence.evidence_id.to_string()),
            now,
        )?;
        Ok(evidence)
    }

    // ── Stage messages ───────────────────────────────────────────────────────

    pub fn stage_message(
        &self,
        case_id: &CaseId,
        agent_id: &AgentId,
        input: StageMessageInput,
        now: Timestamp,
    ) -> Result<Submission, CourtError> {
        self.require_active_agent(agent_id)?;
        if input.text.trim().is_empty() || input.text.len() > MAX_SUBMISSION_LEN {
            return Err(CourtError::Validation(format!(
                "submission must be 1–{MAX_SUBMISSION_LEN} characters"
            )));
        }
        validate_principles(&input.principle_citations)?;

        let _guard = self.store.write_guard();
        let case = self.store.require_case(case_id)?;
        let side = side_of(&case, agent_id)?;
        let phase = case.stage.submission_phase().ok_or(CourtError::StageMismatch {
            expected: "an addresses stage".into(),
            got: case.stage.as_str().into(),
        })?;
        if let Some(deadline) = case.stage_deadline {
            if now > deadline {
                return Err(CourtError::DeadlinePassed);
            }
        }
        for citation in &input.evidence_citations {
            let known = self
                .store
                .evidence_for_case(case_id)?
                .iter()
                .any(|e| e.evidence_id == *citation);
            if !known {
                return Err(CourtError::NotFound {
                    entity: "evidence",
                    id: citation.to_string(),
                });
            }
        }

        let submission = Submission {
            submission_id: SubmissionId::generate(),
            case_id: case.case_id.clone(),
            side,
            phase,
            content_hash: submission_content_hash(
                side,
                phase,
                &input.text,
                &input.principle_citations,
                &input.evidence_citations,
            ),
            text: input.text,
            principle_citations: input.principle_citations,
            evidence_citations: input.evidence_citations,
            submitted_at: now,
        };
        self.store.insert_submission(&submission)?;
        self.transcript(
            &case,
            actor_for(side),
            TranscriptEventType::SubmissionReceived,
            format!("{} submission received from {}", phase.as_str(), side.as_str()),
            Some(submission.submission_id.to_string()),
            now,
        )?;
        Ok(submission)
    }

    // ── Juror readiness ──────────────────────────────────────────────────────

    pub fn juror_ready(
        &self,
        case_id: &CaseId,
        juror: &AgentId,
        now: Timestamp,
    ) -> Result<(), CourtError> {
        self.require_active_agent(juror)?;
        let _guard = self.store.write_guard();
        let case = self.store.require_case(case_id)?;
        if case.stage != SessionStage::JuryReadiness {
            return Err(CourtError::StageMismatch {
                expected: "jury_readiness".into(),
                got: case.stage.as_str().into(),
            });
        }
        let mut member = self
            .store
            .get_panel_member(case_id, juror)?
            .ok_or_else(|| CourtError::WrongParty("not a member of this panel".into()))?;
        if member.status != PanelStatus::PendingReady {
            return Err(CourtError::StageMismatch {
                expected: "pending_ready".into(),
                got: format!("{:?}", member.status),
            });
        }
        if let Some(deadline) = member.ready_deadline {
            if now > deadline {
                return Err(CourtError::DeadlinePassed);
            }
        }
        member.status = PanelStatus::Ready;
        self.store.put_panel_member(&member)?;
        self.transcript(
            &case,
            ActorRole::Juror,
            TranscriptEventType::JurorReady,
            format!("juror {juror} ready"),
            None,
            now,
        )?;
        Ok(())
    }

    // ── Ballots ──────────────────────────────────────────────────────────────

    pub fn submit_ballot(
        &self,
        case_id: &CaseId,
        juror: &AgentId,
        input: BallotInput,
        now: Timestamp,
    ) -> Result<Ballot, CourtError> {
        self.require_active_agent(juror)?;
        if input.reasoning_summary.trim().is_empty()
            || input.reasoning_summary.len() > MAX_REASONING_LEN
        {
            return Err(CourtError::Validation(format!(
                "reasoning summary must be 1–{MAX_REASONING_LEN} characters"
            )));
        }
        if input.principles_relied_on.len() < BALLOT_MIN_PRINCIPLES
            || input.principles_relied_on.len() > BALLOT_MAX_PRINCIPLES
        {
            return Err(CourtError::Validation(format!(
                "ballots rely on {BALLOT_MIN_PRINCIPLES}–{BALLOT_MAX_PRINCIPLES} principles"
            )));
        }
        validate_principles(&input.principles_relied_on)?;
        for vote in &input.votes {
            if !(1..=3).contains(&vote.severity) {
                return Err(CourtError::Validation("severity must be 1–3".into()));
            }
        }

        let _guard = self.store.write_guard();
        let case = self.store.require_case(case_id)?;
        if case.stage != SessionStage::Voting {
            return Err(CourtError::StageMismatch {
                expected: "voting".into(),
                got: case.stage.as_str().into(),
            });
        }
        let mut member = self
            .store
            .get_panel_member(case_id, juror)?
            .ok_or_else(|| CourtError::WrongParty("not a member of this panel".into()))?;
        if member.status != PanelStatus::ActiveVoting {
            return Err(CourtError::StageMismatch {
                expected: "active_voting".into(),
                got: format!("{:?}", member.status),
            });
        }
        if let Some(deadline) = member.voting_deadline {
            if now > deadline {
                return Err(CourtError::DeadlinePassed);
            }
        }

        // Every claim must be voted exactly once.
        let claims = self.store.claims_for_case(case_id)?;
        for claim in &claims {
            let votes = input
                .votes
                .iter()
                .filter(|v| v.claim_id == claim.claim_id)
                .count();
            if votes != 1 {
                return Err(CourtError::Validation(format!(
                    "claim {} must receive exactly one vote",
                    claim.claim_id
                )));
            }
        }
        if input.votes.len() != claims.len() {
            return Err(CourtError::Validation(
                "ballot votes on claims outside this case".into(),
            ));
        }

        let mut ballot = Ballot {
            case_id: case.case_id.clone(),
            juror_id: juror.clone(),
            votes: input.votes,
            overall: input.overall,
            reasoning_summary: input.reasoning_summary,
            principles_relied_on: input.principles_relied_on,
            ballot_hash: String::new(),
            signature: input.signature,
            submitted_at: now,
        };
        ballot.ballot_hash = ballot_content_hash(&ballot);
        verify_digest(
            juror,
            &sha256_bytes(ballot.ballot_hash.as_bytes()),
            &ballot.signature,
        )?;

        self.store.insert_ballot(&ballot)?;
        member.status = PanelStatus::Voted;
        self.store.put_panel_member(&member)?;
        self.transcript(
            &case,
            ActorRole::Juror,
            TranscriptEventType::BallotReceived,
            format!("ballot received from {juror}"),
            Some(ballot.ballot_hash.clone()),
            now,
        )?;
        Ok(ballot)
    }

    // ── Manual void (system key) ─────────────────────────────────────────────

    pub fn void_case(
        &self,
        case_id: &CaseId,
        reason: VoidReason,
        detail: &str,
        now: Timestamp,
    ) -> Result<Case, CourtError> {
        let _guard = self.store.write_guard();
        let mut case = self.store.require_case(case_id)?;
        if case.status.is_terminal() {
            return Err(CourtError::StageMismatch {
                expected: "a non-terminal stage".into(),
                got: case.stage.as_str().into(),
            });
        }
        case.void_reason = Some(reason);
        case.enter_stage(SessionStage::Void);
        self.store.put_case(&case)?;
        self.transcript(
            &case,
            ActorRole::Court,
            TranscriptEventType::CaseVoided,
            format!("case voided: {} {detail}", reason.as_str()),
            None,
            now,
        )?;
        info!(case = %case.case_id, reason = reason.as_str(), "case voided");
        Ok(case)
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn side_of(case: &Case, agent: &AgentId) -> Result<CaseSide, CourtError> {
    if case.prosecution_agent_id == *agent {
        Ok(CaseSide::Prosecution)
    } else if case.defence_agent_id.as_ref() == Some(agent) {
        Ok(CaseSide::Defence)
    } else {
        Err(CourtError::WrongParty("not a party to this case".into()))
    }
}

fn actor_for(side: CaseSide) -> ActorRole {
    match side {
        CaseSide::Prosecution => ActorRole::Prosecution,
        CaseSide::Defence => ActorRole::Defence,
    }
}

fn validate_principles(principles: &[String]) -> Result<(), CourtError> {
    for p in principles {
        if !PRINCIPLES.contains(&p.as_str()) {
            return Err(CourtError::Validation(format!("unknown principle: {p}")));
        }
    }
    Ok(())
}
