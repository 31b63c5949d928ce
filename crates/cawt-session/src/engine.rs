//! The session engine: a single periodic task that walks every open case,
//! enforces stage gates and wall-clock deadlines, replaces unresponsive
//! jurors, and drives closing cases through verdict computation and sealing.
//!
//! At most one tick runs at a time (an atomic reentrancy flag); within a
//! tick, each compound mutation takes the store's write guard for its own
//! short section and never holds it across an await.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use cawt_core::case::{
    Case, CaseMode, CaseSide, JuryPanelMember, JurySelectionRun, PanelStatus, SealStatus,
    SelectionKind, SessionStage, SubmissionPhase, VoidReason,
};
use cawt_core::constants::{
    JUDGE_SCREENING_MAX_ATTEMPTS, JURY_PANEL_SIZE, JUROR_READY_WINDOW_SECS,
    JUROR_VOTING_WINDOW_SECS, MAX_READINESS_WINDOWS, MAX_SEAT_REPLACEMENTS,
    SEAL_RETRY_BATCH_PER_TICK, SESSION_TICK_INTERVAL_SECS, STAGE_SUBMISSION_WINDOW_SECS,
    VOTING_HARD_WINDOW_SECS,
};
use cawt_core::error::CourtError;
use cawt_core::seal::{SealJobStatus, WorkerSealRequest, WorkerSealResult};
use cawt_core::transcript::{ActorRole, TranscriptEvent, TranscriptEventType};
use cawt_core::types::{to_iso, AgentId, CaseId, JobId, Timestamp};
use cawt_clients::{DrandClient, JudgeCall, JudgeClient, MintWorkerClient};
use cawt_jury::{eligible_pool, replacement_from_proof, select_jury, PoolFilter};
use cawt_store::Store;
use cawt_verdict::{
    build_verdict_bundle, resolve_outcome, selection_proof_hash, tally_claims,
    transcript_root_hash, VerdictBundle, VerdictOutcome,
};

use crate::seal::{apply_seal_result, enqueue_seal_job, mark_seal_failure};

#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub tick_interval: Duration,
    pub panel_size: usize,
    pub ready_window_secs: i64,
    pub voting_window_secs: i64,
    pub voting_hard_window_secs: i64,
    pub stage_window_secs: i64,
    pub max_readiness_windows: u32,
    pub max_seat_replacements: u32,
    /// Public base for sealed-decision URLs embedded in mint metadata.
    pub decision_base_url: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(SESSION_TICK_INTERVAL_SECS),
            panel_size: JURY_PANEL_SIZE,
            ready_window_secs: JUROR_READY_WINDOW_SECS,
            voting_window_secs: JUROR_VOTING_WINDOW_SECS,
            voting_hard_window_secs: VOTING_HARD_WINDOW_SECS,
            stage_window_secs: STAGE_SUBMISSION_WINDOW_SECS,
            max_readiness_windows: MAX_READINESS_WINDOWS,
            max_seat_replacements: MAX_SEAT_REPLACEMENTS,
            decision_base_url: "https://court.opencawt.example".into(),
        }
    }
}

pub struct SessionEngine {
    store: Arc<Store>,
    drand: DrandClient,
    judge: JudgeClient,
    mint: MintWorkerClient,
    pub config: EngineConfig,
    ticking: AtomicBool,
    /// Cases whose close pipeline is in flight in this process.
    closing: Mutex<HashSet<CaseId>>,
}

impl SessionEngine {
    pub fn new(
        store: Arc<Store>,
        drand: DrandClient,
        judge: JudgeClient,
        mint: MintWorkerClient,
        config: EngineConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            drand,
            judge,
            mint,
            config,
            ticking: AtomicBool::new(false),
            closing: Mutex::new(HashSet::new()),
        })
    }

    /// The periodic loop. Runs until the process exits.
    pub async fn run(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config.tick_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(interval = ?self.config.tick_interval, "session engine started");
        loop {
            interval.tick().await;
            let now = chrono::Utc::now().timestamp();
            self.tick(now).await;
        }
    }

    /// One pass over all open cases plus housekeeping. Re-entry is a no-op.
    pub async fn tick(&self, now: Timestamp) {
        if self.ticking.swap(true, Ordering::SeqCst) {
            debug!("tick already in flight; skipping");
            return;
        }

        match self.store.iter_open_cases() {
            Ok(cases) => {
                for case in cases {
                    if let Err(e) = self.evaluate_case(case.case_id.clone(), now).await {
                        error!(case = %case.case_id, error = %e, "case evaluation failed");
                    }
                }
            }
            Err(e) => error!(error = %e, "failed to scan open cases"),
        }

        if let Err(e) = self.retry_stale_seal_jobs(now).await {
            warn!(error = %e, "seal retry sweep failed");
        }
        match self.store.expire_pending_agreements(now) {
            Ok(0) => {}
            Ok(n) => info!(count = n, "expired stale agreement proposals"),
            Err(e) => warn!(error = %e, "agreement expiry sweep failed"),
        }
        if let Err(e) = self.store.prune_nonces(now) {
            warn!(error = %e, "nonce pruning failed");
        }

        self.ticking.store(false, Ordering::SeqCst);
    }

    async fn evaluate_case(&self, case_id: CaseId, now: Timestamp) -> Result<(), CourtError> {
        let case = self.store.require_case(&case_id)?;
        match case.stage {
            SessionStage::JudgeScreening => self.tick_screening(case, now).await,
            SessionStage::PreSession => self.tick_pre_session(case, now).await,
            SessionStage::JuryReadiness => self.tick_readiness(case, now).await,
            SessionStage::OpeningAddresses
            | SessionStage::Evidence
            | SessionStage::ClosingAddresses
            | SessionStage::SummingUp => self.tick_submission_stage(case, now),
            SessionStage::Voting => self.tick_voting(case, now).await,
            // Closed cases are owned by the seal retry sweep; terminal and
            // draft stages have nothing to evaluate.
            _ => Ok(()),
        }
    }

    // ── Judge screening ──────────────────────────────────────────────────────

    async fn tick_screening(&self, case: Case, now: Timestamp) -> Result<(), CourtError> {
        let result = self
            .judge
            .screening(JudgeCall::Screening {
                case_id: case.case_id.to_string(),
                topic: case.topic.clone(),
                claim_summary: case.claim_summary.clone(),
            })
            .await;

        let _guard = self.store.write_guard();
        let mut case = self.store.require_case(&case.case_id)?;
        if case.stage != SessionStage::JudgeScreening {
            return Ok(());
        }

        match (result.ok, result.data) {
            (true, Some(decision)) => {
                self.append_event(
                    &case,
                    ActorRole::Judge,
                    TranscriptEventType::JudgeScreening,
                    format!("screening: {}", decision.reason),
                    now,
                )?;
                if decision.approved {
                    self.enter_stage_logged(&mut case, SessionStage::PreSession, None, now)?;
                } else {
                    self.void(&mut case, VoidReason::JudgeScreeningRejected, now)?;
                }
            }
            _ => {
                case.screening_attempts += 1;
                if case.screening_attempts >= JUDGE_SCREENING_MAX_ATTEMPTS {
                    self.void(&mut case, VoidReason::JudgeScreeningFailed, now)?;
                } else {
                    // Retry on a later tick; the interval is the backoff.
                    self.store.put_case(&case)?;
                }
            }
        }
        Ok(())
    }

    // ── Pre-session ──────────────────────────────────────────────────────────

    async fn tick_pre_session(&self, case: Case, now: Timestamp) -> Result<(), CourtError> {
        let due = case.scheduled_for.map(|t| now >= t).unwrap_or(false);
        if !due {
            return Ok(());
        }

        // Beacon / advisory fetches happen before the guarded section; the
        // guard must never be held across an await.
        let beacon = if case.mode == CaseMode::Jury {
            Some(self.drand.latest().await?)
        } else {
            None
        };
        // Judge-mode sessions open with a non-binding stage advisory; a
        // failed call is ignored.
        let advisory = if case.mode == CaseMode::Judge {
            let result = self
                .judge
                .stage_advisory(JudgeCall::StageAdvisory {
                    case_id: case.case_id.to_string(),
                    stage: SessionStage::OpeningAddresses.as_str().into(),
                })
                .await;
            result.data.filter(|v| !v.is_null())
        } else {
            None
        };

        let _guard = self.store.write_guard();
        // Re-read under the guard: a volunteer-defence acceptance may have
        // committed between the scan and this transition.
        let mut case = self.store.require_case(&case.case_id)?;
        if case.stage != SessionStage::PreSession {
            return Ok(());
        }

        if case.defence_agent_id.is_none() {
            return self.void(&mut case, VoidReason::MissingDefenceAssignment, now);
        }

        match case.mode {
            CaseMode::Judge => {
                case.stage_deadline = Some(now + self.config.stage_window_secs);
                let deadline = case.stage_deadline;
                self.enter_stage_logged(
                    &mut case,
                    SessionStage::OpeningAddresses,
                    deadline,
                    now,
                )?;
                if let Some(advisory) = advisory {
                    self.store.append_transcript(TranscriptEvent {
                        case_id: case.case_id.clone(),
                        seq: 0,
                        actor_role: ActorRole::Judge,
                        event_type: TranscriptEventType::StageMessage,
                        stage: case.stage.as_str().to_string(),
                        message: "judge stage advisory".into(),
                        artefact_id: None,
                        payload: Some(advisory),
                        at: now,
                    })?;
                }
                Ok(())
            }
            CaseMode::Jury => {
                let beacon = beacon.ok_or_else(|| {
                    CourtError::Internal("jury case reached pre_session without beacon".into())
                })?;

                let agents = self.store.iter_agents()?;
                let mut exclusions: HashSet<AgentId> =
                    [case.prosecution_agent_id.clone()].into_iter().collect();
                if let Some(defence) = &case.defence_agent_id {
                    exclusions.insert(defence.clone());
                }
                let filter = PoolFilter {
                    exclusions,
                    allowlist: None,
                };
                let week_ago = now - 7 * 86_400;
                let pool = eligible_pool(&agents, &filter, |id| {
                    self.store
                        .count_panel_service_since(id, week_ago)
                        .unwrap_or(u32::MAX)
                });

                let selection =
                    select_jury(&case.case_id, &pool, &beacon.randomness, self.config.panel_size);
                if selection.selected.len() < self.config.panel_size {
                    warn!(case = %case.case_id, pool = pool.len(), "juror pool too small");
                    return self.void(&mut case, VoidReason::JuryReadinessTimeout, now);
                }

                self.store.append_selection_run(&JurySelectionRun {
                    case_id: case.case_id.clone(),
                    kind: SelectionKind::Initial,
                    drand_round: beacon.round,
                    drand_randomness: beacon.randomness.clone(),
                    pool_snapshot_hash: selection.pool_snapshot_hash.clone(),
                    scored: selection.scored.clone(),
                    created_at: now,
                })?;

                for (seat, juror) in selection.selected.iter().enumerate() {
                    self.store.put_panel_member(&JuryPanelMember {
                        case_id: case.case_id.clone(),
                        juror_id: juror.clone(),
                        score_hash: selection.scored[seat].score_hash.clone(),
                        seat: seat as u32,
                        status: PanelStatus::PendingReady,
                        ready_deadline: Some(now + self.config.ready_window_secs),
                        voting_deadline: None,
                        replacement_of: None,
                        joined_at: now,
                    })?;
                }

                case.drand_round = Some(beacon.round);
                case.drand_randomness = Some(beacon.randomness);
                case.pool_snapshot_hash = Some(selection.pool_snapshot_hash);
                case.selection_proof = selection.scored;
                case.stage_deadline = Some(now + self.config.ready_window_secs);
                let deadline = case.stage_deadline;
                self.enter_stage_logged(
                    &mut case,
                    SessionStage::JuryReadiness,
                    deadline,
                    now,
                )
            }
        }
    }

    // ── Jury readiness ───────────────────────────────────────────────────────

    async fn tick_readiness(&self, case: Case, now: Timestamp) -> Result<(), CourtError> {
        let members = self.store.panel_for_case(&case.case_id)?;
        let ready = members
            .iter()
            .filter(|m| m.status == PanelStatus::Ready)
            .count();

        if ready >= self.config.panel_size {
            let _guard = self.store.write_guard();
            let mut case = self.store.require_case(&case.case_id)?;
            if case.stage != SessionStage::JuryReadiness {
                return Ok(());
            }
            case.stage_deadline = Some(now + self.config.stage_window_secs);
            let deadline = case.stage_deadline;
            return self.enter_stage_logged(
                &mut case,
                SessionStage::OpeningAddresses,
                deadline,
                now,
            );
        }

        // Replace members that let their readiness deadline lapse.
        let overdue: Vec<JuryPanelMember> = members
            .iter()
            .filter(|m| {
                m.status == PanelStatus::PendingReady
                    && m.ready_deadline.map(|d| now > d).unwrap_or(false)
            })
            .cloned()
            .collect();
        for member in overdue {
            if self.replace_member(&case.case_id, member, PanelStatus::PendingReady, now).await? {
                return Ok(()); // case voided inside
            }
        }

        // Window accounting: an expired readiness window consumes one of the
        // bounded retries.
        if case.stage_deadline.map(|d| now > d).unwrap_or(false) {
            let _guard = self.store.write_guard();
            let mut case = self.store.require_case(&case.case_id)?;
            if case.stage != SessionStage::JuryReadiness {
                return Ok(());
            }
            case.readiness_windows_used += 1;
            if case.readiness_windows_used >= self.config.max_readiness_windows {
                return self.void(&mut case, VoidReason::JuryReadinessTimeout, now);
            }
            case.stage_deadline = Some(now + self.config.ready_window_secs);
            self.store.put_case(&case)?;
            self.append_event(
                &case,
                ActorRole::Court,
                TranscriptEventType::StageDeadline,
                format!(
                    "readiness window {} of {} opened",
                    case.readiness_windows_used + 1,
                    self.config.max_readiness_windows
                ),
                now,
            )?;
        }
        Ok(())
    }

    // ── Submission stages ────────────────────────────────────────────────────

    fn tick_submission_stage(&self, case: Case, now: Timestamp) -> Result<(), CourtError> {
        let phase = match case.stage.submission_phase() {
            Some(p) => p,
            None => return Ok(()),
        };
        let prosecution = self
            .store
            .get_submission(&case.case_id, CaseSide::Prosecution, phase)?;
        let defence = self
            .store
            .get_submission(&case.case_id, CaseSide::Defence, phase)?;

        let _guard = self.store.write_guard();
        let mut case = self.store.require_case(&case.case_id)?;
        if case.stage.submission_phase() != Some(phase) {
            return Ok(());
        }

        if prosecution.is_some() && defence.is_some() {
            return match phase {
                SubmissionPhase::Opening => {
                    case.stage_deadline = Some(now + self.config.stage_window_secs);
                    let deadline = case.stage_deadline;
                    self.enter_stage_logged(&mut case, SessionStage::Evidence, deadline, now)
                }
                SubmissionPhase::Evidence => {
                    case.stage_deadline = Some(now + self.config.stage_window_secs);
                    let deadline = case.stage_deadline;
                    self.enter_stage_logged(
                        &mut case,
                        SessionStage::ClosingAddresses,
                        deadline,
                        now,
                    )
                }
                SubmissionPhase::Closing => {
                    case.stage_deadline = Some(now + self.config.stage_window_secs);
                    let deadline = case.stage_deadline;
                    self.enter_stage_logged(&mut case, SessionStage::SummingUp, deadline, now)
                }
                SubmissionPhase::SummingUp => self.open_voting(&mut case, now),
            };
        }

        if case.stage_deadline.map(|d| now > d).unwrap_or(false) {
            let reason = match phase {
                SubmissionPhase::Opening => VoidReason::MissingOpeningSubmission,
                SubmissionPhase::Evidence => VoidReason::MissingEvidenceSubmission,
                SubmissionPhase::Closing => VoidReason::MissingClosingSubmission,
                SubmissionPhase::SummingUp => VoidReason::MissingSummingSubmission,
            };
            return self.void(&mut case, reason, now);
        }
        Ok(())
    }

    /// Transition summing_up → voting: arm every seated juror.
    fn open_voting(&self, case: &mut Case, now: Timestamp) -> Result<(), CourtError> {
        for mut member in self.store.panel_for_case(&case.case_id)? {
            if member.is_seated() {
                member.status = PanelStatus::ActiveVoting;
                member.voting_deadline = Some(now + self.config.voting_window_secs);
                self.store.put_panel_member(&member)?;
            }
        }
        case.voting_hard_deadline = Some(now + self.config.voting_hard_window_secs);
        case.stage_deadline = case.voting_hard_deadline;
        self.enter_stage_logged(case, SessionStage::Voting, case.voting_hard_deadline, now)
    }

    // ── Voting ───────────────────────────────────────────────────────────────

    async fn tick_voting(&self, case: Case, now: Timestamp) -> Result<(), CourtError> {
        let members = self.store.panel_for_case(&case.case_id)?;
        let seated: Vec<&JuryPanelMember> = members.iter().filter(|m| m.is_seated()).collect();

        // Judge-mode cases have no panel: parties' summing-up already closed
        // the record, so the case closes immediately.
        let everyone_voted = !seated.is_empty()
            && seated.iter().all(|m| m.status == PanelStatus::Voted);
        if everyone_voted || (case.mode == CaseMode::Judge && seated.is_empty()) {
            return self.close_case(case.case_id.clone(), now).await;
        }

        if case.voting_hard_deadline.map(|d| now > d).unwrap_or(false) {
            let _guard = self.store.write_guard();
            let mut case = self.store.require_case(&case.case_id)?;
            if case.stage != SessionStage::Voting {
                return Ok(());
            }
            return self.void(&mut case, VoidReason::VotingTimeout, now);
        }

        let overdue: Vec<JuryPanelMember> = members
            .iter()
            .filter(|m| {
                m.status == PanelStatus::ActiveVoting
                    && m.voting_deadline.map(|d| now > d).unwrap_or(false)
            })
            .cloned()
            .collect();
        for member in overdue {
            if self.replace_member(&case.case_id, member, PanelStatus::ActiveVoting, now).await? {
                return Ok(());
            }
        }
        Ok(())
    }

    // ── Juror replacement ────────────────────────────────────────────────────

    /// Replace one panel member. Returns `true` when the case was voided
    /// (per-seat cap exceeded).
    async fn replace_member(
        &self,
        case_id: &CaseId,
        outgoing: JuryPanelMember,
        incoming_status: PanelStatus,
        now: Timestamp,
    ) -> Result<bool, CourtError> {
        let case = self.store.require_case(case_id)?;

        // Everyone who ever sat this case is ineligible, plus the parties.
        let members = self.store.panel_for_case(case_id)?;
        let mut ineligible: HashSet<AgentId> =
            members.iter().map(|m| m.juror_id.clone()).collect();
        ineligible.insert(case.prosecution_agent_id.clone());
        if let Some(defence) = &case.defence_agent_id {
            ineligible.insert(defence.clone());
        }

        // First the stored proof; only a dry proof costs a beacon call.
        let mut pick = replacement_from_proof(&case.selection_proof, &ineligible);
        let replacement_run = if pick.is_some() {
            // A pick from the proof is still recorded as an audit run,
            // reusing the original beacon inputs.
            JurySelectionRun {
                case_id: case_id.clone(),
                kind: SelectionKind::Replacement,
                drand_round: case.drand_round.unwrap_or(0),
                drand_randomness: case.drand_randomness.clone().unwrap_or_default(),
                pool_snapshot_hash: case.pool_snapshot_hash.clone().unwrap_or_default(),
                scored: vec![],
                created_at: now,
            }
        } else {
            let beacon = self.drand.round_after(case.drand_round.unwrap_or(0)).await?;
            let agents = self.store.iter_agents()?;
            let filter = PoolFilter {
                exclusions: ineligible.clone(),
                allowlist: None,
            };
            let week_ago = now - 7 * 86_400;
            let pool = eligible_pool(&agents, &filter, |id| {
                self.store
                    .count_panel_service_since(id, week_ago)
                    .unwrap_or(u32::MAX)
            });
            let selection = select_jury(case_id, &pool, &beacon.randomness, 1);
            pick = selection.selected.first().cloned();
            JurySelectionRun {
                case_id: case_id.clone(),
                kind: SelectionKind::Replacement,
                drand_round: beacon.round,
                drand_randomness: beacon.randomness,
                pool_snapshot_hash: selection.pool_snapshot_hash,
                scored: selection.scored,
                created_at: now,
            }
        };

        let _guard = self.store.write_guard();
        let mut case = self.store.require_case(case_id)?;
        if case.status.is_terminal() {
            return Ok(true);
        }

        let used = self.store.count_seat_replacements(case_id, outgoing.seat)?;
        if used >= self.config.max_seat_replacements || pick.is_none() {
            self.void(&mut case, VoidReason::ReplacementCapExceeded, now)?;
            return Ok(true);
        }
        let replacement_id = pick.ok_or_else(|| CourtError::Internal("pick vanished".into()))?;

        let mut outgoing = outgoing;
        outgoing.status = PanelStatus::Replaced;
        self.store.put_panel_member(&outgoing)?;

        let score_hash = case
            .selection_proof
            .iter()
            .find(|c| c.candidate_id == replacement_id)
            .map(|c| c.score_hash.clone())
            .unwrap_or_default();
        let deadline = match incoming_status {
            PanelStatus::PendingReady => now + self.config.ready_window_secs,
            _ => now + self.config.voting_window_secs,
        };
        self.store.put_panel_member(&JuryPanelMember {
            case_id: case_id.clone(),
            juror_id: replacement_id.clone(),
            score_hash,
            seat: outgoing.seat,
            status: incoming_status,
            ready_deadline: (incoming_status == PanelStatus::PendingReady).then_some(deadline),
            voting_deadline: (incoming_status == PanelStatus::ActiveVoting).then_some(deadline),
            replacement_of: Some(outgoing.juror_id.clone()),
            joined_at: now,
        })?;
        self.store.append_selection_run(&replacement_run)?;

        self.append_event(
            &case,
            ActorRole::Court,
            TranscriptEventType::JurorReplaced,
            format!(
                "juror {} replaced by {} (seat {})",
                outgoing.juror_id, replacement_id, outgoing.seat
            ),
            now,
        )?;
        info!(case = %case_id, seat = outgoing.seat, "juror replaced");
        Ok(false)
    }

    // ── Close pipeline ───────────────────────────────────────────────────────

    pub async fn close_case(&self, case_id: CaseId, now: Timestamp) -> Result<(), CourtError> {
        {
            let mut closing = self
                .closing
                .lock()
                .unwrap_or_else(|poison| poison.into_inner());
            if !closing.insert(case_id.clone()) {
                return Ok(()); // already in flight in this process
            }
        }
        let result = self.close_case_inner(&case_id, now).await;
        self.closing
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .remove(&case_id);
        result
    }

    async fn close_case_inner(&self, case_id: &CaseId, now: Timestamp) -> Result<(), CourtError> {
        let case = self.store.require_case(case_id)?;
        if case.stage != SessionStage::Voting {
            return Ok(());
        }

        let claims = self.store.claims_for_case(case_id)?;
        let ballots = self.store.ballots_for_case(case_id)?;
        let mut tallies = tally_claims(&claims, &ballots);

        // Tied claims go to the judge in judge mode; a failed tiebreak call
        // leaves the claim insufficient. Judge-mode cases with no panel have
        // no votes at all, so every claim is judge-decided.
        let mut tiebreaks = std::collections::HashMap::new();
        if case.mode == CaseMode::Judge {
            let undecided =
                |t: &&cawt_verdict::ClaimTally| t.tied || (t.proven + t.not_proven + t.insufficient) == 0;
            for tally in tallies.iter().filter(undecided) {
                let claim_summary = claims
                    .iter()
                    .find(|c| c.claim_id == tally.claim_id)
                    .map(|c| c.summary.clone())
                    .unwrap_or_default();
                let result = self
                    .judge
                    .tiebreak(JudgeCall::Tiebreak {
                        case_id: case_id.to_string(),
                        claim_id: tally.claim_id.to_string(),
                        claim_summary,
                        proven: tally.proven,
                        not_proven: tally.not_proven,
                    })
                    .await;
                if let (true, Some(finding)) = (result.ok, result.data) {
                    tiebreaks.insert(tally.claim_id.clone(), finding);
                }
            }
        }

        let outcome = resolve_outcome(&mut tallies, &tiebreaks);

        // Remedy recommendations live on the case row only — never in the
        // bundle, so the verdict hash stays stable.
        let judge_remedy = if case.mode == CaseMode::Judge
            && outcome == VerdictOutcome::ForProsecution
        {
            let result = self
                .judge
                .remedy(JudgeCall::Remedy {
                    case_id: case_id.to_string(),
                    outcome: "for_prosecution".into(),
                })
                .await;
            result.data.filter(|r| !r.is_empty())
        } else {
            None
        };

        let _guard = self.store.write_guard();
        let mut case = self.store.require_case(case_id)?;
        if case.stage != SessionStage::Voting {
            return Ok(());
        }

        if outcome == VerdictOutcome::Inconclusive {
            return self.void(&mut case, VoidReason::InconclusiveVerdict, now);
        }

        let evidence_hashes = self
            .store
            .evidence_for_case(case_id)?
            .into_iter()
            .map(|e| e.body_hash)
            .collect();
        let submission_hashes = self
            .store
            .submissions_for_case(case_id)?
            .into_iter()
            .map(|s| s.content_hash)
            .collect();
        let jury_size = self
            .store
            .panel_for_case(case_id)?
            .iter()
            .filter(|m| m.is_seated())
            .count();

        let bundle = VerdictBundle {
            case_id: case.case_id.clone(),
            prosecution: case.prosecution_agent_id.clone(),
            defence: case.defence_agent_id.clone(),
            outcome,
            closed_at_iso: to_iso(now),
            jury_size,
            claim_tallies: tallies,
            evidence_hashes,
            submission_hashes,
            drand_round: case.drand_round.unwrap_or(0),
            drand_randomness: case.drand_randomness.clone().unwrap_or_default(),
            pool_snapshot_hash: case.pool_snapshot_hash.clone().unwrap_or_default(),
            judge_tiebreaks: tiebreaks.into_iter().collect(),
        };
        let (bundle_json, verdict_hash) = build_verdict_bundle(&bundle);

        case.outcome = Some(match outcome {
            VerdictOutcome::ForProsecution => cawt_core::case::CaseOutcome::ForProsecution,
            VerdictOutcome::ForDefence => cawt_core::case::CaseOutcome::ForDefence,
            VerdictOutcome::Inconclusive => unreachable!("handled above"),
        });
        case.verdict_bundle = Some(bundle_json);
        case.verdict_hash = Some(verdict_hash.clone());
        case.judge_remedy = judge_remedy;
        case.closed_at = Some(now);
        case.seal_status = SealStatus::Queued;
        case.enter_stage(SessionStage::Closed);
        self.store.put_case(&case)?;
        self.append_event(
            &case,
            ActorRole::Court,
            TranscriptEventType::CaseClosed,
            format!("case closed: verdict {verdict_hash}"),
            now,
        )?;

        // The root covers every event up to and including the close.
        let events = self.store.transcript_for_case(case_id)?;
        case.transcript_root_hash = Some(transcript_root_hash(&events));
        self.store.put_case(&case)?;

        let selection_hash = self
            .store
            .selection_runs_for_case(case_id)?
            .iter()
            .find(|r| r.kind == SelectionKind::Initial)
            .map(selection_proof_hash)
            .unwrap_or_default();

        let request = WorkerSealRequest {
            job_id: JobId::generate(),
            case_id: case.case_id.clone(),
            verdict_hash,
            transcript_root_hash: case.transcript_root_hash.clone().unwrap_or_default(),
            jury_selection_proof_hash: selection_hash,
            decision_url: format!("{}/cases/{}", self.config.decision_base_url, case.case_id),
        };
        let job = enqueue_seal_job(&self.store, &request, now)?;
        drop(_guard);

        self.dispatch_seal(&job.job_id, now).await
    }

    // ── Seal dispatch ────────────────────────────────────────────────────────

    async fn dispatch_seal(&self, job_id: &JobId, now: Timestamp) -> Result<(), CourtError> {
        let job = self.store.get_seal_job(job_id)?.ok_or_else(|| CourtError::NotFound {
            entity: "seal job",
            id: job_id.to_string(),
        })?;
        if job.status.is_terminal() {
            return Ok(());
        }
        let request: WorkerSealRequest = serde_json::from_str(&job.request_json)
            .map_err(|e| CourtError::Serialization(e.to_string()))?;

        self.store.transition_seal_job(
            job_id,
            &[SealJobStatus::Queued, SealJobStatus::Failed],
            |j| {
                j.status = SealJobStatus::Minting;
                j.updated_at = now;
            },
        )?;

        match self.mint.seal_case(&request).await {
            Ok(mint) => {
                let result = WorkerSealResult {
                    job_id: job_id.clone(),
                    case_id: request.case_id.clone(),
                    verdict_hash: request.verdict_hash.clone(),
                    status: SealJobStatus::Minted,
                    asset_id: Some(mint.asset_id),
                    tx_sig: Some(mint.tx_sig),
                    metadata_uri: Some(mint.metadata_uri),
                    error: None,
                };
                apply_seal_result(&self.store, &result, now)?;
                Ok(())
            }
            Err(e) => mark_seal_failure(&self.store, job_id, &e.to_string(), now),
        }
    }

    /// Re-dispatch the most-stale queued/failed jobs, bounded per tick.
    async fn retry_stale_seal_jobs(&self, now: Timestamp) -> Result<(), CourtError> {
        for job in self.store.stale_seal_jobs(SEAL_RETRY_BATCH_PER_TICK)? {
            if let Err(e) = self.dispatch_seal(&job.job_id, now).await {
                warn!(job = %job.job_id, error = %e, "seal retry failed");
            }
        }
        Ok(())
    }

    // ── Shared helpers ───────────────────────────────────────────────────────

    fn enter_stage_logged(
        &self,
        case: &mut Case,
        stage: SessionStage,
        deadline: Option<Timestamp>,
        now: Timestamp,
    ) -> Result<(), CourtError> {
        case.enter_stage(stage);
        self.store.put_case(case)?;
        self.append_event(
            case,
            ActorRole::Court,
            TranscriptEventType::StageStarted,
            format!("stage {} started", stage.as_str()),
            now,
        )?;
        if let Some(deadline) = deadline {
            self.append_event(
                case,
                ActorRole::Court,
                TranscriptEventType::StageDeadline,
                format!("stage {} deadline {}", stage.as_str(), to_iso(deadline)),
                now,
            )?;
        }
        Ok(())
    }

    fn void(&self, case: &mut Case, reason: VoidReason, now: Timestamp) -> Result<(), CourtError> {
        case.void_reason = Some(reason);
        case.enter_stage(SessionStage::Void);
        self.store.put_case(case)?;
        self.append_event(
            case,
            ActorRole::Court,
            TranscriptEventType::CaseVoided,
            format!("case voided: {}", reason.as_str()),
            now,
        )?;
        info!(case = %case.case_id, reason = reason.as_str(), "case voided");
        Ok(())
    }

    fn append_event(
        &self,
        case: &Case,
        actor_role: ActorRole,
        event_type: TranscriptEventType,
        message: String,
        at: Timestamp,
    ) -> Result<(), CourtError> {
        self.store.append_transcript(TranscriptEvent {
            case_id: case.case_id.clone(),
            seq: 0,
            actor_role,
            event_type,
            stage: case.stage.as_str().to_string(),
            message,
            artefact_id: None,
            payload: None,
            at,
        })?;
        Ok(())
    }
}

