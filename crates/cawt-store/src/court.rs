//! Court-side repository operations: agents, cases and everything scoped to a
//! case (claims, evidence, submissions, ballots, panel, selection runs,
//! transcript, seal jobs).

use cawt_core::case::{
    Ballot, Case, CaseStatus, Claim, Evidence, JuryPanelMember, JurySelectionRun, Submission,
};
use cawt_core::error::CourtError;
use cawt_core::seal::{SealJob, SealJobStatus};
use cawt_core::transcript::TranscriptEvent;
use cawt_core::types::{AgentId, CaseId, JobId, Timestamp};
use cawt_core::Agent;

use crate::db::{codec_err, join_key, storage_err, Store};

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, CourtError> {
    bincode::deserialize(bytes).map_err(codec_err)
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, CourtError> {
    bincode::serialize(value).map_err(codec_err)
}

impl Store {
    // ── Agents ───────────────────────────────────────────────────────────────

    pub fn get_agent(&self, id: &AgentId) -> Result<Option<Agent>, CourtError> {
        match self.agents.get(id.as_str().as_bytes()).map_err(storage_err)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn put_agent(&self, agent: &Agent) -> Result<(), CourtError> {
        self.agents
            .insert(agent.agent_id.as_str().as_bytes(), encode(agent)?)
            .map_err(storage_err)?;
        Ok(())
    }

    pub fn iter_agents(&self) -> Result<Vec<Agent>, CourtError> {
        let mut out = Vec::new();
        for item in self.agents.iter() {
            let (_, bytes) = item.map_err(storage_err)?;
            out.push(decode(&bytes)?);
        }
        Ok(out)
    }

    // ── Cases ────────────────────────────────────────────────────────────────

    pub fn get_case(&self, id: &CaseId) -> Result<Option<Case>, CourtError> {
        match self.cases.get(id.as_str().as_bytes()).map_err(storage_err)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn require_case(&self, id: &CaseId) -> Result<Case, CourtError> {
        self.get_case(id)?.ok_or_else(|| CourtError::NotFound {
            entity: "case",
            id: id.to_string(),
        })
    }

    pub fn put_case(&self, case: &Case) -> Result<(), CourtError> {
        case.check_terminal_invariants()?;
        if case.status != CaseStatus::for_stage(case.stage) {
            return Err(CourtError::Internal(format!(
                "case {} status {:?} inconsistent with stage {:?}",
                case.case_id, case.status, case.stage
            )));
        }
        self.cases
            .insert(case.case_id.as_str().as_bytes(), encode(case)?)
            .map_err(storage_err)?;
        Ok(())
    }

    /// All cases the session engine must evaluate (non-terminal).
    pub fn iter_open_cases(&self) -> Result<Vec<Case>, CourtError> {
        let mut out = Vec::new();
        for item in self.cases.iter() {
            let (_, bytes) = item.map_err(storage_err)?;
            let case: Case = decode(&bytes)?;
            if !case.status.is_terminal() && case.status != CaseStatus::Draft {
                out.push(case);
            }
        }
        Ok(out)
    }

    /// Filings by `agent` since `since` (the daily soft-cap input).
    pub fn count_filings_since(
        &self,
        agent: &AgentId,
        since: Timestamp,
    ) -> Result<u32, CourtError> {
        let mut count = 0;
        for item in self.cases.iter() {
            let (_, bytes) = item.map_err(storage_err)?;
            let case: Case = decode(&bytes)?;
            if case.prosecution_agent_id == *agent
                && case.filed_at.map(|t| t >= since).unwrap_or(false)
            {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Compare-and-set the defence seat. Loses cleanly against a concurrent
    /// volunteer: exactly one caller sees `Ok`, every other sees
    /// `DEFENCE_ALREADY_ASSIGNED`.
    pub fn claim_defence_assignment(
        &self,
        case_id: &CaseId,
        agent: &AgentId,
        now: Timestamp,
    ) -> Result<Case, CourtError> {
        loop {
            let old_bytes = self
                .cases
                .get(case_id.as_str().as_bytes())
                .map_err(storage_err)?
                .ok_or_else(|| CourtError::NotFound {
                    entity: "case",
                    id: case_id.to_string(),
                })?;
            let mut case: Case = decode(&old_bytes)?;

            if case.defence_agent_id.is_some() {
                return Err(CourtError::DefenceAlreadyAssigned);
            }
            if case.prosecution_agent_id == *agent {
                return Err(CourtError::WrongParty(
                    "prosecution cannot take the defence seat".into(),
                ));
            }
            if let Some(deadline) = case.defence_deadline {
                if now > deadline {
                    return Err(CourtError::DeadlinePassed);
                }
            }

            case.defence_agent_id = Some(agent.clone());
            let new_bytes = encode(&case)?;
            let swap = self
                .cases
                .compare_and_swap(
                    case_id.as_str().as_bytes(),
                    Some(old_bytes),
                    Some(new_bytes),
                )
                .map_err(storage_err)?;
            match swap {
                Ok(()) => return Ok(case),
                Err(_) => continue, // row moved underneath us; re-read
            }
        }
    }

    // ── Claims ───────────────────────────────────────────────────────────────

    pub fn put_claim(&self, claim: &Claim) -> Result<(), CourtError> {
        let key = join_key(&[claim.case_id.as_str(), claim.claim_id.as_str()]);
        self.claims.insert(key, encode(claim)?).map_err(storage_err)?;
        Ok(())
    }

    pub fn claims_for_case(&self, case_id: &CaseId) -> Result<Vec<Claim>, CourtError> {
        self.scan_case_scoped(&self.claims, case_id)
    }

    // ── Evidence ─────────────────────────────────────────────────────────────

    pub fn put_evidence(&self, ev: &Evidence) -> Result<(), CourtError> {
        let key = join_key(&[ev.case_id.as_str(), ev.evidence_id.as_str()]);
        self.evidence.insert(key, encode(ev)?).map_err(storage_err)?;
        Ok(())
    }

    pub fn evidence_for_case(&self, case_id: &CaseId) -> Result<Vec<Evidence>, CourtError> {
        self.scan_case_scoped(&self.evidence, case_id)
    }

    // ── Submissions ──────────────────────────────────────────────────────────

    /// Insert-once per (case, side, phase).
    pub fn insert_submission(&self, sub: &Submission) -> Result<(), CourtError> {
        let key = join_key(&[
            sub.case_id.as_str(),
            sub.side.as_str(),
            sub.phase.as_str(),
        ]);
        let swap = self
            .submissions
            .compare_and_swap(key, None::<&[u8]>, Some(encode(sub)?))
            .map_err(storage_err)?;
        swap.map_err(|_| CourtError::SubmissionAlreadyReceived)
    }

    pub fn get_submission(
        &self,
        case_id: &CaseId,
        side: cawt_core::case::CaseSide,
        phase: cawt_core::case::SubmissionPhase,
    ) -> Result<Option<Submission>, CourtError> {
        let key = join_key(&[case_id.as_str(), side.as_str(), phase.as_str()]);
        match self.submissions.get(key).map_err(storage_err)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn submissions_for_case(&self, case_id: &CaseId) -> Result<Vec<Submission>, CourtError> {
        self.scan_case_scoped(&self.submissions, case_id)
    }

    // ── Ballots ──────────────────────────────────────────────────────────────

    /// Insert-once per (case, juror); the second write is the double-ballot.
    pub fn insert_ballot(&self, ballot: &Ballot) -> Result<(), CourtError> {
        let key = join_key(&[ballot.case_id.as_str(), ballot.juror_id.as_str()]);
        let swap = self
            .ballots
            .compare_and_swap(key, None::<&[u8]>, Some(encode(ballot)?))
            .map_err(storage_err)?;
        swap.map_err(|_| CourtError::BallotAlreadySubmitted)
    }

    pub fn get_ballot(
        &self,
        case_id: &CaseId,
        juror: &AgentId,
    ) -> Result<Option<Ballot>, CourtError> {
        let key = join_key(&[case_id.as_str(), juror.as_str()]);
        match self.ballots.get(key).map_err(storage_err)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn ballots_for_case(&self, case_id: &CaseId) -> Result<Vec<Ballot>, CourtError> {
        self.scan_case_scoped(&self.ballots, case_id)
    }

    // ── Jury panel ───────────────────────────────────────────────────────────

    pub fn put_panel_member(&self, member: &JuryPanelMember) -> Result<(), CourtError> {
        let key = join_key(&[member.case_id.as_str(), member.juror_id.as_str()]);
        self.panel.insert(key, encode(member)?).map_err(storage_err)?;
        Ok(())
    }

    pub fn get_panel_member(
        &self,
        case_id: &CaseId,
        juror: &AgentId,
    ) -> Result<Option<JuryPanelMember>, CourtError> {
        let key = join_key(&[case_id.as_str(), juror.as_str()]);
        match self.panel.get(key).map_err(storage_err)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn panel_for_case(&self, case_id: &CaseId) -> Result<Vec<JuryPanelMember>, CourtError> {
        self.scan_case_scoped(&self.panel, case_id)
    }

    /// Replacements consumed for one seat of one case.
    pub fn count_seat_replacements(
        &self,
        case_id: &CaseId,
        seat: u32,
    ) -> Result<u32, CourtError> {
        let members = self.panel_for_case(case_id)?;
        Ok(members
            .iter()
            .filter(|m| m.seat == seat && m.replacement_of.is_some())
            .count() as u32)
    }

    /// Panels this juror joined since `since` (weekly-limit input).
    pub fn count_panel_service_since(
        &self,
        juror: &AgentId,
        since: Timestamp,
    ) -> Result<u32, CourtError> {
        let mut count = 0;
        for item in self.panel.iter() {
            let (_, bytes) = item.map_err(storage_err)?;
            let member: JuryPanelMember = decode(&bytes)?;
            if member.juror_id == *juror && member.joined_at >= since {
                count += 1;
            }
        }
        Ok(count)
    }

    // ── Selection runs ───────────────────────────────────────────────────────

    pub fn append_selection_run(&self, run: &JurySelectionRun) -> Result<u64, CourtError> {
        let seq = self.next_counter(&format!("selection_runs|{}", run.case_id))?;
        let mut key = run.case_id.as_str().as_bytes().to_vec();
        key.push(crate::db::SEP);
        key.extend_from_slice(&seq.to_be_bytes());
        self.selection_runs
            .insert(key, encode(run)?)
            .map_err(storage_err)?;
        Ok(seq)
    }

    pub fn selection_runs_for_case(
        &self,
        case_id: &CaseId,
    ) -> Result<Vec<JurySelectionRun>, CourtError> {
        self.scan_case_scoped(&self.selection_runs, case_id)
    }

    // ── Transcript ───────────────────────────────────────────────────────────

    /// Append a transcript event, allocating its per-case sequence number.
    /// Callers performing a state change hold `write_guard()` across both
    /// writes, which makes the transcript the serial history of the case.
    pub fn append_transcript(&self, mut event: TranscriptEvent) -> Result<u64, CourtError> {
        let seq = self.next_counter(&format!("transcript|{}", event.case_id))?;
        event.seq = seq;
        let mut key = event.case_id.as_str().as_bytes().to_vec();
        key.push(crate::db::SEP);
        key.extend_from_slice(&seq.to_be_bytes());
        self.transcript
            .insert(key, encode(&event)?)
            .map_err(storage_err)?;
        Ok(seq)
    }

    /// Events in sequence order (big-endian keys sort correctly).
    pub fn transcript_for_case(
        &self,
        case_id: &CaseId,
    ) -> Result<Vec<TranscriptEvent>, CourtError> {
        self.scan_case_scoped(&self.transcript, case_id)
    }

    // ── Seal jobs ────────────────────────────────────────────────────────────

    /// Create the case's seal job unless one already exists; returns the job
    /// that is now authoritative either way.
    pub fn create_seal_job_if_absent(&self, job: &SealJob) -> Result<SealJob, CourtError> {
        let swap = self
            .seal_jobs_by_case
            .compare_and_swap(
                job.case_id.as_str().as_bytes(),
                None::<&[u8]>,
                Some(job.job_id.as_str().as_bytes()),
            )
            .map_err(storage_err)?;
        match swap {
            Ok(()) => {
                self.seal_jobs
                    .insert(job.job_id.as_str().as_bytes(), encode(job)?)
                    .map_err(storage_err)?;
                Ok(job.clone())
            }
            Err(prior) => {
                let existing_id = prior
                    .current
                    .map(|b| String::from_utf8_lossy(&b).to_string())
                    .ok_or_else(|| CourtError::Internal("seal job index vanished".into()))?;
                self.get_seal_job(&JobId(existing_id.clone()))?.ok_or_else(|| {
                    CourtError::Internal(format!("seal job index dangles: {existing_id}"))
                })
            }
        }
    }

    pub fn get_seal_job(&self, id: &JobId) -> Result<Option<SealJob>, CourtError> {
        match self.seal_jobs.get(id.as_str().as_bytes()).map_err(storage_err)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn seal_job_for_case(&self, case_id: &CaseId) -> Result<Option<SealJob>, CourtError> {
        match self
            .seal_jobs_by_case
            .get(case_id.as_str().as_bytes())
            .map_err(storage_err)?
        {
            Some(id_bytes) => {
                let id = JobId(String::from_utf8_lossy(&id_bytes).to_string());
                self.get_seal_job(&id)
            }
            None => Ok(None),
        }
    }

    pub fn put_seal_job(&self, job: &SealJob) -> Result<(), CourtError> {
        self.seal_jobs
            .insert(job.job_id.as_str().as_bytes(), encode(job)?)
            .map_err(storage_err)?;
        Ok(())
    }

    /// Compare-and-swap a status transition; a concurrent transition away
    /// from `expected` surfaces as a conflict.
    pub fn transition_seal_job(
        &self,
        id: &JobId,
        expected: &[SealJobStatus],
        apply: impl Fn(&mut SealJob),
    ) -> Result<SealJob, CourtError> {
        loop {
            let old_bytes = self
                .seal_jobs
                .get(id.as_str().as_bytes())
                .map_err(storage_err)?
                .ok_or_else(|| CourtError::NotFound {
                    entity: "seal job",
                    id: id.to_string(),
                })?;
            let mut job: SealJob = decode(&old_bytes)?;
            if !expected.contains(&job.status) {
                return Err(CourtError::SealResultConflict);
            }
            apply(&mut job);
            let swap = self
                .seal_jobs
                .compare_and_swap(id.as_str().as_bytes(), Some(old_bytes), Some(encode(&job)?))
                .map_err(storage_err)?;
            match swap {
                Ok(()) => return Ok(job),
                Err(_) => continue,
            }
        }
    }

    /// The most-stale dispatchable jobs, oldest update first.
    pub fn stale_seal_jobs(&self, limit: usize) -> Result<Vec<SealJob>, CourtError> {
        let mut jobs = Vec::new();
        for item in self.seal_jobs.iter() {
            let (_, bytes) = item.map_err(storage_err)?;
            let job: SealJob = decode(&bytes)?;
            if matches!(job.status, SealJobStatus::Queued | SealJobStatus::Failed) {
                jobs.push(job);
            }
        }
        jobs.sort_by_key(|j| j.updated_at);
        jobs.truncate(limit);
        Ok(jobs)
    }

    // ── Shared scan helper ───────────────────────────────────────────────────

    fn scan_case_scoped<T: serde::de::DeserializeOwned>(
        &self,
        tree: &sled::Tree,
        case_id: &CaseId,
    ) -> Result<Vec<T>, CourtError> {
        let mut prefix = case_id.as_str().as_bytes().to_vec();
        prefix.push(crate::db::SEP);
        let mut out = Vec::new();
        for item in tree.scan_prefix(prefix) {
            let (_, bytes) = item.map_err(storage_err)?;
            out.push(decode(&bytes)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testutil::temp_store;
    use cawt_core::case::{CaseMode, CaseSide, SessionStage, SubmissionPhase};
    use cawt_core::transcript::{ActorRole, TranscriptEventType};
    use cawt_core::types::{ClaimId, EvidenceId, SubmissionId};

    fn agent(n: u8) -> AgentId {
        AgentId::from_public_key_bytes(&[n; 32])
    }

    fn draft_case(store: &Store, prosecution: AgentId) -> Case {
        let case = Case::draft(
            CaseId::generate(),
            prosecution,
            CaseMode::Jury,
            "contract breach".into(),
            1_000,
        );
        store.put_case(&case).unwrap();
        case
    }

    #[test]
    fn case_round_trip() {
        let store = temp_store();
        let case = draft_case(&store, agent(1));
        let loaded = store.require_case(&case.case_id).unwrap();
        assert_eq!(loaded.topic, "contract breach");
        assert_eq!(loaded.stage, SessionStage::Draft);
    }

    #[test]
    fn inconsistent_stage_status_is_rejected() {
        let store = temp_store();
        let mut case = draft_case(&store, agent(1));
        case.stage = SessionStage::Voting; // status left at Draft
        assert!(store.put_case(&case).is_err());
    }

    #[test]
    fn defence_claim_is_once_only() {
        let store = temp_store();
        let mut case = draft_case(&store, agent(1));
        case.open_defence = true;
        case.defence_deadline = Some(5_000);
        store.put_case(&case).unwrap();

        let won = store
            .claim_defence_assignment(&case.case_id, &agent(2), 2_000)
            .unwrap();
        assert_eq!(won.defence_agent_id, Some(agent(2)));

        let lost = store.claim_defence_assignment(&case.case_id, &agent(3), 2_001);
        assert!(matches!(lost, Err(CourtError::DefenceAlreadyAssigned)));
    }

    #[test]
    fn defence_claim_respects_deadline_and_party() {
        let store = temp_store();
        let mut case = draft_case(&store, agent(1));
        case.open_defence = true;
        case.defence_deadline = Some(5_000);
        store.put_case(&case).unwrap();

        assert!(matches!(
            store.claim_defence_assignment(&case.case_id, &agent(1), 2_000),
            Err(CourtError::WrongParty(_))
        ));
        assert!(matches!(
            store.claim_defence_assignment(&case.case_id, &agent(2), 9_000),
            Err(CourtError::DeadlinePassed)
        ));
    }

    #[test]
    fn double_ballot_conflicts() {
        let store = temp_store();
        let case = draft_case(&store, agent(1));
        let ballot = Ballot {
            case_id: case.case_id.clone(),
            juror_id: agent(5),
            votes: vec![],
            overall: cawt_core::case::OverallVote::ForDefence,
            reasoning_summary: "no case to answer".into(),
            principles_relied_on: vec!["P1".into()],
            ballot_hash: "bh".into(),
            signature: "sig".into(),
            submitted_at: 10,
        };
        store.insert_ballot(&ballot).unwrap();
        assert!(matches!(
            store.insert_ballot(&ballot),
            Err(CourtError::BallotAlreadySubmitted)
        ));
    }

    #[test]
    fn submission_unique_per_side_phase() {
        let store = temp_store();
        let case = draft_case(&store, agent(1));
        let sub = Submission {
            submission_id: SubmissionId::generate(),
            case_id: case.case_id.clone(),
            side: CaseSide::Prosecution,
            phase: SubmissionPhase::Opening,
            text: "we will show".into(),
            principle_citations: vec![],
            evidence_citations: vec![],
            content_hash: "ch".into(),
            submitted_at: 10,
        };
        store.insert_submission(&sub).unwrap();
        assert!(matches!(
            store.insert_submission(&sub),
            Err(CourtError::SubmissionAlreadyReceived)
        ));
        // Same phase, other side is fine.
        let mut defence = sub.clone();
        defence.submission_id = SubmissionId::generate();
        defence.side = CaseSide::Defence;
        store.insert_submission(&defence).unwrap();
    }

    #[test]
    fn transcript_sequences_monotonically() {
        let store = temp_store();
        let case = draft_case(&store, agent(1));
        for i in 0..3 {
            let seq = store
                .append_transcript(TranscriptEvent {
                    case_id: case.case_id.clone(),
                    seq: 0,
                    actor_role: ActorRole::Court,
                    event_type: TranscriptEventType::StageStarted,
                    stage: "pre_session".into(),
                    message: format!("event {i}"),
                    artefact_id: None,
                    payload: None,
                    at: 100 + i,
                })
                .unwrap();
            assert_eq!(seq, i as u64 + 1);
        }
        let events = store.transcript_for_case(&case.case_id).unwrap();
        assert_eq!(events.len(), 3);
        assert!(events.windows(2).all(|w| w[0].seq < w[1].seq));
    }

    #[test]
    fn one_seal_job_per_case() {
        let store = temp_store();
        let case = draft_case(&store, agent(1));
        let job = SealJob {
            job_id: JobId::generate(),
            case_id: case.case_id.clone(),
            request_json: "{}".into(),
            payload_hash: "ph".into(),
            status: SealJobStatus::Queued,
            attempts: 0,
            response_json: None,
            last_error: None,
            created_at: 1,
            updated_at: 1,
        };
        let first = store.create_seal_job_if_absent(&job).unwrap();
        assert_eq!(first.job_id, job.job_id);

        let mut second = job.clone();
        second.job_id = JobId::generate();
        let existing = store.create_seal_job_if_absent(&second).unwrap();
        assert_eq!(existing.job_id, job.job_id, "second create returns the original");
    }

    #[test]
    fn seal_job_transition_guards_status() {
        let store = temp_store();
        let case = draft_case(&store, agent(1));
        let job = SealJob {
            job_id: JobId::generate(),
            case_id: case.case_id.clone(),
            request_json: "{}".into(),
            payload_hash: "ph".into(),
            status: SealJobStatus::Queued,
            attempts: 0,
            response_json: None,
            last_error: None,
            created_at: 1,
            updated_at: 1,
        };
        store.create_seal_job_if_absent(&job).unwrap();

        let minted = store
            .transition_seal_job(&job.job_id, &[SealJobStatus::Queued, SealJobStatus::Minting], |j| {
                j.status = SealJobStatus::Minted;
            })
            .unwrap();
        assert_eq!(minted.status, SealJobStatus::Minted);

        let err = store.transition_seal_job(&job.job_id, &[SealJobStatus::Queued], |j| {
            j.status = SealJobStatus::Failed;
        });
        assert!(matches!(err, Err(CourtError::SealResultConflict)));
    }

    #[test]
    fn claims_and_evidence_scoped_to_case() {
        let store = temp_store();
        let a = draft_case(&store, agent(1));
        let b = draft_case(&store, agent(2));
        store
            .put_claim(&Claim {
                claim_id: ClaimId::generate(),
                case_id: a.case_id.clone(),
                summary: "breach".into(),
                requested_remedy: "apology".into(),
                alleged_principles: vec!["P2".into()],
                created_at: 1,
            })
            .unwrap();
        store
            .put_evidence(&Evidence {
                evidence_id: EvidenceId::generate(),
                case_id: b.case_id.clone(),
                side: CaseSide::Prosecution,
                kind: cawt_core::case::EvidenceKind::Log,
                title: "trace".into(),
                body: "lines".into(),
                attachment_url: None,
                body_hash: "bh".into(),
                submitted_at: 2,
            })
            .unwrap();
        assert_eq!(store.claims_for_case(&a.case_id).unwrap().len(), 1);
        assert_eq!(store.claims_for_case(&b.case_id).unwrap().len(), 0);
        assert_eq!(store.evidence_for_case(&b.case_id).unwrap().len(), 1);
    }
}
