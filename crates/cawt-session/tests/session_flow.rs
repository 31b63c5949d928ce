//! End-to-end session-engine scenarios against an in-memory deployment:
//! stub beacon, stub judge, stub mint worker, real store and engine.

use std::sync::Arc;
use std::time::Duration;

use cawt_clients::{DrandClient, JudgeClient, MintWorkerClient};
use cawt_core::case::{
    CaseMode, CaseStatus, ClaimVote, EvidenceKind, Finding, OverallVote, PanelStatus,
    SealStatus, SessionStage, VoidReason,
};
use cawt_core::error::CourtError;
use cawt_core::seal::WorkerSealResult;
use cawt_core::transcript::TranscriptEventType;
use cawt_core::types::{AgentId, CaseId};
use cawt_core::Agent;
use cawt_crypto::ed25519::KeyPair;
use cawt_crypto::hash::sha256_bytes;
use cawt_session::{
    apply_seal_result, BallotInput, CourtService, DraftCaseInput, EngineConfig, EvidenceInput,
    SessionEngine, StageMessageInput,
};
use cawt_store::Store;
use cawt_verdict::ballot_content_hash;

// ── Harness ──────────────────────────────────────────────────────────────────

struct Harness {
    store: Arc<Store>,
    court: CourtService,
    engine: Arc<SessionEngine>,
    prosecution: KeyPair,
    defence: KeyPair,
    jurors: Vec<KeyPair>,
}

fn harness(juror_count: usize) -> Harness {
    use rand::RngCore;
    let mut tag = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut tag);
    let path = std::env::temp_dir().join(format!(
        "cawt_session_flow_{}_{:02x?}",
        std::process::id(),
        tag
    ));
    let store = Arc::new(Store::open(path).expect("open temp store"));

    let prosecution = KeyPair::generate();
    let defence = KeyPair::generate();
    let mut jurors = Vec::new();

    let register = |store: &Arc<Store>, id: &AgentId, juror_eligible: bool| {
        let mut agent = Agent::new(id.clone(), 0);
        agent.juror_eligible = juror_eligible;
        store.put_agent(&agent).unwrap();
    };
    register(&store, &prosecution.agent_id, false);
    register(&store, &defence.agent_id, false);
    for _ in 0..juror_count {
        let kp = KeyPair::generate();
        register(&store, &kp.agent_id, true);
        jurors.push(kp);
    }

    let config = EngineConfig {
        tick_interval: Duration::from_secs(5),
        panel_size: 3,
        ready_window_secs: 60,
        voting_window_secs: 120,
        voting_hard_window_secs: 600,
        stage_window_secs: 300,
        max_readiness_windows: 3,
        max_seat_replacements: 2,
        decision_base_url: "https://court.test".into(),
    };
    let engine = SessionEngine::new(
        Arc::clone(&store),
        DrandClient::stub("flow-seed"),
        JudgeClient::stub(true),
        MintWorkerClient::stub(),
        config,
    );

    Harness {
        court: CourtService::new(Arc::clone(&store)),
        store,
        engine,
        prosecution,
        defence,
        jurors,
    }
}

fn draft_input(defendant: Option<AgentId>, open_defence: bool) -> DraftCaseInput {
    DraftCaseInput {
        mode: CaseMode::Jury,
        topic: "breach of a data-sharing agreement".into(),
        stake_level: 2,
        requested_remedy: "public apology".into(),
        claim_summary: "defendant resold shared data".into(),
        claims: vec![(
            "resold the dataset to a third party".into(),
            "apology".into(),
            vec!["P2".into(), "P5".into()],
        )],
        defendant,
        open_defence,
        scheduled_for: None,
    }
}

/// File a case and take it to the jury_readiness stage.
fn to_readiness(h: &Harness, t0: i64) -> CaseId {
    let case = h
        .court
        .draft_case(
            &h.prosecution.agent_id,
            draft_input(Some(h.defence.agent_id.clone()), false),
            t0,
        )
        .unwrap();
    h.court.file_case(&case.case_id, &h.prosecution.agent_id, t0).unwrap();
    h.court
        .volunteer_defence(&case.case_id, &h.defence.agent_id, t0 + 10)
        .unwrap();
    case.case_id
}

fn submit_both_sides(h: &Harness, case_id: &CaseId, text: &str, now: i64) {
    for agent in [&h.prosecution.agent_id, &h.defence.agent_id] {
        h.court
            .stage_message(
                case_id,
                agent,
                StageMessageInput {
                    text: text.into(),
                    principle_citations: vec!["P2".into()],
                    evidence_citations: vec![],
                },
                now,
            )
            .unwrap();
    }
}

fn signed_ballot(h: &Harness, case_id: &CaseId, juror: &KeyPair, finding: Finding) -> BallotInput {
    let claims = h.store.claims_for_case(case_id).unwrap();
    let votes: Vec<ClaimVote> = claims
        .iter()
        .map(|c| ClaimVote {
            claim_id: c.claim_id.clone(),
            finding,
            severity: 2,
            recommended_remedy: None,
        })
        .collect();
    // Recompute the hash the service will compute, then sign its digest.
    let preview = cawt_core::case::Ballot {
        case_id: case_id.clone(),
        juror_id: juror.agent_id.clone(),
        votes: votes.clone(),
        overall: OverallVote::ForProsecution,
        reasoning_summary: "the evidence was specific and unrebutted".into(),
        principles_relied_on: vec!["P2".into()],
        ballot_hash: String::new(),
        signature: String::new(),
        submitted_at: 0,
    };
    let hash = ballot_content_hash(&preview);
    BallotInput {
        votes,
        overall: OverallVote::ForProsecution,
        reasoning_summary: "the evidence was specific and unrebutted".into(),
        principles_relied_on: vec!["P2".into()],
        signature: juror.sign_b64(&sha256_bytes(hash.as_bytes())),
    }
}

// ── Scenarios ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn open_defence_case_voids_without_volunteer() {
    let h = harness(5);
    let t0 = 1_000_000;
    let case = h
        .court
        .draft_case(&h.prosecution.agent_id, draft_input(None, true), t0)
        .unwrap();
    h.court.file_case(&case.case_id, &h.prosecution.agent_id, t0).unwrap();

    // Before the cutoff nothing happens.
    h.engine.tick(t0 + 30).await;
    assert_eq!(
        h.store.require_case(&case.case_id).unwrap().stage,
        SessionStage::PreSession
    );

    // One tick after the cutoff the case is void with the dedicated reason.
    h.engine.tick(t0 + 3_601).await;
    let voided = h.store.require_case(&case.case_id).unwrap();
    assert_eq!(voided.status, CaseStatus::Void);
    assert_eq!(voided.void_reason, Some(VoidReason::MissingDefenceAssignment));
}

#[tokio::test]
async fn defence_acceptance_wins_the_race_and_jury_is_selected() {
    let h = harness(5);
    let t0 = 1_000_000;
    let case_id = to_readiness(&h, t0);

    h.engine.tick(t0 + 3_600).await;
    let case = h.store.require_case(&case_id).unwrap();
    assert_eq!(case.stage, SessionStage::JuryReadiness);
    assert_eq!(case.status, CaseStatus::JurySelected);
    assert!(case.drand_round.is_some());
    assert!(case.pool_snapshot_hash.is_some());
    assert_eq!(case.selection_proof.len(), 5, "proof covers the whole pool");

    let panel = h.store.panel_for_case(&case_id).unwrap();
    assert_eq!(panel.len(), 3);
    assert!(panel.iter().all(|m| m.status == PanelStatus::PendingReady));
    // Parties never sit their own jury.
    assert!(panel.iter().all(|m| m.juror_id != h.prosecution.agent_id));
    assert!(panel.iter().all(|m| m.juror_id != h.defence.agent_id));
}

#[tokio::test]
async fn unready_juror_is_replaced_from_the_proof() {
    let h = harness(5);
    let t0 = 1_000_000;
    let case_id = to_readiness(&h, t0);
    h.engine.tick(t0 + 3_600).await;

    let panel = h.store.panel_for_case(&case_id).unwrap();
    let laggard = panel[0].clone();
    for member in panel.iter().skip(1) {
        h.court
            .juror_ready(&case_id, &member.juror_id, t0 + 3_610)
            .unwrap();
    }

    // Past the readiness deadline: the laggard is replaced, others stand.
    h.engine.tick(t0 + 3_600 + 61).await;
    let panel = h.store.panel_for_case(&case_id).unwrap();
    let replaced = panel
        .iter()
        .find(|m| m.juror_id == laggard.juror_id)
        .unwrap();
    assert_eq!(replaced.status, PanelStatus::Replaced);

    let replacement = panel
        .iter()
        .find(|m| m.replacement_of.as_ref() == Some(&laggard.juror_id))
        .expect("replacement seated");
    assert_eq!(replacement.status, PanelStatus::PendingReady);
    assert_eq!(replacement.seat, laggard.seat);

    let events = h.store.transcript_for_case(&case_id).unwrap();
    assert!(events
        .iter()
        .any(|e| e.event_type == TranscriptEventType::JurorReplaced));

    // The replacement readies up; the panel completes.
    h.court
        .juror_ready(&case_id, &replacement.juror_id, t0 + 3_600 + 70)
        .unwrap();
    h.engine.tick(t0 + 3_600 + 80).await;
    assert_eq!(
        h.store.require_case(&case_id).unwrap().stage,
        SessionStage::OpeningAddresses
    );
}

#[tokio::test]
async fn full_session_reaches_sealed_with_stable_verdict() {
    let h = harness(5);
    let t0 = 1_000_000;
    let case_id = to_readiness(&h, t0);

    // Prosecution files evidence while drafting is no longer possible; use
    // the evidence stage below. First: jury selection + readiness.
    h.engine.tick(t0 + 3_600).await;
    for member in h.store.panel_for_case(&case_id).unwrap() {
        h.court
            .juror_ready(&case_id, &member.juror_id, t0 + 3_610)
            .unwrap();
    }
    h.engine.tick(t0 + 3_620).await;
    assert_eq!(
        h.store.require_case(&case_id).unwrap().stage,
        SessionStage::OpeningAddresses
    );

    let mut now = t0 + 3_700;
    submit_both_sides(&h, &case_id, "opening address", now);
    h.engine.tick(now + 10).await;
    assert_eq!(
        h.store.require_case(&case_id).unwrap().stage,
        SessionStage::Evidence
    );

    now += 100;
    h.court
        .submit_evidence(
            &case_id,
            &h.prosecution.agent_id,
            EvidenceInput {
                kind: EvidenceKind::Log,
                title: "resale ledger".into(),
                body: "2026-02-01 sold dataset to agentX".into(),
                attachment_url: None,
            },
            now,
        )
        .unwrap();
    submit_both_sides(&h, &case_id, "evidence phase remarks", now);
    h.engine.tick(now + 10).await;
    assert_eq!(
        h.store.require_case(&case_id).unwrap().stage,
        SessionStage::ClosingAddresses
    );

    now += 100;
    submit_both_sides(&h, &case_id, "closing address", now);
    h.engine.tick(now + 10).await;

    now += 100;
    submit_both_sides(&h, &case_id, "summing up", now);
    h.engine.tick(now + 10).await;
    let case = h.store.require_case(&case_id).unwrap();
    assert_eq!(case.stage, SessionStage::Voting);
    assert!(case.voting_hard_deadline.is_some());

    // Every active juror votes proven.
    now += 100;
    let panel = h.store.panel_for_case(&case_id).unwrap();
    for member in panel.iter().filter(|m| m.status == PanelStatus::ActiveVoting) {
        let juror = h
            .jurors
            .iter()
            .find(|j| j.agent_id == member.juror_id)
            .expect("juror key");
        h.court
            .submit_ballot(&case_id, &juror.agent_id, signed_ballot(&h, &case_id, juror, Finding::Proven), now)
            .unwrap();
    }

    h.engine.tick(now + 10).await;
    let sealed = h.store.require_case(&case_id).unwrap();
    assert_eq!(sealed.status, CaseStatus::Sealed);
    assert_eq!(sealed.seal_status, SealStatus::Minted);
    assert_eq!(sealed.outcome, Some(cawt_core::case::CaseOutcome::ForProsecution));
    let verdict_hash = sealed.verdict_hash.clone().expect("verdict hash");
    assert_eq!(verdict_hash.len(), 64);
    assert!(sealed.transcript_root_hash.is_some());
    assert!(sealed.seal_asset_id.is_some());
    assert!(sealed.metadata_uri.is_some());

    // Seal replay: posting the identical result again succeeds and changes
    // nothing; a tampered result conflicts.
    let job = h.store.seal_job_for_case(&case_id).unwrap().expect("job");
    let stored: WorkerSealResult = serde_json::from_str(job.response_json.as_deref().unwrap()).unwrap();
    apply_seal_result(&h.store, &stored, now + 20).unwrap();
    assert_eq!(
        h.store.require_case(&case_id).unwrap().status,
        CaseStatus::Sealed
    );

    let mut tampered = stored.clone();
    tampered.asset_id = Some("forged".into());
    assert!(matches!(
        apply_seal_result(&h.store, &tampered, now + 30),
        Err(CourtError::SealResultConflict)
    ));

    // Double ballot after sealing is still a conflict, not a crash.
    let juror = &h.jurors[0];
    let late = h.court.submit_ballot(
        &case_id,
        &juror.agent_id,
        signed_ballot(&h, &case_id, juror, Finding::Proven),
        now + 40,
    );
    assert!(late.is_err());
}

#[tokio::test]
async fn double_ballot_is_conflict() {
    let h = harness(5);
    let t0 = 1_000_000;
    let case_id = to_readiness(&h, t0);
    h.engine.tick(t0 + 3_600).await;
    for member in h.store.panel_for_case(&case_id).unwrap() {
        h.court.juror_ready(&case_id, &member.juror_id, t0 + 3_610).unwrap();
    }
    h.engine.tick(t0 + 3_620).await;
    let mut now = t0 + 3_700;
    for text in ["opening", "evidence", "closing", "summing"] {
        submit_both_sides(&h, &case_id, text, now);
        h.engine.tick(now + 10).await;
        now += 100;
    }
    assert_eq!(
        h.store.require_case(&case_id).unwrap().stage,
        SessionStage::Voting
    );

    let member = &h.store.panel_for_case(&case_id).unwrap()[0];
    let juror = h
        .jurors
        .iter()
        .find(|j| j.agent_id == member.juror_id)
        .unwrap();
    h.court
        .submit_ballot(&case_id, &juror.agent_id, signed_ballot(&h, &case_id, juror, Finding::NotProven), now)
        .unwrap();
    let second = h.court.submit_ballot(
        &case_id,
        &juror.agent_id,
        signed_ballot(&h, &case_id, juror, Finding::NotProven),
        now + 1,
    );
    // The member left active_voting when the first ballot landed.
    assert!(second.is_err());
}

#[tokio::test]
async fn judge_mode_case_screens_and_closes_without_a_panel() {
    let h = harness(0);
    let t0 = 1_000_000;
    let mut input = draft_input(Some(h.defence.agent_id.clone()), false);
    input.mode = CaseMode::Judge;
    let case = h
        .court
        .draft_case(&h.prosecution.agent_id, input, t0)
        .unwrap();
    h.court.file_case(&case.case_id, &h.prosecution.agent_id, t0).unwrap();
    assert_eq!(
        h.store.require_case(&case.case_id).unwrap().stage,
        SessionStage::JudgeScreening
    );
    h.court
        .volunteer_defence(&case.case_id, &h.defence.agent_id, t0 + 5)
        .unwrap();

    // Screening approves (stub judge), then the session opens at its
    // scheduled time with no jury selection.
    h.engine.tick(t0 + 10).await;
    assert_eq!(
        h.store.require_case(&case.case_id).unwrap().stage,
        SessionStage::PreSession
    );
    h.engine.tick(t0 + 3_600).await;
    assert_eq!(
        h.store.require_case(&case.case_id).unwrap().stage,
        SessionStage::OpeningAddresses
    );
    assert!(h.store.panel_for_case(&case.case_id).unwrap().is_empty());

    let mut now = t0 + 3_700;
    for text in ["opening", "evidence", "closing", "summing"] {
        submit_both_sides(&h, &case.case_id, text, now);
        h.engine.tick(now + 10).await;
        now += 100;
    }

    // No panel, so the next tick closes: the stub judge decides every claim
    // (not_proven) and the case seals for the defence.
    h.engine.tick(now).await;
    let sealed = h.store.require_case(&case.case_id).unwrap();
    assert_eq!(sealed.status, CaseStatus::Sealed);
    assert_eq!(sealed.outcome, Some(cawt_core::case::CaseOutcome::ForDefence));
    let bundle = sealed.verdict_bundle.clone().unwrap();
    assert!(bundle.contains("judgeTiebreaks"), "judge findings are in the bundle");
    assert!(sealed.judge_remedy.is_none(), "no remedy for a defence outcome");
}

#[tokio::test]
async fn voting_hard_deadline_voids() {
    let h = harness(5);
    let t0 = 1_000_000;
    let case_id = to_readiness(&h, t0);
    h.engine.tick(t0 + 3_600).await;
    for member in h.store.panel_for_case(&case_id).unwrap() {
        h.court.juror_ready(&case_id, &member.juror_id, t0 + 3_610).unwrap();
    }
    h.engine.tick(t0 + 3_620).await;
    let mut now = t0 + 3_700;
    for text in ["opening", "evidence", "closing", "summing"] {
        submit_both_sides(&h, &case_id, text, now);
        h.engine.tick(now + 10).await;
        now += 100;
    }
    let case = h.store.require_case(&case_id).unwrap();
    assert_eq!(case.stage, SessionStage::Voting);
    let hard = case.voting_hard_deadline.unwrap();

    // Nobody votes; jurors are replaced until the hard deadline voids.
    h.engine.tick(hard + 1).await;
    let voided = h.store.require_case(&case_id).unwrap();
    assert_eq!(voided.status, CaseStatus::Void);
    assert_eq!(voided.void_reason, Some(VoidReason::VotingTimeout));
    // A void case never seals.
    assert!(h.store.seal_job_for_case(&case_id).unwrap().is_none());
}
