//! Canonical hashing of the case record: the verdict bundle (the sealing
//! anchor), evidence/submission/ballot content hashes, the transcript root
//! and the selection-proof hash.
//!
//! Every function here reduces to `sha256_hex(canonical_json(...))` over a
//! fixed field layout, so the digests are bit-stable across runs and across
//! implementations. Judge remedy recommendations are deliberately absent
//! from the bundle — they live on the case row only.

use serde_json::{json, Map, Value};

use cawt_core::canonical::canonical_json;
use cawt_core::case::{
    Ballot, CaseSide, Finding, JurySelectionRun, SubmissionPhase,
};
use cawt_core::transcript::TranscriptEvent;
use cawt_core::types::{AgentId, CaseId, ClaimId, EvidenceId};
use cawt_crypto::hash::sha256_hex;

use crate::tally::{ClaimTally, VerdictOutcome};

/// Everything the verdict hash commits to.
#[derive(Clone, Debug)]
pub struct VerdictBundle {
    pub case_id: CaseId,
    pub prosecution: AgentId,
    pub defence: Option<AgentId>,
    pub outcome: VerdictOutcome,
    pub closed_at_iso: String,
    pub jury_size: usize,
    pub claim_tallies: Vec<ClaimTally>,
    pub evidence_hashes: Vec<String>,
    pub submission_hashes: Vec<String>,
    pub drand_round: u64,
    pub drand_randomness: String,
    pub pool_snapshot_hash: String,
    /// Tied claims resolved by the judge, keyed by claim id.
    pub judge_tiebreaks: Vec<(ClaimId, Finding)>,
}

fn outcome_str(outcome: VerdictOutcome) -> &'static str {
    match outcome {
        VerdictOutcome::ForProsecution => "for_prosecution",
        VerdictOutcome::ForDefence => "for_defence",
        VerdictOutcome::Inconclusive => "inconclusive",
    }
}

/// Render the bundle to its canonical JSON and hash. Returns
/// `(canonical_json, verdict_hash)`.
pub fn build_verdict_bundle(bundle: &VerdictBundle) -> (String, String) {
    let mut evidence_hashes = bundle.evidence_hashes.clone();
    evidence_hashes.sort();
    let mut submission_hashes = bundle.submission_hashes.clone();
    submission_hashes.sort();

    let tallies: Vec<Value> = bundle
        .claim_tallies
        .iter()
        .map(|t| {
            json!({
                "claimId": t.claim_id.as_str(),
                "proven": t.proven,
                "notProven": t.not_proven,
                "insufficient": t.insufficient,
                "outcome": t.outcome.as_str(),
            })
        })
        .collect();

    let mut root = Map::new();
    root.insert("caseId".into(), json!(bundle.case_id.as_str()));
    root.insert(
        "parties".into(),
        json!({
            "prosecution": bundle.prosecution.as_str(),
            "defence": bundle.defence.as_ref().map(|d| d.as_str()),
        }),
    );
    root.insert("outcome".into(), json!(outcome_str(bundle.outcome)));
    root.insert("closedAtIso".into(), json!(bundle.closed_at_iso));
    root.insert("jurySize".into(), json!(bundle.jury_size));
    root.insert("claimTallies".into(), Value::Array(tallies));
    root.insert("evidenceHashes".into(), json!(evidence_hashes));
    root.insert("submissionHashes".into(), json!(submission_hashes));
    root.insert(
        "drand".into(),
        json!({
            "round": bundle.drand_round,
            "randomness": bundle.drand_randomness,
        }),
    );
    root.insert(
        "poolSnapshotHash".into(),
        json!(bundle.pool_snapshot_hash),
    );
    if !bundle.judge_tiebreaks.is_empty() {
        let mut map = Map::new();
        for (claim_id, finding) in &bundle.judge_tiebreaks {
            map.insert(claim_id.as_str().to_string(), json!(finding.as_str()));
        }
        root.insert("judgeTiebreaks".into(), Value::Object(map));
    }

    let canonical = canonical_json(&Value::Object(root));
    let hash = sha256_hex(canonical.as_bytes());
    (canonical, hash)
}

// ── Record content hashes ────────────────────────────────────────────────────

/// Hash of one canonicalised evidence record.
pub fn evidence_body_hash(
    side: CaseSide,
    kind: &str,
    title: &str,
    body: &str,
    attachment_url: Option<&str>,
) -> String {
    let value = json!({
        "side": side.as_str(),
        "kind": kind,
        "title": title,
        "body": body,
        "attachmentUrl": attachment_url,
    });
    sha256_hex(canonical_json(&value).as_bytes())
}

/// Hash of one canonicalised stage submission.
pub fn submission_content_hash(
    side: CaseSide,
    phase: SubmissionPhase,
    text: &str,
    principle_citations: &[String],
    evidence_citations: &[EvidenceId],
) -> String {
    let value = json!({
        "side": side.as_str(),
        "phase": phase.as_str(),
        "text": text,
        "principleCitations": principle_citations,
        "evidenceCitations": evidence_citations.iter().map(|e| e.as_str()).collect::<Vec<_>>(),
    });
    sha256_hex(canonical_json(&value).as_bytes())
}

/// Hash a ballot's voted content (excludes the juror signature, which covers
/// this hash).
pub fn ballot_content_hash(ballot: &Ballot) -> String {
    let votes: Vec<Value> = ballot
        .votes
        .iter()
        .map(|v| {
            json!({
                "claimId": v.claim_id.as_str(),
                "finding": v.finding.as_str(),
                "severity": v.severity,
                "recommendedRemedy": v.recommended_remedy,
            })
        })
        .collect();
    let value = json!({
        "caseId": ballot.case_id.as_str(),
        "jurorId": ballot.juror_id.as_str(),
        "votes": votes,
        "overall": match ballot.overall {
            cawt_core::case::OverallVote::ForProsecution => "for_prosecution",
            cawt_core::case::OverallVote::ForDefence => "for_defence",
            cawt_core::case::OverallVote::Mixed => "mixed",
        },
        "reasoningSummary": ballot.reasoning_summary,
        "principlesReliedOn": ballot.principles_relied_on,
    });
    sha256_hex(canonical_json(&value).as_bytes())
}

// ── Aggregate hashes ─────────────────────────────────────────────────────────

/// Root hash over the ordered transcript. Message bodies are hashed
/// individually so the root stays cheap to recompute for verification.
pub fn transcript_root_hash(events: &[TranscriptEvent]) -> String {
    let entries: Vec<Value> = events
        .iter()
        .map(|e| {
            json!({
                "seq": e.seq,
                "stage": e.stage,
                "eventType": e.event_type,
                "messageHash": sha256_hex(e.message.as_bytes()),
                "artefactId": e.artefact_id,
            })
        })
        .collect();
    sha256_hex(canonical_json(&Value::Array(entries)).as_bytes())
}

/// Hash of the initial selection run (beacon inputs + full proof).
pub fn selection_proof_hash(run: &JurySelectionRun) -> String {
    let scored: Vec<Value> = run
        .scored
        .iter()
        .map(|c| {
            json!({
                "candidateId": c.candidate_id.as_str(),
                "scoreHash": c.score_hash,
            })
        })
        .collect();
    let value = json!({
        "round": run.drand_round,
        "randomness": run.drand_randomness,
        "poolSnapshotHash": run.pool_snapshot_hash,
        "scored": scored,
    });
    sha256_hex(canonical_json(&value).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_bundle() -> VerdictBundle {
        VerdictBundle {
            case_id: CaseId("case_fix".into()),
            prosecution: AgentId("agentP".into()),
            defence: Some(AgentId("agentD".into())),
            outcome: VerdictOutcome::ForProsecution,
            closed_at_iso: "2026-03-01T12:00:00Z".into(),
            jury_size: 3,
            claim_tallies: vec![ClaimTally {
                claim_id: ClaimId("claim_01".into()),
                proven: 2,
                not_proven: 1,
                insufficient: 0,
                outcome: Finding::Proven,
                tied: false,
            }],
            evidence_hashes: vec!["aa".into(), "bb".into()],
            submission_hashes: vec!["cc".into()],
            drand_round: 42,
            drand_randomness: "7f".repeat(32),
            pool_snapshot_hash: "ph".into(),
            judge_tiebreaks: vec![],
        }
    }

    #[test]
    fn pinned_verdict_hash() {
        // Reference digest computed independently of this crate.
        let (_, hash) = build_verdict_bundle(&fixture_bundle());
        assert_eq!(
            hash,
            "c124d93503fb952064880e59daa0b05d38b53b609c4d2162e5668fcd1a809ca6"
        );
    }

    #[test]
    fn hash_is_stable_across_runs_and_input_order() {
        let a = build_verdict_bundle(&fixture_bundle());
        let mut shuffled = fixture_bundle();
        shuffled.evidence_hashes.reverse();
        let b = build_verdict_bundle(&shuffled);
        assert_eq!(a.1, b.1, "evidence hash order must not matter");
        assert_eq!(a.0, b.0);
    }

    #[test]
    fn hash_moves_with_the_outcome() {
        let mut other = fixture_bundle();
        other.outcome = VerdictOutcome::ForDefence;
        assert_ne!(
            build_verdict_bundle(&fixture_bundle()).1,
            build_verdict_bundle(&other).1
        );
    }

    #[test]
    fn tiebreaks_enter_the_bundle_only_when_present() {
        let mut with = fixture_bundle();
        with.judge_tiebreaks = vec![(ClaimId("claim_01".into()), Finding::Proven)];
        let (canon_without, _) = build_verdict_bundle(&fixture_bundle());
        let (canon_with, _) = build_verdict_bundle(&with);
        assert!(!canon_without.contains("judgeTiebreaks"));
        assert!(canon_with.contains("judgeTiebreaks"));
    }

    #[test]
    fn pinned_evidence_hash() {
        let h = evidence_body_hash(CaseSide::Prosecution, "log", "t", "b", None);
        assert_eq!(
            h,
            "ae474213c5d63bc583900ef9fb99a365716b04264d96349cbea90d9fc4c86f25"
        );
    }

    #[test]
    fn submission_hash_binds_citations() {
        let a = submission_content_hash(CaseSide::Defence, SubmissionPhase::Opening, "text", &[], &[]);
        let b = submission_content_hash(
            CaseSide::Defence,
            SubmissionPhase::Opening,
            "text",
            &["P3".to_string()],
            &[],
        );
        assert_ne!(a, b);
    }
}
