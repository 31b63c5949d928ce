//! Deterministic jury selection.
//!
//! The only non-deterministic input is the drand (round, randomness) pair.
//! Everything downstream is a pure function of it: two services fed the same
//! pool and the same beacon output select the same panel and produce the same
//! proof, which is what makes post-hoc verification (and replacement without
//! a fresh beacon call) possible.

use std::collections::HashSet;

use serde_json::json;

use cawt_core::canonical::canonical_json;
use cawt_core::case::ScoredCandidate;
use cawt_core::types::{AgentId, CaseId};
use cawt_crypto::hash::{sha256_bytes, sha256_hex};

/// Outcome of one selection pass.
#[derive(Clone, Debug)]
pub struct SelectionResult {
    pub selected: Vec<AgentId>,
    pub pool_snapshot_hash: String,
    /// The full score-sorted candidate order — the replacement proof.
    pub scored: Vec<ScoredCandidate>,
}

/// `sha256(randomness_bytes ‖ candidate_id ‖ case_id)`, lowercase hex.
///
/// The beacon randomness is hex on the wire and is hashed as raw bytes;
/// a non-hex value (stub beacons in tests) is hashed as UTF-8.
pub fn score_candidate(randomness: &str, candidate: &AgentId, case_id: &CaseId) -> String {
    let randomness_bytes = hex::decode(randomness).unwrap_or_else(|_| randomness.as_bytes().to_vec());
    let mut input =
        Vec::with_capacity(randomness_bytes.len() + candidate.as_str().len() + case_id.as_str().len());
    input.extend_from_slice(&randomness_bytes);
    input.extend_from_slice(candidate.as_str().as_bytes());
    input.extend_from_slice(case_id.as_str().as_bytes());
    hex::encode(sha256_bytes(&input))
}

/// Select a panel of `panel_size` from `pool` under `randomness`.
///
/// The pool is first sorted lexicographically (the canonical pool), then each
/// candidate is scored and the candidates ordered by (score_hash,
/// candidate_id) ascending. The secondary key is required for a total order
/// even though 256-bit collisions are not expected in practice.
pub fn select_jury(
    case_id: &CaseId,
    pool: &[AgentId],
    randomness: &str,
    panel_size: usize,
) -> SelectionResult {
    let mut canonical_pool: Vec<&AgentId> = pool.iter().collect();
    canonical_pool.sort();
    canonical_pool.dedup();

    let pool_json = json!(canonical_pool
        .iter()
        .map(|id| id.as_str())
        .collect::<Vec<_>>());
    let pool_snapshot_hash = sha256_hex(canonical_json(&pool_json).as_bytes());

    let mut scored: Vec<ScoredCandidate> = canonical_pool
        .into_iter()
        .map(|candidate| ScoredCandidate {
            score_hash: score_candidate(randomness, candidate, case_id),
            candidate_id: candidate.clone(),
        })
        .collect();
    scored.sort_by(|a, b| {
        a.score_hash
            .cmp(&b.score_hash)
            .then_with(|| a.candidate_id.cmp(&b.candidate_id))
    });

    let selected = scored
        .iter()
        .take(panel_size)
        .map(|c| c.candidate_id.clone())
        .collect();

    SelectionResult {
        selected,
        pool_snapshot_hash,
        scored,
    }
}

/// Deterministic next-candidate pick: the first proof entry not currently
/// ineligible. `None` means the proof is exhausted and the caller must fall
/// back to a fresh selection round.
pub fn replacement_from_proof(
    proof: &[ScoredCandidate],
    ineligible: &HashSet<AgentId>,
) -> Option<AgentId> {
    proof
        .iter()
        .map(|c| &c.candidate_id)
        .find(|id| !ineligible.contains(*id))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn juror(name: &str) -> AgentId {
        AgentId(name.to_string())
    }

    const RANDOMNESS: &str =
        "7f7f7f7f7f7f7f7f7f7f7f7f7f7f7f7f7f7f7f7f7f7f7f7f7f7f7f7f7f7f7f7f";

    fn fixture_pool() -> Vec<AgentId> {
        ["jurorC", "jurorA", "jurorB", "jurorE", "jurorD"]
            .into_iter()
            .map(juror)
            .collect()
    }

    #[test]
    fn pinned_selection_vector() {
        // Reference values computed independently of this crate.
        let case = CaseId("case_0001".to_string());
        let result = select_jury(&case, &fixture_pool(), RANDOMNESS, 3);

        assert_eq!(
            result.pool_snapshot_hash,
            "e8fff958e05da71bc959f5c8714a31430d4b50579ea591d3cf4aa404c06351f7"
        );
        assert_eq!(
            result.selected,
            vec![juror("jurorB"), juror("jurorA"), juror("jurorE")]
        );
        assert_eq!(
            result.scored[0].score_hash,
            "30cc062091a615bd6aef7e0d3841ecb2428bc055edda8c0e6b64aa3ff668c2e7"
        );
        assert_eq!(
            result.scored[4].score_hash,
            "ee6e901bf7aa314c37d1f3414cb48a73b1184504dc6c16610e35027d586f0ae4"
        );
        assert_eq!(result.scored.len(), 5, "proof covers the whole pool");
    }

    #[test]
    fn selection_is_deterministic_and_order_independent() {
        let case = CaseId("case_0001".to_string());
        let a = select_jury(&case, &fixture_pool(), RANDOMNESS, 3);
        let mut shuffled = fixture_pool();
        shuffled.reverse();
        let b = select_jury(&case, &shuffled, RANDOMNESS, 3);
        assert_eq!(a.selected, b.selected);
        assert_eq!(a.pool_snapshot_hash, b.pool_snapshot_hash);
        assert_eq!(a.scored, b.scored);
    }

    #[test]
    fn different_randomness_reorders() {
        let case = CaseId("case_0001".to_string());
        let a = select_jury(&case, &fixture_pool(), RANDOMNESS, 5);
        let b = select_jury(&case, &fixture_pool(), &"11".repeat(32), 5);
        assert_ne!(
            a.scored.iter().map(|c| &c.candidate_id).collect::<Vec<_>>(),
            b.scored.iter().map(|c| &c.candidate_id).collect::<Vec<_>>()
        );
        // The pool snapshot does not depend on randomness.
        assert_eq!(a.pool_snapshot_hash, b.pool_snapshot_hash);
    }

    #[test]
    fn replacement_walks_the_proof_in_order() {
        let case = CaseId("case_0001".to_string());
        let result = select_jury(&case, &fixture_pool(), RANDOMNESS, 3);

        // Proof order: B, A, E, C, D. With the sitting panel ineligible the
        // next pick is jurorC.
        let ineligible: HashSet<AgentId> =
            [juror("jurorB"), juror("jurorA"), juror("jurorE")].into_iter().collect();
        assert_eq!(
            replacement_from_proof(&result.scored, &ineligible),
            Some(juror("jurorC"))
        );

        let everyone: HashSet<AgentId> = fixture_pool().into_iter().collect();
        assert_eq!(replacement_from_proof(&result.scored, &everyone), None);
    }

    #[test]
    fn panel_larger_than_pool_takes_everyone() {
        let case = CaseId("case_small".to_string());
        let pool = vec![juror("a"), juror("b")];
        let result = select_jury(&case, &pool, RANDOMNESS, 11);
        assert_eq!(result.selected.len(), 2);
    }
}
