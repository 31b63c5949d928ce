//! Ballot tallies and the outcome rules.
//!
//! Per claim, the outcome is the strict-majority plurality: proven only when
//! it beats both other findings outright, symmetric for not_proven, otherwise
//! insufficient. An exact proven/not_proven tie that beats insufficient is
//! flagged for the judge tiebreak (judge mode); without a tiebreak it falls
//! to insufficient.

use std::collections::HashMap;

use cawt_core::case::{Ballot, Claim, Finding};
use cawt_core::types::ClaimId;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClaimTally {
    pub claim_id: ClaimId,
    pub proven: u32,
    pub not_proven: u32,
    pub insufficient: u32,
    pub outcome: Finding,
    /// Exact proven/not_proven tie beating insufficient — tiebreak candidate.
    pub tied: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VerdictOutcome {
    ForProsecution,
    ForDefence,
    /// Every claim landed insufficient; the case voids rather than seals.
    Inconclusive,
}

/// Count findings per claim across all ballots.
pub fn tally_claims(claims: &[Claim], ballots: &[Ballot]) -> Vec<ClaimTally> {
    let mut tallies: Vec<ClaimTally> = claims
        .iter()
        .map(|claim| {
            let mut proven = 0;
            let mut not_proven = 0;
            let mut insufficient = 0;
            for ballot in ballots {
                for vote in &ballot.votes {
                    if vote.claim_id == claim.claim_id {
                        match vote.finding {
                            Finding::Proven => proven += 1,
                            Finding::NotProven => not_proven += 1,
                            Finding::Insufficient => insufficient += 1,
                        }
                    }
                }
            }
            let tied = proven == not_proven && proven > insufficient && proven > 0;
            let outcome = if proven > not_proven && proven > insufficient {
                Finding::Proven
            } else if not_proven > proven && not_proven > insufficient {
                Finding::NotProven
            } else {
                Finding::Insufficient
            };
            ClaimTally {
                claim_id: claim.claim_id.clone(),
                proven,
                not_proven,
                insufficient,
                outcome,
                tied,
            }
        })
        .collect();
    // Stable bundle order regardless of claim insertion order.
    tallies.sort_by(|a, b| a.claim_id.cmp(&b.claim_id));
    tallies
}

/// Resolve the overall outcome, applying judge tiebreaks where provided.
///
/// A tiebreak entry overrides its claim's tallied outcome before the
/// majority count (the engine only produces entries for tied or unvoted
/// claims). Majorities are strict; a mixed picture with no strict majority
/// of proven claims resolves for the defence (the filing side carries the
/// burden), and an all-insufficient picture is inconclusive.
pub fn resolve_outcome(
    tallies: &mut [ClaimTally],
    tiebreaks: &HashMap<ClaimId, Finding>,
) -> VerdictOutcome {
    for tally in tallies.iter_mut() {
        if let Some(finding) = tiebreaks.get(&tally.claim_id) {
            tally.outcome = *finding;
        }
    }

    let total = tallies.len() as u32;
    if total == 0 {
        return VerdictOutcome::Inconclusive;
    }
    let proven = tallies.iter().filter(|t| t.outcome == Finding::Proven).count() as u32;
    let not_proven = tallies
        .iter()
        .filter(|t| t.outcome == Finding::NotProven)
        .count() as u32;
    let insufficient = total - proven - not_proven;

    if insufficient == total {
        VerdictOutcome::Inconclusive
    } else if proven * 2 > total {
        VerdictOutcome::ForProsecution
    } else {
        VerdictOutcome::ForDefence
    }
}
