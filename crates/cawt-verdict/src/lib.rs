pub mod bundle;
pub mod tally;

pub use bundle::{
    ballot_content_hash, build_verdict_bundle, evidence_body_hash, selection_proof_hash,
    submission_content_hash, transcript_root_hash, VerdictBundle,
};
pub use tally::{resolve_outcome, tally_claims, ClaimTally, VerdictOutcome};
