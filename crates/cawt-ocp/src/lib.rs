pub mod agreement;
pub mod canonical_terms;
pub mod decisions;

pub use agreement::{AcceptInput, FeePolicy, OcpService, ProposeInput};
pub use canonical_terms::{build_canonical_terms, CanonicalTerms};
pub use decisions::{draft_decision, seal_decision, sign_decision};
