pub mod agent;
pub mod agreement;
pub mod canonical;
pub mod case;
pub mod constants;
pub mod error;
pub mod gateway;
pub mod seal;
pub mod transcript;
pub mod types;

pub use agent::*;
pub use agreement::{
    AgreementParty, AgreementReceipt, AgreementSignature, AgreementStatus, AgreementVisibility,
    CanonicalAgreement, Decision, DecisionSignature, DecisionStatus,
};
pub use canonical::canonical_json;
pub use case::*;
pub use constants::*;
pub use error::CourtError;
pub use gateway::*;
pub use seal::*;
pub use transcript::*;
pub use types::*;
