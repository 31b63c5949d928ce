pub mod court;
pub mod engine;
pub mod seal;

pub use court::{BallotInput, CourtService, DraftCaseInput, EvidenceInput, StageMessageInput};
pub use engine::{EngineConfig, SessionEngine};
pub use seal::apply_seal_result;
