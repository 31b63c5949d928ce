pub mod pool;
pub mod selection;

pub use pool::{eligible_pool, PoolFilter};
pub use selection::{replacement_from_proof, score_candidate, select_jury, SelectionResult};
