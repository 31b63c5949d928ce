//! Thin clients for the service's external collaborators: the drand beacon,
//! the LLM judge, the mint worker and Solana RPC.
//!
//! Each client is a tagged stub/http variant chosen at construction from
//! config. Every outbound call carries an explicit timeout; judge calls
//! additionally never error — they collapse to `{ok, data | error}` so a
//! flaky judge degrades instead of failing the session engine.

pub mod drand;
pub mod judge;
pub mod mint;
pub mod retry;
pub mod solana;

pub use drand::{DrandClient, DrandRound};
pub use judge::{JudgeCall, JudgeClient, JudgeResult, ScreeningDecision};
pub use mint::{MintResult, MintWorkerClient};
pub use retry::retry_with_backoff;
pub use solana::{SolanaClient, TreasuryPayment};
