pub mod error;
pub mod handlers;
pub mod server;
pub mod types;

pub use server::{build_router, AppState, RpcConfig};
