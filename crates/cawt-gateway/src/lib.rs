pub mod apikeys;
pub mod auth;
pub mod idempotency;
pub mod limiter;

pub use apikeys::authenticate_api_key;
pub use auth::{verify_shared_key, Gateway, RequestAuth};
pub use idempotency::{with_idempotency, StoredResponse};
pub use limiter::FailedAuthLimiter;
