//! Router assembly: routes, CORS, tracing, request ids and security headers.

use std::sync::Arc;

use axum::http::{header, HeaderValue, Request};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use rand::RngCore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use cawt_gateway::Gateway;
use cawt_ocp::OcpService;
use cawt_session::CourtService;
use cawt_store::Store;

use crate::handlers;

/// Shared secrets and switches the HTTP layer needs.
#[derive(Clone, Debug)]
pub struct RpcConfig {
    /// Bearer for the mint worker's callback.
    pub worker_token: String,
    /// Bearer for operator endpoints (void, seal retry, cancel/suspend).
    pub system_key: String,
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub gateway: Arc<Gateway>,
    pub court: Arc<CourtService>,
    pub ocp: Arc<OcpService>,
    pub config: Arc<RpcConfig>,
}

/// Request id + security headers on every response.
async fn stamp_response(request: Request<axum::body::Body>, next: Next) -> Response {
    let mut id_bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut id_bytes);
    let request_id = hex::encode(id_bytes);

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        headers.insert("X-Request-Id", value);
    }
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::REFERRER_POLICY,
        HeaderValue::from_static("no-referrer"),
    );
    response
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    Router::new()
        // ── Court ────────────────────────────────────────────────────────────
        .route("/api/cases/draft", post(handlers::court::draft_case))
        .route("/api/cases/:id/file", post(handlers::court::file_case))
        .route(
            "/api/cases/:id/volunteer-defence",
            post(handlers::court::volunteer_defence),
        )
        .route("/api/cases/:id/evidence", post(handlers::court::submit_evidence))
        .route(
            "/api/cases/:id/stage-message",
            post(handlers::court::stage_message),
        )
        .route("/api/cases/:id/juror-ready", post(handlers::court::juror_ready))
        .route("/api/cases/:id/ballots", post(handlers::court::submit_ballot))
        .route("/api/cases/:id", get(handlers::court::get_case))
        .route(
            "/api/cases/:id/transcript",
            get(handlers::court::get_transcript),
        )
        // ── OCP ──────────────────────────────────────────────────────────────
        .route("/v1/agents/register", post(handlers::ocp::register_agent))
        .route("/v1/agents/update", post(handlers::ocp::update_agent))
        .route(
            "/v1/agreements/propose",
            post(handlers::ocp::propose_agreement),
        )
        .route(
            "/v1/agreements/:id/accept",
            post(handlers::ocp::accept_agreement),
        )
        .route("/v1/agreements/:id", get(handlers::ocp::get_agreement))
        .route(
            "/v1/agreements/by-code/:code",
            get(handlers::ocp::get_agreement_by_code),
        )
        .route("/v1/verify", get(handlers::ocp::verify))
        .route("/v1/decisions/draft", post(handlers::ocp::draft_decision))
        .route("/v1/decisions/:id/sign", post(handlers::ocp::sign_decision))
        .route("/v1/decisions/:id/seal", post(handlers::ocp::seal_decision))
        .route(
            "/v1/api-keys",
            post(handlers::ocp::create_api_key).get(handlers::ocp::list_api_keys),
        )
        .route(
            "/v1/api-keys/:id",
            axum::routing::delete(handlers::ocp::revoke_api_key),
        )
        // ── Legacy scheme (kept behind the same verifier factory) ────────────
        .route(
            "/legacy/agents/register",
            post(handlers::ocp::register_agent_legacy),
        )
        .route(
            "/legacy/agents/update",
            post(handlers::ocp::update_agent_legacy),
        )
        // ── Internal ─────────────────────────────────────────────────────────
        .route(
            "/api/internal/seal-result",
            post(handlers::internal::seal_result),
        )
        .route(
            "/api/internal/cases/:id/void",
            post(handlers::internal::void_case),
        )
        .route(
            "/api/internal/seal-jobs/:id/retry",
            post(handlers::internal::retry_seal_job),
        )
        .route(
            "/api/internal/agreements/:id/cancel",
            post(handlers::internal::cancel_agreement),
        )
        .route(
            "/api/internal/agreements/:id/suspend",
            post(handlers::internal::suspend_agreement),
        )
        // ── Health ───────────────────────────────────────────────────────────
        .route("/healthz", get(handlers::healthz))
        .layer(middleware::from_fn(stamp_response))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
