//! The error envelope: every failure leaves the service as
//! `{error:{code,message,details?}}` with the HTTP status of its class.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use tracing::error;

use cawt_core::error::CourtError;

pub struct ApiError(pub CourtError);

impl From<CourtError> for ApiError {
    fn from(e: CourtError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(code = self.0.code(), error = %self.0, "internal error");
        }
        // Internal detail stays in the log, not on the wire.
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            "internal error".to_string()
        } else {
            self.0.to_string()
        };
        (
            status,
            Json(json!({ "error": { "code": self.0.code(), "message": message } })),
        )
            .into_response()
    }
}
