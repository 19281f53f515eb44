//! Handler-boundary error rendering.

use agent_gateway::GatewayError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::views;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

const fn status_for(err: &GatewayError) -> StatusCode {
    match err {
        GatewayError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        GatewayError::AuthenticationRequired => StatusCode::UNAUTHORIZED,
        GatewayError::Connection { .. } => StatusCode::BAD_GATEWAY,
        GatewayError::QueryFailed(_) | GatewayError::Config(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn log(err: &GatewayError, status: StatusCode) {
    if status.is_server_error() {
        tracing::error!(error = %err, code = err.code(), "Request failed");
    } else {
        tracing::debug!(error = %err, code = err.code(), "Request rejected");
    }
}

/// JSON error for the `/connect`, `/query` and `/session` API
#[derive(Debug)]
pub struct ApiError(pub GatewayError);

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        log(&self.0, status);
        (
            status,
            Json(ErrorResponse {
                error: self.0.user_message(),
                code: self.0.code().into(),
            }),
        )
            .into_response()
    }
}

/// HTML error page for the `/web` forms
#[derive(Debug)]
pub struct WebError {
    pub status: StatusCode,
    pub message: String,
}

impl WebError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<GatewayError> for WebError {
    fn from(err: GatewayError) -> Self {
        let status = status_for(&err);
        log(&err, status);
        Self::new(status, err.user_message())
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        (self.status, views::error_page(&self.message)).into_response()
    }
}
