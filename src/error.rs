//! Error types for the gateway
//!
//! `SandboxError` covers everything that can go wrong while talking to the
//! hosted sandbox. Those errors never reach the HTTP client as a status code:
//! the executor folds them into a `success: false` response. `ApiError` is the
//! small set of failures that do surface as HTTP errors.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Errors raised by a sandbox backend
#[derive(Error, Debug)]
pub enum SandboxError {
    /// Transport failure (connect, TLS, body read)
    #[error("Sandbox request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status from the provider
    #[error("Sandbox API returned {status}: {message}")]
    Api { status: u16, message: String },

    /// The provider did not answer within the allotted time
    #[error("Execution timed out after {0}s")]
    Timeout(u64),

    /// The provider answered with something we could not parse
    #[error("Unexpected sandbox response: {0}")]
    Protocol(String),
}

impl SandboxError {
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }
}

/// Errors returned to HTTP clients with a `detail` body
#[derive(Error, Debug)]
pub enum ApiError {
    /// Required configuration is missing
    #[error("{0} not configured")]
    NotConfigured(&'static str),

    /// Request body failed validation
    #[error("{0}")]
    Validation(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotConfigured(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}
