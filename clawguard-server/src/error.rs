//! HTTP error mapping for the proxy engine.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

/// Terminal pipeline outcomes and their wire representation.
///
/// Every error carries a fixed, machine-readable payload shape:
/// `{"error": "<message>"}`.
#[derive(Debug, thiserror::Error)]
pub enum GatewayHttpError {
    /// Agent secret missing or wrong.
    #[error("Invalid or missing X-ClawGuard-Key")]
    Unauthorized,

    /// First path segment names no configured service.
    #[error("Unknown service: {0}")]
    UnknownService(String),

    /// Host header matches no configured intercept hostname.
    #[error("Unknown host. No configured service intercepts '{0}'")]
    UnknownHost(String),

    /// A reserved `__` path with no handler behind it.
    #[error("Unknown endpoint: {0}")]
    UnknownEndpoint(String),

    /// Security guard rejection (SSRF, allowlist, host-pin).
    #[error("Request blocked by security policy")]
    SecurityPolicy,

    /// Human denial or approval deadline expiry.
    #[error("Approval denied or timed out")]
    ApprovalDenied,

    /// Blocked upstream redirect.
    #[error("Redirect blocked by security policy")]
    RedirectBlocked,

    /// Inbound body exceeded the framing-layer ceiling.
    #[error("Request body too large")]
    BodyTooLarge,

    /// Upstream connect/transport failure.
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Anything else; the pipeline never panics outward.
    #[error("{0}")]
    Internal(String),
}

impl GatewayHttpError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::UnknownService(_) | Self::UnknownHost(_) | Self::UnknownEndpoint(_) => {
                StatusCode::NOT_FOUND
            }
            Self::SecurityPolicy | Self::ApprovalDenied | Self::RedirectBlocked => {
                StatusCode::FORBIDDEN
            }
            Self::BodyTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayHttpError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
