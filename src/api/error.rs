//! API error responses
//!
//! Every failure renders as `{"error": {"code", "message"}}`; backend
//! failures also carry `error.backend`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::Value;

use crate::capabilities::RouteError;
use crate::voice::FrameError;

/// Errors returned by API handlers
#[derive(Debug)]
pub enum ApiError {
    Route(RouteError),
    Frame(FrameError),
    BadRequest(String),
    NotReady(&'static str),
    RateLimited,
}

impl From<RouteError> for ApiError {
    fn from(e: RouteError) -> Self {
        Self::Route(e)
    }
}

impl From<FrameError> for ApiError {
    fn from(e: FrameError) -> Self {
        Self::Frame(e)
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    backend: Option<BackendFailure>,
}

#[derive(Serialize)]
struct BackendFailure {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<Value>,
}

impl ApiError {
    /// HTTP status this error maps to
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Route(e) => match e {
                RouteError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
                RouteError::UnknownCapability(_) => StatusCode::NOT_FOUND,
                RouteError::ManifestUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                RouteError::InvalidSubpath(_) => StatusCode::BAD_REQUEST,
                RouteError::BackendUnavailable { timed_out: true, .. } => {
                    StatusCode::GATEWAY_TIMEOUT
                }
                RouteError::BackendUnavailable { .. } | RouteError::BackendError { .. } => {
                    StatusCode::BAD_GATEWAY
                }
            },
            Self::Frame(e) => match e {
                FrameError::Backpressure { .. } => StatusCode::TOO_MANY_REQUESTS,
                FrameError::StreamClosed => StatusCode::SERVICE_UNAVAILABLE,
                FrameError::OutOfOrder { .. } => StatusCode::CONFLICT,
            },
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotReady(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let (code, message, backend) = match self {
            Self::Route(e) => {
                let message = e.to_string();
                let code = e.code();
                let backend = match e {
                    RouteError::BackendError {
                        backend,
                        status,
                        body,
                    } => Some(BackendFailure {
                        name: backend.to_string(),
                        status: Some(status),
                        body: Some(body),
                    }),
                    RouteError::BackendUnavailable { backend, .. } => Some(BackendFailure {
                        name: backend.to_string(),
                        status: None,
                        body: None,
                    }),
                    _ => None,
                };
                (code, message, backend)
            }
            Self::Frame(e) => {
                let code = match e {
                    FrameError::Backpressure { .. } => "backpressure",
                    FrameError::StreamClosed => "stream_closed",
                    FrameError::OutOfOrder { .. } => "out_of_order",
                };
                (code, e.to_string(), None)
            }
            Self::BadRequest(msg) => ("bad_request", msg, None),
            Self::NotReady(msg) => ("not_ready", msg.to_string(), None),
            Self::RateLimited => (
                "rate_limited",
                "too many capability requests".to_string(),
                None,
            ),
        };

        (
            status,
            Json(ErrorResponse {
                error: ErrorBody {
                    code,
                    message,
                    backend,
                },
            }),
        )
            .into_response()
    }
}
