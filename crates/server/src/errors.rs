use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use schema::{ValidationError, Violation};
use service::errors::ServiceFailure;

/// Wire-level failure kinds. The first four mirror the service taxonomy;
/// the last two belong to the access middleware.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum FailureKind {
    ValidationFailure,
    NotFound,
    UpstreamDependencyFailure,
    InternalFault,
    AccessDenied,
    RateLimited,
}

/// Error body shape shared by every endpoint: `{kind, message, details[]}`
/// plus a retry hint for upstream failures. Never carries stack traces or
/// internal identifiers.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub kind: FailureKind,
    pub message: String,
    pub details: Vec<Violation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl ApiError {
    fn new(status: StatusCode, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody { kind, message: message.into(), details: Vec::new(), retryable: None },
        }
    }

    /// Schema violations from the request body, all of them.
    pub fn validation(err: ValidationError) -> Self {
        let mut e = Self::new(
            StatusCode::BAD_REQUEST,
            FailureKind::ValidationFailure,
            "request body failed validation",
        );
        e.body.details = err.violations;
        e
    }

    /// Body was not parseable JSON at all.
    pub fn invalid_body(message: impl Into<String>) -> Self {
        let mut e = Self::new(
            StatusCode::BAD_REQUEST,
            FailureKind::ValidationFailure,
            "request body is not valid JSON",
        );
        e.body.details = vec![Violation {
            field: "(body)".to_string(),
            code: schema::ReasonCode::WrongType,
            message: message.into(),
        }];
        e
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, FailureKind::NotFound, message)
    }

    pub fn route_not_found(method: &Method, path: &str) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            FailureKind::NotFound,
            format!("no operation registered for {method} {path}"),
        )
    }

    pub fn upstream(message: impl Into<String>, retryable: bool) -> Self {
        let mut e = Self::new(
            StatusCode::BAD_GATEWAY,
            FailureKind::UpstreamDependencyFailure,
            message,
        );
        e.body.retryable = Some(retryable);
        e
    }

    /// The whole dispatch exceeded its deadline.
    pub fn deadline_exceeded() -> Self {
        let mut e = Self::new(
            StatusCode::GATEWAY_TIMEOUT,
            FailureKind::UpstreamDependencyFailure,
            "request deadline exceeded",
        );
        e.body.retryable = Some(true);
        e
    }

    /// Opaque internal fault. The real cause goes to the log, never the wire.
    pub fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            FailureKind::InternalFault,
            "internal fault",
        )
    }

    pub fn access_denied(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, FailureKind::AccessDenied, message)
    }

    pub fn rate_limited(limit: u32) -> Self {
        Self::new(
            StatusCode::TOO_MANY_REQUESTS,
            FailureKind::RateLimited,
            format!("daily request limit reached ({limit}); try again tomorrow"),
        )
    }

    pub fn kind(&self) -> FailureKind {
        self.body.kind
    }

    /// Single translation point from service failures to wire status.
    pub fn from_failure(failure: ServiceFailure) -> Self {
        match failure {
            ServiceFailure::Validation(msg) => {
                Self::new(StatusCode::BAD_REQUEST, FailureKind::ValidationFailure, msg)
            }
            ServiceFailure::NotFound(msg) => Self::not_found(msg),
            ServiceFailure::Upstream { message, retryable } => Self::upstream(message, retryable),
            ServiceFailure::Internal(msg) => {
                error!(cause = %msg, "service reported internal fault");
                Self::internal()
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("duplicate route registered: {method} {path}")]
    DuplicateRoute { method: Method, path: String },
    #[error("invalid route definition: {0}")]
    InvalidRoute(String),
    #[error("invalid schema definition: {0}")]
    InvalidSchema(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Any(#[from] anyhow::Error),
}
