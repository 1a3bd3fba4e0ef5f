use thiserror::Error;

/// Classified outcome of a service operation. Every failure a service can
/// produce is one of these; the router translates them to wire status exactly
/// once. Unexpected faults are wrapped into `Internal` at the service
/// boundary and never escape unclassified.
#[derive(Debug, Error)]
pub enum ServiceFailure {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("upstream dependency failure: {message}")]
    Upstream { message: String, retryable: bool },
    #[error("internal fault: {0}")]
    Internal(String),
}

impl ServiceFailure {
    pub fn not_found(entity: &str) -> Self {
        Self::NotFound(format!("{} not found", entity))
    }

    pub fn internal(err: impl std::fmt::Display) -> Self {
        Self::Internal(err.to_string())
    }
}

pub type ServiceResult<T> = Result<T, ServiceFailure>;
