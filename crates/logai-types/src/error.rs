use serde::Serialize;
use thiserror::Error;

/// Stable, machine-readable category for a [`TriageError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    PreconditionFailed,
    ConcurrencyConflict,
    UpstreamUnavailable,
    InvalidArtifact,
    Validation,
    Cancelled,
    Storage,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::PreconditionFailed => "precondition_failed",
            ErrorKind::ConcurrencyConflict => "concurrency_conflict",
            ErrorKind::UpstreamUnavailable => "upstream_unavailable",
            ErrorKind::InvalidArtifact => "invalid_artifact",
            ErrorKind::Validation => "validation",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Storage => "storage",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TriageError {
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("{kind} already in progress for cluster '{cluster_id}'")]
    ConcurrencyConflict { cluster_id: String, kind: String },

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("invalid artifact: {0}")]
    InvalidArtifact(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl TriageError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        TriageError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            TriageError::NotFound { .. } => ErrorKind::NotFound,
            TriageError::PreconditionFailed(_) => ErrorKind::PreconditionFailed,
            TriageError::ConcurrencyConflict { .. } => ErrorKind::ConcurrencyConflict,
            TriageError::UpstreamUnavailable(_) => ErrorKind::UpstreamUnavailable,
            TriageError::InvalidArtifact(_) => ErrorKind::InvalidArtifact,
            TriageError::Validation(_) => ErrorKind::Validation,
            TriageError::Cancelled(_) => ErrorKind::Cancelled,
            TriageError::Storage(_) => ErrorKind::Storage,
        }
    }

    /// Only upstream outages are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TriageError::UpstreamUnavailable(_))
    }
}
