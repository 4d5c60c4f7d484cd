use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use logai_types::{ErrorKind, TriageError};
use tracing::error;

/// A failed request. Renders as `{success: false, error, kind}`.
#[derive(Debug)]
pub struct ApiError(pub TriageError);

pub type ApiResult<T> = Result<T, ApiError>;

impl From<TriageError> for ApiError {
    fn from(err: TriageError) -> Self {
        ApiError(err)
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::PreconditionFailed => StatusCode::PRECONDITION_FAILED,
        ErrorKind::ConcurrencyConflict => StatusCode::CONFLICT,
        ErrorKind::UpstreamUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::InvalidArtifact => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Cancelled => StatusCode::REQUEST_TIMEOUT,
        ErrorKind::Storage => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = status_for(kind);
        if kind == ErrorKind::Storage {
            error!("Request failed: {}", self.0);
        }
        let body = serde_json::json!({
            "success": false,
            "error": self.0.to_string(),
            "kind": kind.as_str(),
        });
        (status, Json(body)).into_response()
    }
}
