use logai_types::TriageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    #[error("{entity} '{id}' cannot move {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        id: String,
        from: String,
        to: String,
    },

    #[error("{kind} lease on cluster '{cluster_id}' is held by job '{holder}'")]
    LeaseHeld {
        cluster_id: String,
        kind: String,
        holder: String,
    },
}

pub type Result<T> = std::result::Result<T, StorageError>;

impl From<StorageError> for TriageError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { entity, id } => TriageError::NotFound { entity, id },
            StorageError::LeaseHeld {
                cluster_id, kind, ..
            } => TriageError::ConcurrencyConflict { cluster_id, kind },
            other => TriageError::Storage(other.to_string()),
        }
    }
}
