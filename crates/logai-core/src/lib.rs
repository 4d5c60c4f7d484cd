//! Triage pipeline: fingerprinting, clustering, scans and the analysis and
//! patch workflows.

pub mod analysis;
pub mod cluster_store;
pub mod config;
pub mod diff;
pub mod engine;
pub mod fingerprint;
pub mod lease;
pub mod llm;
pub mod log_source;
pub mod patch;
pub mod retry;
pub mod scan;
pub mod severity;
pub mod source;
pub mod status;

use std::sync::Arc;

use logai_storage::Database;
use logai_types::TriageError;
use tokio::sync::Mutex;

pub use config::TriageConfig;
pub use engine::TriageEngine;
pub use scan::{ScanReport, ScanRequest};

/// The database shared by every workflow in a process.
pub type SharedDb = Arc<Mutex<Database>>;

pub type Result<T> = std::result::Result<T, TriageError>;

pub fn shared(db: Database) -> SharedDb {
    Arc::new(Mutex::new(db))
}
