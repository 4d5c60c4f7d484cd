//! Shared data model for the log triage pipeline.

pub mod analysis;
pub mod application;
pub mod cluster;
pub mod error;
pub mod job;
pub mod log_event;
pub mod scan;

pub use analysis::{AnalysisResult, Confidence, NewAnalysis, Patch};
pub use application::{AppStats, Application};
pub use cluster::{
    ClusterCandidate, ClusterStatus, ErrorCluster, Severity, StatusChange, StatusChangeReason,
    UpsertOutcome,
};
pub use error::{ErrorKind, TriageError};
pub use job::{JobKind, JobStatus, TriageJob};
pub use log_event::{LogEvent, LogLevel, SourceLocation};
pub use scan::{ScanCounters, ScanRun, ScanStatus};
