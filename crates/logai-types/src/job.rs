use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which workflow a triage job belongs to. Leases are held per (cluster, kind).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Analysis,
    Patch,
}

impl JobKind {
    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::Analysis => "analysis",
            JobKind::Patch => "patch",
        }
    }

    pub fn from_kind(value: &str) -> Option<Self> {
        match value {
            "analysis" => Some(JobKind::Analysis),
            "patch" => Some(JobKind::Patch),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn from_status(value: &str) -> Option<Self> {
        match value {
            "running" => Some(JobStatus::Running),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

/// A triage job row. While `Running` it doubles as the lease on its cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageJob {
    pub id: String,
    pub cluster_id: String,
    pub kind: JobKind,
    pub status: JobStatus,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub lease_expires_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}
