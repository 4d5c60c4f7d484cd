use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScanStatus {
    Running,
    Completed,
    Failed,
}

impl ScanStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ScanStatus::Running => "RUNNING",
            ScanStatus::Completed => "COMPLETED",
            ScanStatus::Failed => "FAILED",
        }
    }

    pub fn from_status(value: &str) -> Option<Self> {
        match value {
            "RUNNING" => Some(ScanStatus::Running),
            "COMPLETED" => Some(ScanStatus::Completed),
            "FAILED" => Some(ScanStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, ScanStatus::Running)
    }
}

/// One scan invocation. Created RUNNING, finalized exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRun {
    pub id: String,
    pub app_id: String,
    pub status: ScanStatus,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub logs_scanned: i64,
    pub errors_found: i64,
    pub clusters_created: i64,
    pub clusters_analyzed: i64,
    pub error_message: Option<String>,
}

/// Counters written when a scan run is finalized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanCounters {
    pub logs_scanned: i64,
    pub errors_found: i64,
    pub clusters_created: i64,
    pub clusters_analyzed: i64,
}
