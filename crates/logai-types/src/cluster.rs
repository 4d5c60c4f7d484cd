use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::log_event::SourceLocation;

/// Severity tiers in escalation order; `Ord` follows that order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }

    pub fn from_severity(value: &str) -> Option<Self> {
        match value {
            "LOW" => Some(Severity::Low),
            "MEDIUM" => Some(Severity::Medium),
            "HIGH" => Some(Severity::High),
            "CRITICAL" => Some(Severity::Critical),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ClusterStatus {
    Open,
    Acknowledged,
    Resolved,
    Ignored,
}

impl ClusterStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ClusterStatus::Open => "OPEN",
            ClusterStatus::Acknowledged => "ACKNOWLEDGED",
            ClusterStatus::Resolved => "RESOLVED",
            ClusterStatus::Ignored => "IGNORED",
        }
    }

    pub fn from_status(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "OPEN" => Some(ClusterStatus::Open),
            "ACKNOWLEDGED" => Some(ClusterStatus::Acknowledged),
            "RESOLVED" => Some(ClusterStatus::Resolved),
            "IGNORED" => Some(ClusterStatus::Ignored),
            _ => None,
        }
    }
}

/// Aggregate of every occurrence sharing one fingerprint within an application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorCluster {
    pub id: String,
    pub app_id: String,
    pub fingerprint: String,
    pub exception_class: Option<String>,
    pub message_pattern: Option<String>,
    pub primary_file: Option<String>,
    pub primary_class: Option<String>,
    pub primary_method: Option<String>,
    pub primary_line: Option<i64>,
    pub sample_message: Option<String>,
    pub sample_stack_trace: Option<String>,
    pub occurrence_count: i64,
    pub severity: Severity,
    pub status: ClusterStatus,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ErrorCluster {
    pub fn primary_location(&self) -> SourceLocation {
        SourceLocation {
            file: self.primary_file.clone(),
            class: self.primary_class.clone(),
            method: self.primary_method.clone(),
            line: self.primary_line,
        }
    }
}

/// Descriptive fields derived from the occurrence that produced a fingerprint.
/// Only used when the upsert inserts a new cluster.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterCandidate {
    pub exception_class: Option<String>,
    pub message_pattern: Option<String>,
    pub location: SourceLocation,
    pub sample_message: Option<String>,
    pub sample_stack_trace: Option<String>,
}

/// Result of one cluster upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertOutcome {
    pub cluster: ErrorCluster,
    pub created: bool,
    pub reopened: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusChangeReason {
    Operator,
    Reopened,
}

impl StatusChangeReason {
    pub fn as_str(self) -> &'static str {
        match self {
            StatusChangeReason::Operator => "operator",
            StatusChangeReason::Reopened => "reopened",
        }
    }

    pub fn from_reason(value: &str) -> Option<Self> {
        match value {
            "operator" => Some(StatusChangeReason::Operator),
            "reopened" => Some(StatusChangeReason::Reopened),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    pub id: i64,
    pub cluster_id: String,
    pub from_status: ClusterStatus,
    pub to_status: ClusterStatus,
    pub reason: StatusChangeReason,
    pub created_at: DateTime<Utc>,
}
