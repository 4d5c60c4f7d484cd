use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Confidence {
    Low,
    Medium,
    High,
    Unknown,
}

impl Confidence {
    pub fn as_str(self) -> &'static str {
        match self {
            Confidence::Low => "LOW",
            Confidence::Medium => "MEDIUM",
            Confidence::High => "HIGH",
            Confidence::Unknown => "UNKNOWN",
        }
    }

    /// Lenient parse used for model output; anything unrecognized is `Unknown`.
    pub fn from_confidence(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "LOW" => Confidence::Low,
            "MEDIUM" => Confidence::Medium,
            "HIGH" => Confidence::High,
            _ => Confidence::Unknown,
        }
    }
}

/// Append-only record of one analysis invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub id: String,
    pub cluster_id: String,
    pub explanation: Option<String>,
    pub root_cause: Option<String>,
    pub recommendation: Option<String>,
    pub confidence: Confidence,
    pub model_used: Option<String>,
    pub tokens_used: Option<i64>,
    pub raw_response: Option<String>,
    pub patch: Option<String>,
    pub patch_file_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields produced by the reasoning step before the row is persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAnalysis {
    pub cluster_id: String,
    pub explanation: Option<String>,
    pub root_cause: Option<String>,
    pub recommendation: Option<String>,
    pub confidence: Confidence,
    pub model_used: Option<String>,
    pub tokens_used: Option<i64>,
    pub raw_response: Option<String>,
}

/// A validated unified diff attached to an analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    pub analysis_id: String,
    pub cluster_id: String,
    pub patch: String,
    pub patch_file_name: String,
}
