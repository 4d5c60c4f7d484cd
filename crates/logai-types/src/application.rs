use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub api_key: String,
    /// Checkout roots searched for a cluster's source file when a patch is
    /// requested without code.
    #[serde(default)]
    pub source_paths: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppStats {
    pub total_logs: i64,
    pub error_logs: i64,
    pub cluster_count: i64,
    pub critical_count: i64,
    pub last_error: Option<DateTime<Utc>>,
}
