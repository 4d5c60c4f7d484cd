//! Tunables for the triage pipeline. Every field has a default so a partial
//! (or empty) `[triage]` table is valid.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriageConfig {
    pub severity: SeverityConfig,
    pub fingerprint: FingerprintConfig,
    pub scan: ScanConfig,
    pub retry: RetryConfig,
    pub analysis: AnalysisConfig,
    pub llm: LlmConfig,
}

impl TriageConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityConfig {
    pub medium_threshold: i64,
    pub high_threshold: i64,
    pub critical_threshold: i64,
    /// Occurrences that make a dangerous exception CRITICAL.
    pub dangerous_critical_threshold: i64,
    /// MEDIUM only applies to clusters seen within this many hours.
    pub recency_window_hours: i64,
    /// Exception classes matched by simple name or fully-qualified name.
    pub dangerous_exceptions: Vec<String>,
}

impl Default for SeverityConfig {
    fn default() -> Self {
        Self {
            medium_threshold: 5,
            high_threshold: 20,
            critical_threshold: 100,
            dangerous_critical_threshold: 20,
            recency_window_hours: 24,
            dangerous_exceptions: [
                "OutOfMemoryError",
                "StackOverflowError",
                "DeadlockException",
                "DeadlockLoserDataAccessException",
                "CannotAcquireLockException",
                "ThreadDeath",
                "InternalError",
                "MemoryError",
                "RecursionError",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

impl SeverityConfig {
    pub fn is_dangerous(&self, exception_class: &str) -> bool {
        let simple = exception_class
            .rsplit(['.', '$'])
            .next()
            .unwrap_or(exception_class);
        self.dangerous_exceptions
            .iter()
            .any(|d| d == exception_class || d == simple)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FingerprintConfig {
    /// Frames whose class starts with one of these are library code and are
    /// skipped when picking the primary frame.
    pub framework_prefixes: Vec<String>,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            framework_prefixes: [
                "java.",
                "javax.",
                "jakarta.",
                "jdk.",
                "sun.",
                "com.sun.",
                "kotlin.",
                "scala.",
                "org.springframework.",
                "org.hibernate.",
                "org.apache.",
                "org.eclipse.jetty.",
                "io.netty.",
                "reactor.",
                "com.zaxxer.",
                "com.fasterxml.",
                "ch.qos.logback.",
                "org.slf4j.",
                "net.bytebuddy.",
                "com.google.common.",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Most events a single scan fetches.
    pub max_events: usize,
    pub max_lookback_hours: i64,
    /// Fingerprint groups upserted in parallel.
    pub upsert_concurrency: usize,
    pub timeout_secs: u64,
    /// Start each scan at the end of the last completed one so overlapping
    /// windows are not counted twice.
    pub use_watermark: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_events: 50_000,
            max_lookback_hours: 720,
            upsert_concurrency: 8,
            timeout_secs: 300,
            use_watermark: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub lease_ttl_secs: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            lease_ttl_secs: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Chat completions endpoint of an OpenAI-compatible API.
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub timeout_secs: u64,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 60,
            max_tokens: 2000,
            temperature: 0.2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_table_yields_defaults() {
        let cfg = TriageConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, TriageConfig::default());
        assert_eq!(cfg.severity.medium_threshold, 5);
        assert_eq!(cfg.scan.max_events, 50_000);
        assert!(!cfg.scan.use_watermark);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = TriageConfig::from_toml_str(
            r#"
            [severity]
            high_threshold = 50
            dangerous_exceptions = ["PoolExhaustedException"]

            [scan]
            use_watermark = true
            "#,
        )
        .unwrap();
        assert_eq!(cfg.severity.high_threshold, 50);
        assert_eq!(cfg.severity.medium_threshold, 5);
        assert!(cfg.scan.use_watermark);
        assert_eq!(cfg.scan.upsert_concurrency, 8);
        assert!(cfg.severity.is_dangerous("com.acme.PoolExhaustedException"));
        assert!(!cfg.severity.is_dangerous("java.lang.OutOfMemoryError"));
    }

    #[test]
    fn dangerous_match_uses_simple_or_full_name() {
        let cfg = SeverityConfig::default();
        assert!(cfg.is_dangerous("java.lang.OutOfMemoryError"));
        assert!(cfg.is_dangerous("OutOfMemoryError"));
        assert!(cfg.is_dangerous("com.acme.Outer$DeadlockException"));
        assert!(!cfg.is_dangerous("java.lang.NullPointerException"));
        assert!(!cfg.is_dangerous("com.acme.NotAnOutOfMemoryError"));
    }
}
