use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Fatal => "FATAL",
        }
    }

    pub fn from_level(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "TRACE" => Some(LogLevel::Trace),
            "DEBUG" => Some(LogLevel::Debug),
            "INFO" => Some(LogLevel::Info),
            "WARN" | "WARNING" => Some(LogLevel::Warn),
            "ERROR" => Some(LogLevel::Error),
            "FATAL" => Some(LogLevel::Fatal),
            _ => None,
        }
    }

    /// ERROR and FATAL events are the only ones a scan counts and clusters.
    pub fn is_error(self) -> bool {
        matches!(self, LogLevel::Error | LogLevel::Fatal)
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LogLevel::from_level(s).ok_or_else(|| format!("unknown log level '{}'", s))
    }
}

/// Where an event was emitted, or the frame a cluster is attributed to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: Option<String>,
    pub class: Option<String>,
    pub method: Option<String>,
    pub line: Option<i64>,
}

impl SourceLocation {
    pub fn is_empty(&self) -> bool {
        self.file.is_none() && self.class.is_none() && self.method.is_none() && self.line.is_none()
    }
}

/// One collected log row. Read-only to the triage pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    #[serde(default)]
    pub id: Option<i64>,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    #[serde(default)]
    pub logger: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub exception_class: Option<String>,
    #[serde(default)]
    pub stack_trace: Option<String>,
    #[serde(default)]
    pub location: SourceLocation,
    #[serde(default)]
    pub trace_id: Option<String>,
    #[serde(default)]
    pub thread_name: Option<String>,
    #[serde(default)]
    pub context: BTreeMap<String, String>,
}

impl LogEvent {
    pub fn new(timestamp: DateTime<Utc>, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            id: None,
            timestamp,
            level,
            logger: None,
            message: Some(message.into()),
            exception_class: None,
            stack_trace: None,
            location: SourceLocation::default(),
            trace_id: None,
            thread_name: None,
            context: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_parse_case_insensitively() {
        assert_eq!(LogLevel::from_level("error"), Some(LogLevel::Error));
        assert_eq!(LogLevel::from_level(" Fatal "), Some(LogLevel::Fatal));
        assert_eq!(LogLevel::from_level("warning"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::from_level("verbose"), None);
    }

    #[test]
    fn only_error_and_fatal_count_as_errors() {
        assert!(LogLevel::Error.is_error());
        assert!(LogLevel::Fatal.is_error());
        assert!(!LogLevel::Warn.is_error());
        assert!(!LogLevel::Trace.is_error());
    }

    #[test]
    fn event_deserializes_with_missing_optionals() {
        let json = r#"{"timestamp":"2026-10-16T10:00:00Z","level":"ERROR","message":"boom"}"#;
        let event: LogEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.level, LogLevel::Error);
        assert!(event.location.is_empty());
        assert!(event.context.is_empty());
    }
}
