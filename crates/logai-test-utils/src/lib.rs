//! Shared fixtures for the logai crates: a schema-initialised SQLite
//! database on a temp file and builders for typical error log events.

use chrono::{DateTime, Utc};
use logai_types::{LogEvent, LogLevel, SourceLocation};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const SCHEMA_SQL: &str = include_str!("../../logai-storage/migrations/0001_init.sql");

/// A file-backed database in its own temp directory. The directory lives as
/// long as the `TestDb`, so connections opened via [`TestDb::open`] keep
/// working while it is held.
pub struct TestDb {
    conn: Connection,
    dir: TempDir,
}

impl TestDb {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let conn = Connection::open(dir.path().join("logai.db")).expect("failed to open test db");
        conn.pragma_update(None, "foreign_keys", true)
            .expect("failed to enable foreign keys");
        conn.execute_batch(SCHEMA_SQL)
            .expect("failed to apply schema");
        conn.pragma_update(None, "user_version", 1)
            .expect("failed to set schema version");
        Self { conn, dir }
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn path(&self) -> PathBuf {
        self.dir.path().join("logai.db")
    }

    /// Another connection to the same file.
    pub fn open(&self) -> Connection {
        let conn = Connection::open(self.path()).expect("failed to reopen test db");
        conn.pragma_update(None, "foreign_keys", true)
            .expect("failed to enable foreign keys");
        conn
    }

    /// Hands out the connection. The backing file is kept on disk (the temp
    /// directory is leaked) so the connection stays valid for the test.
    pub fn into_connection(self) -> Connection {
        let _ = self.dir.keep();
        self.conn
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }
}

impl Default for TestDb {
    fn default() -> Self {
        Self::new()
    }
}

/// A plain ERROR event without exception details.
pub fn error_event(timestamp: DateTime<Utc>, message: &str) -> LogEvent {
    LogEvent::new(timestamp, LogLevel::Error, message)
}

/// An ERROR event carrying an exception class and a stack trace whose
/// topmost frame is `frame` (e.g. `com.acme.OrderService.place(OrderService.java:42)`).
pub fn exception_event(
    timestamp: DateTime<Utc>,
    exception_class: &str,
    frame: &str,
    message: &str,
) -> LogEvent {
    let mut event = LogEvent::new(timestamp, LogLevel::Error, message);
    event.exception_class = Some(exception_class.to_string());
    event.stack_trace = Some(java_stack(exception_class, message, &[frame]));
    event
}

/// Same as [`exception_event`] but with a caller-provided location.
pub fn located_event(
    timestamp: DateTime<Utc>,
    exception_class: &str,
    location: SourceLocation,
    message: &str,
) -> LogEvent {
    let mut event = LogEvent::new(timestamp, LogLevel::Error, message);
    event.exception_class = Some(exception_class.to_string());
    event.location = location;
    event
}

/// Renders a Java-style stack trace: the header line followed by one
/// `\tat <frame>` line per frame.
pub fn java_stack(exception_class: &str, message: &str, frames: &[&str]) -> String {
    let mut out = format!("{}: {}", exception_class, message);
    for frame in frames {
        out.push_str("\n\tat ");
        out.push_str(frame);
    }
    out
}

/// Unified diff that passes grammar validation.
pub const VALID_DIFF: &str = "--- a/src/main/java/com/acme/OrderService.java
+++ b/src/main/java/com/acme/OrderService.java
@@ -40,3 +40,5 @@
     public void place(Order order) {
-        order.getCustomer().notify();
+        if (order.getCustomer() != null) {
+            order.getCustomer().notify();
+        }
     }
";
