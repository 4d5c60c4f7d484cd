use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use logai_types::{LogEvent, LogLevel, SourceLocation};
use rusqlite::{Connection, Row, Transaction, TransactionBehavior, params};

use crate::codec::{encode_ts, enum_col, ts_col};
use crate::error::Result;

pub struct LogsDao<'a> {
    pub(crate) conn: &'a Connection,
}

/// Time window over event timestamps: `[start, end]`, or `(start, end]` when
/// `exclusive_start` is set (a scan resuming from a watermark).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub exclusive_start: bool,
}

impl LogWindow {
    pub fn closed(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end,
            exclusive_start: false,
        }
    }

    pub fn after(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end,
            exclusive_start: true,
        }
    }
}

const LOG_COLUMNS: &str = "id, timestamp, level, logger, message, exception_class, stack_trace,
     file_name, class_name, method_name, line_number, trace_id, thread_name, mdc_context";

fn map_event(row: &Row<'_>) -> rusqlite::Result<LogEvent> {
    let context_json: Option<String> = row.get(13)?;
    let context = context_json
        .and_then(|raw| serde_json::from_str::<BTreeMap<String, String>>(&raw).ok())
        .unwrap_or_default();
    Ok(LogEvent {
        id: Some(row.get(0)?),
        timestamp: ts_col(row, 1)?,
        level: enum_col(row, 2, "level", LogLevel::from_level)?,
        logger: row.get(3)?,
        message: row.get(4)?,
        exception_class: row.get(5)?,
        stack_trace: row.get(6)?,
        location: SourceLocation {
            file: row.get(7)?,
            class: row.get(8)?,
            method: row.get(9)?,
            line: row.get(10)?,
        },
        trace_id: row.get(11)?,
        thread_name: row.get(12)?,
        context,
    })
}

impl LogsDao<'_> {
    /// Append a batch in one transaction. Returns the number of rows written.
    pub fn insert_batch(
        &self,
        app_id: &str,
        events: &[LogEvent],
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let created_at = encode_ts(&now);
        {
            let mut stmt = tx.prepare(
                "INSERT INTO log_entries
                 (app_id, timestamp, level, logger, message, exception_class, stack_trace,
                  file_name, class_name, method_name, line_number, trace_id, thread_name,
                  mdc_context, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            )?;
            for event in events {
                // MDC traceId is promoted when the event carries no explicit trace id.
                let trace_id = event
                    .trace_id
                    .clone()
                    .or_else(|| event.context.get("traceId").cloned());
                let context = if event.context.is_empty() {
                    None
                } else {
                    Some(serde_json::to_string(&event.context)?)
                };
                stmt.execute(params![
                    app_id,
                    encode_ts(&event.timestamp),
                    event.level.as_str(),
                    event.logger,
                    event.message,
                    event.exception_class,
                    event.stack_trace,
                    event.location.file,
                    event.location.class,
                    event.location.method,
                    event.location.line,
                    trace_id,
                    event.thread_name,
                    context,
                    created_at,
                ])?;
            }
        }
        tx.commit()?;
        Ok(events.len())
    }

    /// Events inside `window`, oldest first, at most `limit` rows.
    pub fn fetch_window(
        &self,
        app_id: &str,
        window: &LogWindow,
        limit: usize,
    ) -> Result<Vec<LogEvent>> {
        let lower = if window.exclusive_start { ">" } else { ">=" };
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM log_entries
             WHERE app_id = ?1 AND timestamp {} ?2 AND timestamp <= ?3
             ORDER BY timestamp ASC, id ASC LIMIT ?4",
            LOG_COLUMNS, lower
        ))?;
        let rows = stmt.query_map(
            params![
                app_id,
                encode_ts(&window.start),
                encode_ts(&window.end),
                limit as i64
            ],
            map_event,
        )?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Newest events first.
    pub fn recent(&self, app_id: &str, limit: usize) -> Result<Vec<LogEvent>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM log_entries WHERE app_id = ?1
             ORDER BY timestamp DESC, id DESC LIMIT ?2",
            LOG_COLUMNS
        ))?;
        let rows = stmt.query_map(params![app_id, limit as i64], map_event)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use chrono::Duration;
    use logai_test_utils::{TestDb, error_event};

    fn db_with_app() -> (Database, String) {
        let db = Database::from_connection(TestDb::new().into_connection()).unwrap();
        let app = db.applications().create("svc", None, Utc::now()).unwrap();
        (db, app.id)
    }

    #[test]
    fn window_is_inclusive_and_ordered() {
        let (db, app) = db_with_app();
        let now = Utc::now();
        let events = vec![
            error_event(now - Duration::hours(30), "too old"),
            error_event(now - Duration::hours(2), "second"),
            error_event(now - Duration::hours(5), "first"),
        ];
        assert_eq!(db.logs().insert_batch(&app, &events, now).unwrap(), 3);

        let window = LogWindow::closed(now - Duration::hours(24), now);
        let fetched = db.logs().fetch_window(&app, &window, 100).unwrap();
        let messages: Vec<_> = fetched.iter().filter_map(|e| e.message.clone()).collect();
        assert_eq!(messages, vec!["first", "second"]);
    }

    #[test]
    fn exclusive_start_skips_events_at_the_bound() {
        let (db, app) = db_with_app();
        let mark = crate::codec::truncate_ts(&(Utc::now() - Duration::hours(1)));
        let events = vec![
            error_event(mark, "at the mark"),
            error_event(mark + Duration::milliseconds(1), "just after"),
        ];
        db.logs().insert_batch(&app, &events, Utc::now()).unwrap();

        let closed = db.logs().fetch_window(&app, &LogWindow::closed(mark, Utc::now()), 10).unwrap();
        assert_eq!(closed.len(), 2);
        let after = db.logs().fetch_window(&app, &LogWindow::after(mark, Utc::now()), 10).unwrap();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].message.as_deref(), Some("just after"));
    }

    #[test]
    fn fetch_respects_limit() {
        let (db, app) = db_with_app();
        let now = Utc::now();
        let events: Vec<_> = (0..10)
            .map(|i| error_event(now - Duration::minutes(i), "boom"))
            .collect();
        db.logs().insert_batch(&app, &events, now).unwrap();
        let window = LogWindow::closed(now - Duration::hours(1), now);
        assert_eq!(db.logs().fetch_window(&app, &window, 4).unwrap().len(), 4);
    }

    #[test]
    fn context_and_trace_id_survive_storage() {
        let (db, app) = db_with_app();
        let now = Utc::now();
        let mut event = error_event(now, "boom");
        event.context.insert("traceId".into(), "t-123".into());
        event.context.insert("user".into(), "42".into());
        db.logs().insert_batch(&app, &[event], now).unwrap();

        let recent = db.logs().recent(&app, 10).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].trace_id.as_deref(), Some("t-123"));
        assert_eq!(recent[0].context.get("user").map(String::as_str), Some("42"));
    }
}
