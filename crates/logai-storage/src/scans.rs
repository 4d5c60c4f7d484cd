use chrono::{DateTime, Utc};
use logai_types::{ScanCounters, ScanRun, ScanStatus};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::codec::{encode_ts, enum_col, opt_ts_col, ts_col};
use crate::error::{Result, StorageError};
use crate::logs::LogWindow;

pub struct ScansDao<'a> {
    pub(crate) conn: &'a Connection,
}

const SCAN_COLUMNS: &str = "id, app_id, status, window_start, window_end, started_at, completed_at,
     logs_scanned, errors_found, clusters_created, clusters_analyzed, error_message";

fn map_scan(row: &Row<'_>) -> rusqlite::Result<ScanRun> {
    Ok(ScanRun {
        id: row.get(0)?,
        app_id: row.get(1)?,
        status: enum_col(row, 2, "scan status", ScanStatus::from_status)?,
        window_start: ts_col(row, 3)?,
        window_end: ts_col(row, 4)?,
        started_at: ts_col(row, 5)?,
        completed_at: opt_ts_col(row, 6)?,
        logs_scanned: row.get(7)?,
        errors_found: row.get(8)?,
        clusters_created: row.get(9)?,
        clusters_analyzed: row.get(10)?,
        error_message: row.get(11)?,
    })
}

impl ScansDao<'_> {
    pub fn start(&self, app_id: &str, window: &LogWindow, now: DateTime<Utc>) -> Result<ScanRun> {
        let id = uuid::Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO scan_history (id, app_id, status, window_start, window_end, started_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id,
                app_id,
                ScanStatus::Running.as_str(),
                encode_ts(&window.start),
                encode_ts(&window.end),
                encode_ts(&now)
            ],
        )?;
        self.require(&id)
    }

    /// `covered_to` replaces the recorded window end when the scan stopped
    /// short of it (result-size cap), so the watermark never skips events.
    pub fn complete(
        &self,
        id: &str,
        counters: &ScanCounters,
        covered_to: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<ScanRun> {
        self.finish(id, ScanStatus::Completed, counters, None, covered_to, now)
    }

    pub fn fail(
        &self,
        id: &str,
        error_message: &str,
        counters: &ScanCounters,
        now: DateTime<Utc>,
    ) -> Result<ScanRun> {
        self.finish(id, ScanStatus::Failed, counters, Some(error_message), None, now)
    }

    /// Moves a RUNNING scan to a terminal status. The `status = 'RUNNING'` guard
    /// makes a second finalization an error instead of an overwrite.
    fn finish(
        &self,
        id: &str,
        status: ScanStatus,
        counters: &ScanCounters,
        error_message: Option<&str>,
        covered_to: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<ScanRun> {
        let rows = self.conn.execute(
            "UPDATE scan_history
             SET status = ?2, completed_at = ?3, logs_scanned = ?4, errors_found = ?5,
                 clusters_created = ?6, clusters_analyzed = ?7, error_message = ?8,
                 window_end = COALESCE(?10, window_end)
             WHERE id = ?1 AND status = ?9",
            params![
                id,
                status.as_str(),
                encode_ts(&now),
                counters.logs_scanned,
                counters.errors_found,
                counters.clusters_created,
                counters.clusters_analyzed,
                error_message,
                ScanStatus::Running.as_str(),
                covered_to.as_ref().map(encode_ts),
            ],
        )?;
        if rows == 0 {
            let current = self.require(id)?;
            return Err(StorageError::InvalidTransition {
                entity: "scan",
                id: id.to_string(),
                from: current.status.as_str().to_string(),
                to: status.as_str().to_string(),
            });
        }
        self.require(id)
    }

    pub fn get(&self, id: &str) -> Result<Option<ScanRun>> {
        let scan = self
            .conn
            .query_row(
                &format!("SELECT {} FROM scan_history WHERE id = ?1", SCAN_COLUMNS),
                params![id],
                map_scan,
            )
            .optional()?;
        Ok(scan)
    }

    fn require(&self, id: &str) -> Result<ScanRun> {
        self.get(id)?.ok_or_else(|| StorageError::NotFound {
            entity: "scan",
            id: id.to_string(),
        })
    }

    /// Most recent scans for an application, newest first.
    pub fn history(&self, app_id: &str, limit: usize) -> Result<Vec<ScanRun>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM scan_history WHERE app_id = ?1
             ORDER BY started_at DESC, rowid DESC LIMIT ?2",
            SCAN_COLUMNS
        ))?;
        let rows = stmt.query_map(params![app_id, limit as i64], map_scan)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// End of the newest window a completed scan covered, used as a watermark.
    pub fn last_completed_window_end(&self, app_id: &str) -> Result<Option<DateTime<Utc>>> {
        let end = self.conn.query_row(
            "SELECT MAX(window_end) FROM scan_history WHERE app_id = ?1 AND status = ?2",
            params![app_id, ScanStatus::Completed.as_str()],
            |row| opt_ts_col(row, 0),
        )?;
        Ok(end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use chrono::Duration;
    use logai_test_utils::TestDb;

    fn setup() -> (Database, String, LogWindow) {
        let db = Database::from_connection(TestDb::new().into_connection()).unwrap();
        let app = db.applications().create("svc", None, Utc::now()).unwrap();
        let now = Utc::now();
        let window = LogWindow::closed(now - Duration::hours(24), now);
        (db, app.id, window)
    }

    #[test]
    fn run_starts_running_and_completes_once() {
        let (db, app, window) = setup();
        let run = db.scans().start(&app, &window, Utc::now()).unwrap();
        assert_eq!(run.status, ScanStatus::Running);
        assert!(run.completed_at.is_none());

        let counters = ScanCounters {
            logs_scanned: 10,
            errors_found: 10,
            clusters_created: 2,
            clusters_analyzed: 0,
        };
        let done = db.scans().complete(&run.id, &counters, None, Utc::now()).unwrap();
        assert_eq!(done.status, ScanStatus::Completed);
        assert_eq!(done.logs_scanned, 10);
        assert!(done.completed_at.is_some());
        assert!(done.error_message.is_none());

        let again = db.scans().fail(&run.id, "late", &counters, Utc::now());
        assert!(matches!(again, Err(StorageError::InvalidTransition { .. })));
        assert_eq!(
            db.scans().get(&run.id).unwrap().unwrap().status,
            ScanStatus::Completed
        );
    }

    #[test]
    fn failed_run_keeps_error_message() {
        let (db, app, window) = setup();
        let run = db.scans().start(&app, &window, Utc::now()).unwrap();
        let failed = db
            .scans()
            .fail(&run.id, "log source unreachable", &ScanCounters::default(), Utc::now())
            .unwrap();
        assert_eq!(failed.status, ScanStatus::Failed);
        assert_eq!(failed.error_message.as_deref(), Some("log source unreachable"));
    }

    #[test]
    fn watermark_only_counts_completed_runs() {
        let (db, app, window) = setup();
        assert!(db.scans().last_completed_window_end(&app).unwrap().is_none());

        let failed = db.scans().start(&app, &window, Utc::now()).unwrap();
        db.scans()
            .fail(&failed.id, "boom", &ScanCounters::default(), Utc::now())
            .unwrap();
        assert!(db.scans().last_completed_window_end(&app).unwrap().is_none());

        let ok = db.scans().start(&app, &window, Utc::now()).unwrap();
        db.scans()
            .complete(&ok.id, &ScanCounters::default(), None, Utc::now())
            .unwrap();
        assert_eq!(
            db.scans().last_completed_window_end(&app).unwrap(),
            Some(crate::codec::truncate_ts(&window.end))
        );
        assert_eq!(db.scans().history(&app, 10).unwrap().len(), 2);
    }

    #[test]
    fn truncated_run_records_what_it_covered() {
        let (db, app, window) = setup();
        let covered_to = window.start + Duration::hours(3);
        let run = db.scans().start(&app, &window, Utc::now()).unwrap();
        let done = db
            .scans()
            .complete(&run.id, &ScanCounters::default(), Some(covered_to), Utc::now())
            .unwrap();
        assert_eq!(done.window_end, crate::codec::truncate_ts(&covered_to));
        assert_eq!(
            db.scans().last_completed_window_end(&app).unwrap(),
            Some(crate::codec::truncate_ts(&covered_to))
        );
    }
}
