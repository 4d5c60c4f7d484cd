use chrono::{DateTime, Utc};
use logai_types::{AppStats, Application, Severity};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::codec::{encode_ts, opt_ts_col, ts_col};
use crate::error::Result;

pub struct ApplicationsDao<'a> {
    pub(crate) conn: &'a Connection,
}

const APP_COLUMNS: &str = "id, name, description, api_key, source_paths, created_at, updated_at";

fn map_application(row: &Row<'_>) -> rusqlite::Result<Application> {
    Ok(Application {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        api_key: row.get(3)?,
        source_paths: row
            .get::<_, Option<String>>(4)?
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default(),
        created_at: ts_col(row, 5)?,
        updated_at: ts_col(row, 6)?,
    })
}

impl ApplicationsDao<'_> {
    pub fn create(
        &self,
        name: &str,
        description: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Application> {
        let id = uuid::Uuid::new_v4().to_string();
        let api_key = format!("lai_{}", uuid::Uuid::new_v4().simple());
        let ts = encode_ts(&now);
        self.conn.execute(
            "INSERT INTO applications (id, name, description, api_key, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![id, name, description, api_key, ts],
        )?;
        let app = self.conn.query_row(
            &format!("SELECT {} FROM applications WHERE id = ?1", APP_COLUMNS),
            params![id],
            map_application,
        )?;
        Ok(app)
    }

    pub fn get(&self, id: &str) -> Result<Option<Application>> {
        let app = self
            .conn
            .query_row(
                &format!("SELECT {} FROM applications WHERE id = ?1 LIMIT 1", APP_COLUMNS),
                params![id],
                map_application,
            )
            .optional()?;
        Ok(app)
    }

    /// Replaces the source roots; blank entries are dropped.
    pub fn set_source_paths(
        &self,
        id: &str,
        paths: &[String],
        now: DateTime<Utc>,
    ) -> Result<Option<Application>> {
        let paths: Vec<&str> = paths
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .collect();
        let rows = self.conn.execute(
            "UPDATE applications SET source_paths = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, serde_json::to_string(&paths)?, encode_ts(&now)],
        )?;
        if rows == 0 {
            return Ok(None);
        }
        self.get(id)
    }

    pub fn exists(&self, id: &str) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM applications WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn list(&self) -> Result<Vec<Application>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM applications ORDER BY created_at DESC, rowid DESC",
            APP_COLUMNS
        ))?;
        let rows = stmt.query_map([], map_application)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Deletes the application; logs, clusters, scans and analyses go with it
    /// through the foreign key cascade.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM applications WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    pub fn stats(&self, id: &str) -> Result<AppStats> {
        let (total_logs, error_logs, last_error) = self.conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(CASE WHEN level IN ('ERROR', 'FATAL') THEN 1 ELSE 0 END), 0),
                    MAX(CASE WHEN level IN ('ERROR', 'FATAL') THEN timestamp END)
             FROM log_entries WHERE app_id = ?1",
            params![id],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    opt_ts_col(row, 2)?,
                ))
            },
        )?;
        let (cluster_count, critical_count) = self.conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(CASE WHEN severity = ?2 THEN 1 ELSE 0 END), 0)
             FROM error_clusters WHERE app_id = ?1",
            params![id, Severity::Critical.as_str()],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
        )?;
        Ok(AppStats {
            total_logs,
            error_logs,
            cluster_count,
            critical_count,
            last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::Database;
    use chrono::Utc;
    use logai_test_utils::TestDb;

    fn db() -> Database {
        Database::from_connection(TestDb::new().into_connection()).unwrap()
    }

    #[test]
    fn create_get_and_list_newest_first() {
        let db = db();
        let apps = db.applications();
        let first = apps.create("billing", Some("payments"), Utc::now()).unwrap();
        let second = apps.create("search", None, Utc::now()).unwrap();

        assert!(first.api_key.starts_with("lai_"));
        assert_ne!(first.api_key, second.api_key);
        assert_eq!(apps.get(&first.id).unwrap().unwrap().name, "billing");

        let listed = apps.list().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, second.id);
    }

    #[test]
    fn source_paths_start_empty_and_can_be_replaced() {
        let db = db();
        let apps = db.applications();
        let app = apps.create("svc", None, Utc::now()).unwrap();
        assert!(app.source_paths.is_empty());

        let paths = vec!["/srv/svc".to_string(), "  ".to_string(), "/srv/lib".to_string()];
        let updated = apps.set_source_paths(&app.id, &paths, Utc::now()).unwrap().unwrap();
        assert_eq!(updated.source_paths, vec!["/srv/svc", "/srv/lib"]);
        assert_eq!(apps.get(&app.id).unwrap().unwrap().source_paths, updated.source_paths);

        assert!(apps.set_source_paths("missing", &paths, Utc::now()).unwrap().is_none());
    }

    #[test]
    fn delete_reports_whether_a_row_was_removed() {
        let db = db();
        let app = db.applications().create("svc", None, Utc::now()).unwrap();
        assert!(db.applications().delete(&app.id).unwrap());
        assert!(!db.applications().delete(&app.id).unwrap());
        assert!(!db.applications().exists(&app.id).unwrap());
    }

    #[test]
    fn stats_for_empty_application_are_zero() {
        let db = db();
        let app = db.applications().create("svc", None, Utc::now()).unwrap();
        let stats = db.applications().stats(&app.id).unwrap();
        assert_eq!(stats.total_logs, 0);
        assert_eq!(stats.cluster_count, 0);
        assert!(stats.last_error.is_none());
    }
}
