//! SQLite persistence for the triage pipeline.
//!
//! One DAO per table, all borrowing the same [`Database`] connection. Callers
//! that share a database across tasks wrap it in a mutex; the cluster upsert is
//! additionally atomic at the SQL level, see [`ClustersDao::upsert`].

mod analyses;
mod applications;
pub mod codec;
mod clusters;
mod error;
mod jobs;
mod logs;
mod scans;
mod settings;

use std::path::Path;
use std::time::Duration;

use rusqlite::Connection;

pub use analyses::AnalysesDao;
pub use applications::ApplicationsDao;
pub use clusters::{ClustersDao, UpsertPolicy};
pub use error::{Result, StorageError};
pub use jobs::JobsDao;
pub use logs::{LogWindow, LogsDao};
pub use scans::ScansDao;
pub use settings::SettingsDao;

pub const SCHEMA_SQL: &str = include_str!("../migrations/0001_init.sql");
const SCHEMA_VERSION: i64 = 1;

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Adopt an existing connection, enabling foreign keys and applying the
    /// schema if it has not been applied yet.
    pub fn from_connection(conn: Connection) -> Result<Self> {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.pragma_update(None, "foreign_keys", true)?;
        migrate(&conn)?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn applications(&self) -> ApplicationsDao<'_> {
        ApplicationsDao { conn: &self.conn }
    }

    pub fn logs(&self) -> LogsDao<'_> {
        LogsDao { conn: &self.conn }
    }

    pub fn clusters(&self) -> ClustersDao<'_> {
        ClustersDao { conn: &self.conn }
    }

    pub fn scans(&self) -> ScansDao<'_> {
        ScansDao { conn: &self.conn }
    }

    pub fn analyses(&self) -> AnalysesDao<'_> {
        AnalysesDao { conn: &self.conn }
    }

    pub fn jobs(&self) -> JobsDao<'_> {
        JobsDao { conn: &self.conn }
    }

    pub fn settings(&self) -> SettingsDao<'_> {
        SettingsDao { conn: &self.conn }
    }
}

fn migrate(conn: &Connection) -> Result<()> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version < SCHEMA_VERSION {
        conn.execute_batch(SCHEMA_SQL)?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    }
    Ok(())
}
