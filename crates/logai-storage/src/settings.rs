use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};

use crate::codec::encode_ts;
use crate::error::Result;

pub struct SettingsDao<'a> {
    pub(crate) conn: &'a Connection,
}

impl SettingsDao<'_> {
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let value: Option<Option<String>> = self
            .conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.flatten())
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let now = encode_ts(&Utc::now());
        self.conn.execute(
            "INSERT INTO settings (key, value, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now],
        )?;
        Ok(())
    }
}
