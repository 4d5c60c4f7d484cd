//! Where a scan reads its events from.

use async_trait::async_trait;
use logai_storage::LogWindow;
use logai_types::LogEvent;

use crate::{Result, SharedDb};

#[async_trait]
pub trait LogSource: Send + Sync {
    /// Events for `app_id` inside `window`, oldest first, at most `limit`.
    async fn fetch(&self, app_id: &str, window: &LogWindow, limit: usize) -> Result<Vec<LogEvent>>;
}

/// Reads the ingested log table.
pub struct StoredLogSource {
    db: SharedDb,
}

impl StoredLogSource {
    pub fn new(db: SharedDb) -> Self {
        Self { db }
    }
}

#[async_trait]
impl LogSource for StoredLogSource {
    async fn fetch(&self, app_id: &str, window: &LogWindow, limit: usize) -> Result<Vec<LogEvent>> {
        let db = self.db.lock().await;
        Ok(db.logs().fetch_window(app_id, window, limit)?)
    }
}
