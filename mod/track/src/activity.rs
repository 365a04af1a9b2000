//! Append-only activity log.
//!
//! Logging is a best-effort side channel: callers record entries after
//! the primary mutation committed and swallow append failures with a
//! warning. This store exposes no update or delete.

use std::sync::Arc;

use opentrack_core::ServiceError;
use opentrack_sql::{SQLStore, Value};

use crate::model::ActivityEntry;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS activity (
    id         TEXT PRIMARY KEY,
    data       TEXT NOT NULL,
    task_id    TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_activity_task ON activity(task_id);
";

pub struct ActivityStore {
    db: Arc<dyn SQLStore>,
}

impl ActivityStore {
    pub fn new(db: Arc<dyn SQLStore>) -> Result<Self, ServiceError> {
        db.exec_batch(SCHEMA)
            .map_err(|e| ServiceError::Storage(format!("activity schema init: {e}")))?;
        Ok(Self { db })
    }

    /// Append one entry.
    pub fn append(&self, entry: &ActivityEntry) -> Result<(), ServiceError> {
        let data =
            serde_json::to_string(entry).map_err(|e| ServiceError::Internal(e.to_string()))?;
        self.db
            .exec(
                "INSERT INTO activity (id, data, task_id, created_at) VALUES (?1, ?2, ?3, ?4)",
                &[
                    Value::Text(entry.id.clone()),
                    Value::Text(data),
                    Value::Text(entry.task_id.clone()),
                    Value::Text(entry.created_at.clone()),
                ],
            )
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        Ok(())
    }

    /// All entries for a task, oldest first.
    pub fn list_for_task(&self, task_id: &str) -> Result<Vec<ActivityEntry>, ServiceError> {
        let rows = self
            .db
            .query(
                "SELECT data FROM activity WHERE task_id = ?1 ORDER BY created_at, id",
                &[Value::Text(task_id.to_string())],
            )
            .map_err(|e| ServiceError::Storage(e.to_string()))?;

        rows.iter()
            .map(|row| {
                let data = row
                    .get_str("data")
                    .ok_or_else(|| ServiceError::Storage("missing data column".into()))?;
                serde_json::from_str(data).map_err(|e| ServiceError::Internal(e.to_string()))
            })
            .collect()
    }
}
