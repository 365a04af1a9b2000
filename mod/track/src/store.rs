use std::sync::Arc;

use opentrack_core::{ListResult, ServiceError};
use opentrack_sql::{Row, SQLStore, Value};

use crate::model::{Project, Sprint, Task, TaskListQuery};

/// SQL schema for the tracking tables.
///
/// One JSON `data` column per record plus indexed columns for the
/// fields queries filter on.
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS projects (
    id           TEXT PRIMARY KEY,
    data         TEXT NOT NULL,
    workspace_id TEXT NOT NULL,
    archived     INTEGER NOT NULL DEFAULT 0,
    created_at   TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_project_workspace ON projects(workspace_id);

CREATE TABLE IF NOT EXISTS tasks (
    id          TEXT PRIMARY KEY,
    data        TEXT NOT NULL,
    project_id  TEXT NOT NULL,
    sprint_id   TEXT,
    status      TEXT NOT NULL,
    assignee_id TEXT,
    created_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_task_project ON tasks(project_id);
CREATE INDEX IF NOT EXISTS idx_task_sprint ON tasks(sprint_id);
CREATE INDEX IF NOT EXISTS idx_task_status ON tasks(status);

CREATE TABLE IF NOT EXISTS sprints (
    id         TEXT PRIMARY KEY,
    data       TEXT NOT NULL,
    project_id TEXT NOT NULL,
    completed  INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_sprint_project ON sprints(project_id);
";

/// Persistent storage for projects, tasks, and sprints.
pub struct TrackStore {
    db: Arc<dyn SQLStore>,
}

impl TrackStore {
    /// Create a new TrackStore and initialise the schema.
    pub fn new(db: Arc<dyn SQLStore>) -> Result<Self, ServiceError> {
        db.exec_batch(SCHEMA)
            .map_err(|e| ServiceError::Storage(format!("track schema init: {e}")))?;
        Ok(Self { db })
    }

    // -----------------------------------------------------------------------
    // Projects
    // -----------------------------------------------------------------------

    pub fn create_project(&self, project: &Project) -> Result<(), ServiceError> {
        let data = encode(project)?;
        self.db
            .exec(
                "INSERT INTO projects (id, data, workspace_id, archived, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                &[
                    Value::Text(project.id.clone()),
                    Value::Text(data),
                    Value::Text(project.workspace_id.clone()),
                    Value::Integer(project.archived as i64),
                    Value::Text(project.created_at.clone()),
                ],
            )
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        Ok(())
    }

    pub fn get_project(&self, id: &str) -> Result<Project, ServiceError> {
        let rows = self
            .db
            .query(
                "SELECT data FROM projects WHERE id = ?1",
                &[Value::Text(id.to_string())],
            )
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        let row = rows
            .first()
            .ok_or_else(|| ServiceError::NotFound(format!("project {id}")))?;
        decode(row)
    }

    pub fn update_project(&self, project: &Project) -> Result<(), ServiceError> {
        let data = encode(project)?;
        let affected = self
            .db
            .exec(
                "UPDATE projects SET data = ?1, archived = ?2 WHERE id = ?3",
                &[
                    Value::Text(data),
                    Value::Integer(project.archived as i64),
                    Value::Text(project.id.clone()),
                ],
            )
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        if affected == 0 {
            return Err(ServiceError::NotFound(format!("project {}", project.id)));
        }
        Ok(())
    }

    pub fn list_projects(
        &self,
        workspace_id: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<ListResult<Project>, ServiceError> {
        let (filter, params) = match workspace_id {
            Some(ws) => (
                " WHERE workspace_id = ?1".to_string(),
                vec![Value::Text(ws.to_string())],
            ),
            None => (String::new(), Vec::new()),
        };

        let total = self.count(&format!("SELECT COUNT(*) AS n FROM projects{filter}"), &params)?;
        let rows = self
            .db
            .query(
                &format!(
                    "SELECT data FROM projects{filter} ORDER BY created_at LIMIT {limit} OFFSET {offset}"
                ),
                &params,
            )
            .map_err(|e| ServiceError::Storage(e.to_string()))?;

        let items = rows.iter().map(decode).collect::<Result<Vec<_>, _>>()?;
        Ok(ListResult { items, total })
    }

    // -----------------------------------------------------------------------
    // Tasks
    // -----------------------------------------------------------------------

    pub fn create_task(&self, task: &Task) -> Result<(), ServiceError> {
        let data = encode(task)?;
        self.db
            .exec(
                "INSERT INTO tasks (id, data, project_id, sprint_id, status, assignee_id, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                &[
                    Value::Text(task.id.clone()),
                    Value::Text(data),
                    Value::Text(task.project_id.clone()),
                    Value::opt_text(task.sprint_id.as_deref()),
                    Value::Text(task.status.as_str().to_string()),
                    Value::opt_text(task.assignee_id.as_deref()),
                    Value::Text(task.created_at.clone()),
                ],
            )
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        Ok(())
    }

    pub fn get_task(&self, id: &str) -> Result<Task, ServiceError> {
        let rows = self
            .db
            .query(
                "SELECT data FROM tasks WHERE id = ?1",
                &[Value::Text(id.to_string())],
            )
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        let row = rows
            .first()
            .ok_or_else(|| ServiceError::NotFound(format!("task {id}")))?;
        decode(row)
    }

    /// Full replacement of the data column plus indexed columns.
    pub fn update_task(&self, task: &Task) -> Result<(), ServiceError> {
        let data = encode(task)?;
        let affected = self
            .db
            .exec(
                "UPDATE tasks SET data = ?1, sprint_id = ?2, status = ?3, assignee_id = ?4 \
                 WHERE id = ?5",
                &[
                    Value::Text(data),
                    Value::opt_text(task.sprint_id.as_deref()),
                    Value::Text(task.status.as_str().to_string()),
                    Value::opt_text(task.assignee_id.as_deref()),
                    Value::Text(task.id.clone()),
                ],
            )
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        if affected == 0 {
            return Err(ServiceError::NotFound(format!("task {}", task.id)));
        }
        Ok(())
    }

    pub fn delete_task(&self, id: &str) -> Result<(), ServiceError> {
        let affected = self
            .db
            .exec("DELETE FROM tasks WHERE id = ?1", &[Value::Text(id.to_string())])
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        if affected == 0 {
            return Err(ServiceError::NotFound(format!("task {id}")));
        }
        Ok(())
    }

    pub fn list_tasks(&self, query: &TaskListQuery) -> Result<ListResult<Task>, ServiceError> {
        let limit = query.limit.unwrap_or(50);
        let offset = query.offset.unwrap_or(0);

        let mut where_clauses: Vec<String> = Vec::new();
        let mut params: Vec<Value> = Vec::new();
        let mut idx = 1;

        if let Some(ref p) = query.project_id {
            where_clauses.push(format!("project_id = ?{idx}"));
            params.push(Value::Text(p.clone()));
            idx += 1;
        }
        if let Some(ref s) = query.sprint_id {
            where_clauses.push(format!("sprint_id = ?{idx}"));
            params.push(Value::Text(s.clone()));
            idx += 1;
        }
        if let Some(status) = query.status {
            where_clauses.push(format!("status = ?{idx}"));
            params.push(Value::Text(status.as_str().to_string()));
            idx += 1;
        }
        if let Some(ref a) = query.assignee_id {
            where_clauses.push(format!("assignee_id = ?{idx}"));
            params.push(Value::Text(a.clone()));
        }

        let filter = if where_clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", where_clauses.join(" AND "))
        };

        let total = self.count(&format!("SELECT COUNT(*) AS n FROM tasks{filter}"), &params)?;
        let rows = self
            .db
            .query(
                &format!(
                    "SELECT data FROM tasks{filter} ORDER BY created_at LIMIT {limit} OFFSET {offset}"
                ),
                &params,
            )
            .map_err(|e| ServiceError::Storage(e.to_string()))?;

        let items = rows.iter().map(decode).collect::<Result<Vec<_>, _>>()?;
        Ok(ListResult { items, total })
    }

    /// All tasks currently attached to a sprint.
    pub fn tasks_in_sprint(&self, sprint_id: &str) -> Result<Vec<Task>, ServiceError> {
        let rows = self
            .db
            .query(
                "SELECT data FROM tasks WHERE sprint_id = ?1 ORDER BY created_at",
                &[Value::Text(sprint_id.to_string())],
            )
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        rows.iter().map(decode).collect()
    }

    /// Point a task at a sprint (or detach it with `None`), keeping
    /// the JSON data column and the indexed column in agreement.
    pub fn set_task_sprint(
        &self,
        task_id: &str,
        sprint_id: Option<&str>,
    ) -> Result<(), ServiceError> {
        let mut task = self.get_task(task_id)?;
        task.sprint_id = sprint_id.map(|s| s.to_string());
        self.update_task(&task)
    }

    // -----------------------------------------------------------------------
    // Sprints
    // -----------------------------------------------------------------------

    pub fn create_sprint(&self, sprint: &Sprint) -> Result<(), ServiceError> {
        let data = encode(sprint)?;
        self.db
            .exec(
                "INSERT INTO sprints (id, data, project_id, completed, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                &[
                    Value::Text(sprint.id.clone()),
                    Value::Text(data),
                    Value::Text(sprint.project_id.clone()),
                    Value::Integer(sprint.completed as i64),
                    Value::Text(sprint.created_at.clone()),
                ],
            )
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        Ok(())
    }

    pub fn get_sprint(&self, id: &str) -> Result<Sprint, ServiceError> {
        let rows = self
            .db
            .query(
                "SELECT data FROM sprints WHERE id = ?1",
                &[Value::Text(id.to_string())],
            )
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        let row = rows
            .first()
            .ok_or_else(|| ServiceError::NotFound(format!("sprint {id}")))?;
        decode(row)
    }

    pub fn update_sprint(&self, sprint: &Sprint) -> Result<(), ServiceError> {
        let data = encode(sprint)?;
        let affected = self
            .db
            .exec(
                "UPDATE sprints SET data = ?1, completed = ?2 WHERE id = ?3",
                &[
                    Value::Text(data),
                    Value::Integer(sprint.completed as i64),
                    Value::Text(sprint.id.clone()),
                ],
            )
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        if affected == 0 {
            return Err(ServiceError::NotFound(format!("sprint {}", sprint.id)));
        }
        Ok(())
    }

    pub fn delete_sprint(&self, id: &str) -> Result<(), ServiceError> {
        let affected = self
            .db
            .exec(
                "DELETE FROM sprints WHERE id = ?1",
                &[Value::Text(id.to_string())],
            )
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        if affected == 0 {
            return Err(ServiceError::NotFound(format!("sprint {id}")));
        }
        Ok(())
    }

    pub fn sprints_by_project(&self, project_id: &str) -> Result<Vec<Sprint>, ServiceError> {
        let rows = self
            .db
            .query(
                "SELECT data FROM sprints WHERE project_id = ?1 ORDER BY created_at",
                &[Value::Text(project_id.to_string())],
            )
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        rows.iter().map(decode).collect()
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn count(&self, sql: &str, params: &[Value]) -> Result<usize, ServiceError> {
        let rows = self
            .db
            .query(sql, params)
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        Ok(rows
            .first()
            .and_then(|r| r.get_i64("n"))
            .unwrap_or(0) as usize)
    }
}

fn encode<T: serde::Serialize>(value: &T) -> Result<String, ServiceError> {
    serde_json::to_string(value).map_err(|e| ServiceError::Internal(e.to_string()))
}

fn decode<T: serde::de::DeserializeOwned>(row: &Row) -> Result<T, ServiceError> {
    let data = row
        .get_str("data")
        .ok_or_else(|| ServiceError::Storage("missing data column".into()))?;
    serde_json::from_str(data).map_err(|e| ServiceError::Internal(e.to_string()))
}
