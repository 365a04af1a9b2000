use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use opentrack_core::ServiceError;

// ---------------------------------------------------------------------------
// TaskStatus / Priority
// ---------------------------------------------------------------------------

/// Board column a task sits in.
///
/// ```text
/// to_do ⇄ in_progress ⇄ done
/// ```
///
/// Any status can move to any other. Entering `done` stamps completion
/// metadata; leaving `done` clears it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    ToDo,
    InProgress,
    Done,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ToDo => "to_do",
            Self::InProgress => "in_progress",
            Self::Done => "done",
        }
    }

    /// Human-readable label, used in activity entries.
    pub fn label(&self) -> &'static str {
        match self {
            Self::ToDo => "To Do",
            Self::InProgress => "In Progress",
            Self::Done => "Done",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Default for Priority {
    fn default() -> Self {
        Self::Medium
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// A task tracked on a project board.
///
/// Belongs to exactly one project; the sprint association is a
/// nullable, mutable back-reference (deleting a sprint detaches its
/// tasks, it never deletes them).
///
/// Invariant: `completed_at`/`completed_by` are present iff
/// `status == done`. The engine stamps them on the transition into
/// done and clears both whenever status leaves done.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub project_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sprint_id: Option<String>,

    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub status: TaskStatus,
    #[serde(default)]
    pub priority: Priority,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_by: Option<String>,

    pub created_by: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Task {
    /// Whether completion metadata agrees with the status.
    pub fn completion_consistent(&self) -> bool {
        let done = self.status == TaskStatus::Done;
        self.completed_at.is_some() == done && self.completed_by.is_some() == done
    }
}

// ---------------------------------------------------------------------------
// Sprint
// ---------------------------------------------------------------------------

/// Derived sprint lifecycle state. Never stored — always computed from
/// the dates and the completed flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SprintStatus {
    Upcoming,
    Active,
    Overdue,
    Completed,
}

impl SprintStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upcoming => "upcoming",
            Self::Active => "active",
            Self::Overdue => "overdue",
            Self::Completed => "completed",
        }
    }
}

/// A time-boxed grouping of tasks within a project.
///
/// Invariants: `start_date < end_date` after every successful create
/// or update; `completed_at`/`completed_by` present iff `completed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sprint {
    pub id: String,
    pub project_id: String,
    pub name: String,

    pub start_date: NaiveDate,
    pub end_date: NaiveDate,

    #[serde(default)]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_by: Option<String>,

    pub created_by: String,
    pub created_at: String,
}

impl Sprint {
    /// Derive the lifecycle status for a given day.
    pub fn status(&self, today: NaiveDate) -> SprintStatus {
        if self.completed {
            SprintStatus::Completed
        } else if self.end_date < today {
            SprintStatus::Overdue
        } else if self.start_date <= today {
            SprintStatus::Active
        } else {
            SprintStatus::Upcoming
        }
    }

    /// Whether two sprints' date ranges intersect (inclusive bounds).
    pub fn overlaps(&self, other: &Sprint) -> bool {
        self.start_date <= other.end_date && other.start_date <= self.end_date
    }
}

/// A sprint together with its derived status, as returned by the API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SprintView {
    #[serde(flatten)]
    pub sprint: Sprint,
    pub status: SprintStatus,
}

/// Validate a sprint date range: the end must be strictly after the
/// start. Equal dates are rejected.
pub fn validate_date_range(start: NaiveDate, end: NaiveDate) -> Result<(), ServiceError> {
    if end <= start {
        return Err(ServiceError::Validation(format!(
            "sprint end date {end} must be after start date {start}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Project
// ---------------------------------------------------------------------------

/// Container for tasks and sprints within one workspace. Archived
/// projects are read-only: every lifecycle mutation re-checks this.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub workspace_id: String,
    pub name: String,
    #[serde(default)]
    pub archived: bool,
    pub created_at: String,
}

// ---------------------------------------------------------------------------
// Activity log
// ---------------------------------------------------------------------------

/// What happened to a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Created,
    Assigned,
    Unassigned,
    StatusChanged,
    Completed,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Assigned => "assigned",
            Self::Unassigned => "unassigned",
            Self::StatusChanged => "status_changed",
            Self::Completed => "completed",
        }
    }
}

/// Immutable record of a task mutation. Append-only: the store exposes
/// no update or delete for these.
///
/// Old/new values hold resolved display identity captured at write
/// time (status labels, member display names), so the entry stays
/// meaningful after the referenced member leaves the workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub id: String,
    pub task_id: String,
    pub actor_id: String,
    pub actor_name: String,
    pub kind: ActivityKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_value: Option<String>,
    pub created_at: String,
}

// ---------------------------------------------------------------------------
// Requests / responses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectRequest {
    pub workspace_id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    pub project_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub sprint_id: Option<String>,
    #[serde(default)]
    pub assignee_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSprintRequest {
    pub project_id: String,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// Task list filters.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskListQuery {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub sprint_id: Option<String>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub assignee_id: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
}

/// Result of creating a sprint. `overlapping` is advisory business
/// guidance, not a validation failure: names of non-completed sprints
/// in the same project whose date ranges intersect the new one.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SprintCreated {
    pub sprint: Sprint,
    pub overlapping: Vec<String>,
}

/// Result of completing a sprint. The sprint itself is authoritatively
/// complete even when the task cascade partially failed; in that case
/// `cascade_warning` carries a soft warning instead of the request
/// failing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SprintCompletion {
    pub sprint: Sprint,
    pub cascaded_task_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cascade_warning: Option<String>,
}
