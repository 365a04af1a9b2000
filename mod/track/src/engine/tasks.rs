//! Task lifecycle: create, patch, delete, and the activity trail.

use opentrack_core::{ListResult, ServiceError, merge_patch, new_id, now_rfc3339};

use crate::model::{
    ActivityEntry, ActivityKind, CreateTaskRequest, Task, TaskListQuery, TaskStatus,
};

use super::TrackEngine;

impl TrackEngine {
    // =======================================================================
    // Reads
    // =======================================================================

    pub fn get_task(&self, id: &str) -> Result<Task, ServiceError> {
        self.store.get_task(id)
    }

    pub fn list_tasks(&self, query: &TaskListQuery) -> Result<ListResult<Task>, ServiceError> {
        self.store.list_tasks(query)
    }

    pub fn activity_for_task(&self, id: &str) -> Result<Vec<ActivityEntry>, ServiceError> {
        // Resolve the task first so a missing id is a clean not-found.
        let task = self.store.get_task(id)?;
        self.activity.list_for_task(&task.id)
    }

    // =======================================================================
    // Mutations
    // =======================================================================

    pub fn create_task(&self, actor: &str, req: CreateTaskRequest) -> Result<Task, ServiceError> {
        self.gate(actor, &self.limits.create_task)?;
        let project = self.writable_project(&req.project_id)?;
        self.require_member(&project.workspace_id, actor)?;

        if req.title.trim().is_empty() {
            return Err(ServiceError::Validation("task title must not be empty".into()));
        }
        if let Some(ref sprint_id) = req.sprint_id {
            self.resolve_sprint_in_project(sprint_id, &project.id)?;
        }
        if let Some(ref assignee) = req.assignee_id {
            self.resolve_assignee(&project.workspace_id, assignee)?;
        }

        let now = now_rfc3339();
        let status = req.status.unwrap_or(TaskStatus::ToDo);
        let done = status == TaskStatus::Done;
        let task = Task {
            id: new_id(),
            project_id: project.id.clone(),
            sprint_id: req.sprint_id,
            title: req.title,
            description: req.description,
            status,
            priority: req.priority.unwrap_or_default(),
            assignee_id: req.assignee_id,
            completed_at: done.then(|| now.clone()),
            completed_by: done.then(|| actor.to_string()),
            created_by: actor.to_string(),
            created_at: now.clone(),
            updated_at: now,
        };
        self.store.create_task(&task)?;
        self.limiter.record(actor, &self.limits.create_task.prefix);

        let ws = &project.workspace_id;
        self.log(self.entry(
            &task.id,
            ws,
            actor,
            ActivityKind::Created,
            None,
            Some(task.title.clone()),
        ));
        if let Some(ref assignee) = task.assignee_id {
            let name = self.display(ws, assignee);
            self.log(self.entry(&task.id, ws, actor, ActivityKind::Assigned, None, Some(name)));
        }

        Ok(task)
    }

    /// Apply a JSON merge-patch to a task.
    ///
    /// Server-controlled fields (identity, ownership, completion
    /// metadata) are pinned across the merge; completion metadata is
    /// derived from the status transition, never taken from the patch.
    pub fn update_task(
        &self,
        actor: &str,
        id: &str,
        patch: serde_json::Value,
    ) -> Result<Task, ServiceError> {
        self.gate(actor, &self.limits.update_task)?;
        let current = self.store.get_task(id)?;
        let project = self.writable_project(&current.project_id)?;
        self.require_member(&project.workspace_id, actor)?;

        if !patch.is_object() {
            return Err(ServiceError::Validation("patch must be a JSON object".into()));
        }

        let mut base = serde_json::to_value(&current)
            .map_err(|e| ServiceError::Internal(e.to_string()))?;
        merge_patch(&mut base, &patch);
        base["id"] = serde_json::json!(current.id);
        base["projectId"] = serde_json::json!(current.project_id);
        base["createdBy"] = serde_json::json!(current.created_by);
        base["createdAt"] = serde_json::json!(current.created_at);

        let mut updated: Task = serde_json::from_value(base)
            .map_err(|e| ServiceError::Validation(format!("invalid task patch: {e}")))?;
        if updated.title.trim().is_empty() {
            return Err(ServiceError::Validation("task title must not be empty".into()));
        }

        if updated.sprint_id != current.sprint_id {
            if let Some(ref sprint_id) = updated.sprint_id {
                self.resolve_sprint_in_project(sprint_id, &project.id)?;
            }
        }
        if updated.assignee_id != current.assignee_id {
            // Membership is re-validated per write; the OLD assignee may
            // be a former member and that is fine.
            if let Some(ref assignee) = updated.assignee_id {
                self.resolve_assignee(&project.workspace_id, assignee)?;
            }
        }

        let now = now_rfc3339();
        match (current.status, updated.status) {
            // Entering done: stamp with the acting user and now.
            (from, TaskStatus::Done) if from != TaskStatus::Done => {
                updated.completed_at = Some(now.clone());
                updated.completed_by = Some(actor.to_string());
            }
            // Leaving done: clear both, unconditionally.
            (TaskStatus::Done, to) if to != TaskStatus::Done => {
                updated.completed_at = None;
                updated.completed_by = None;
            }
            // No transition across the done boundary: keep what was there.
            _ => {
                updated.completed_at = current.completed_at.clone();
                updated.completed_by = current.completed_by.clone();
            }
        }
        updated.updated_at = now;

        self.store.update_task(&updated)?;
        self.limiter.record(actor, &self.limits.update_task.prefix);

        self.log_task_changes(actor, &project.workspace_id, &current, &updated);
        Ok(updated)
    }

    pub fn delete_task(&self, actor: &str, id: &str) -> Result<(), ServiceError> {
        self.gate(actor, &self.limits.delete_task)?;
        let task = self.store.get_task(id)?;
        let project = self.writable_project(&task.project_id)?;
        self.require_member(&project.workspace_id, actor)?;

        self.store.delete_task(id)?;
        self.limiter.record(actor, &self.limits.delete_task.prefix);
        Ok(())
    }

    // =======================================================================
    // Helpers
    // =======================================================================

    fn resolve_sprint_in_project(
        &self,
        sprint_id: &str,
        project_id: &str,
    ) -> Result<(), ServiceError> {
        let sprint = self.store.get_sprint(sprint_id)?;
        if sprint.project_id != project_id {
            return Err(ServiceError::NotFound(format!(
                "sprint {sprint_id} not found in project {project_id}"
            )));
        }
        Ok(())
    }

    fn resolve_assignee(&self, workspace_id: &str, user_id: &str) -> Result<(), ServiceError> {
        match self.directory.role_of(workspace_id, user_id)? {
            Some(_) => Ok(()),
            None => Err(ServiceError::NotFound(format!(
                "assignee {user_id} is not a member of workspace {workspace_id}"
            ))),
        }
    }

    /// Emit activity entries for an accepted patch. One entry per
    /// change; a reassignment is an unassign followed by an assign —
    /// a uniform two-event vocabulary instead of a combinatorial one.
    fn log_task_changes(&self, actor: &str, ws: &str, old: &Task, new: &Task) {
        if old.status != new.status {
            self.log(self.entry(
                &new.id,
                ws,
                actor,
                ActivityKind::StatusChanged,
                Some(old.status.label().to_string()),
                Some(new.status.label().to_string()),
            ));
            if new.status == TaskStatus::Done {
                self.log(self.entry(&new.id, ws, actor, ActivityKind::Completed, None, None));
            }
        }

        if old.assignee_id != new.assignee_id {
            if let Some(ref prev) = old.assignee_id {
                let name = self.display(ws, prev);
                self.log(self.entry(
                    &new.id,
                    ws,
                    actor,
                    ActivityKind::Unassigned,
                    Some(name),
                    None,
                ));
            }
            if let Some(ref next) = new.assignee_id {
                let name = self.display(ws, next);
                self.log(self.entry(
                    &new.id,
                    ws,
                    actor,
                    ActivityKind::Assigned,
                    None,
                    Some(name),
                ));
            }
        }
    }
}
