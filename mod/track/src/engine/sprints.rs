//! Sprint lifecycle: derived status, completion cascade, and
//! deletion with compensating rollback.

use tracing::{error, warn};

use opentrack_core::{ServiceError, merge_patch, new_id, now_rfc3339, today_utc};

use crate::model::{
    ActivityKind, CreateSprintRequest, Sprint, SprintCompletion, SprintCreated, SprintView,
    TaskStatus, validate_date_range,
};

use super::TrackEngine;

impl TrackEngine {
    // =======================================================================
    // Reads
    // =======================================================================

    pub fn get_sprint(&self, id: &str) -> Result<SprintView, ServiceError> {
        let sprint = self.store.get_sprint(id)?;
        let status = sprint.status(today_utc());
        Ok(SprintView { sprint, status })
    }

    pub fn list_sprints(&self, project_id: &str) -> Result<Vec<SprintView>, ServiceError> {
        let today = today_utc();
        Ok(self
            .store
            .sprints_by_project(project_id)?
            .into_iter()
            .map(|sprint| {
                let status = sprint.status(today);
                SprintView { sprint, status }
            })
            .collect())
    }

    // =======================================================================
    // Mutations
    // =======================================================================

    /// Create a sprint. Overlap with an existing non-completed sprint
    /// in the same project is advisory, not an error: the create
    /// succeeds and the overlapping sprint names ride along for the
    /// caller to display.
    pub fn create_sprint(
        &self,
        actor: &str,
        req: CreateSprintRequest,
    ) -> Result<SprintCreated, ServiceError> {
        self.gate(actor, &self.limits.create_sprint)?;
        let project = self.writable_project(&req.project_id)?;
        self.require_member(&project.workspace_id, actor)?;

        if req.name.trim().is_empty() {
            return Err(ServiceError::Validation("sprint name must not be empty".into()));
        }
        validate_date_range(req.start_date, req.end_date)?;

        let sprint = Sprint {
            id: new_id(),
            project_id: project.id.clone(),
            name: req.name,
            start_date: req.start_date,
            end_date: req.end_date,
            completed: false,
            completed_at: None,
            completed_by: None,
            created_by: actor.to_string(),
            created_at: now_rfc3339(),
        };

        let overlapping: Vec<String> = self
            .store
            .sprints_by_project(&project.id)?
            .into_iter()
            .filter(|existing| !existing.completed && existing.overlaps(&sprint))
            .map(|existing| existing.name)
            .collect();

        self.store.create_sprint(&sprint)?;
        self.limiter.record(actor, &self.limits.create_sprint.prefix);
        Ok(SprintCreated { sprint, overlapping })
    }

    /// Apply a JSON merge-patch to a sprint.
    ///
    /// The merged result is validated as a whole, so a single-field
    /// date patch is checked against the stored counterpart field —
    /// a partial update can never smuggle in an inverted range.
    /// Completion state only changes through [`Self::complete_sprint`].
    pub fn update_sprint(
        &self,
        actor: &str,
        id: &str,
        patch: serde_json::Value,
    ) -> Result<Sprint, ServiceError> {
        self.gate(actor, &self.limits.update_sprint)?;
        let current = self.store.get_sprint(id)?;
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
        base["completed"] = serde_json::json!(current.completed);
        pin_optional(&mut base, "completedAt", current.completed_at.as_deref());
        pin_optional(&mut base, "completedBy", current.completed_by.as_deref());

        let updated: Sprint = serde_json::from_value(base)
            .map_err(|e| ServiceError::Validation(format!("invalid sprint patch: {e}")))?;
        if updated.name.trim().is_empty() {
            return Err(ServiceError::Validation("sprint name must not be empty".into()));
        }
        validate_date_range(updated.start_date, updated.end_date)?;

        self.store.update_sprint(&updated)?;
        self.limiter.record(actor, &self.limits.update_sprint.prefix);
        Ok(updated)
    }

    /// Mark a sprint complete and cascade completion to its tasks.
    ///
    /// The sprint's own flag commits first and is authoritative; the
    /// task cascade is a secondary, best-effort bulk step. A cascade
    /// failure surfaces as a soft warning on the result, never as a
    /// failed request.
    pub fn complete_sprint(
        &self,
        actor: &str,
        id: &str,
    ) -> Result<SprintCompletion, ServiceError> {
        self.gate(actor, &self.limits.complete_sprint)?;
        let mut sprint = self.store.get_sprint(id)?;
        let project = self.writable_project(&sprint.project_id)?;
        self.require_member(&project.workspace_id, actor)?;

        if sprint.completed {
            return Err(ServiceError::Validation(format!(
                "sprint {id} is already completed"
            )));
        }

        // One timestamp for the sprint and the whole task batch.
        let now = now_rfc3339();
        sprint.completed = true;
        sprint.completed_at = Some(now.clone());
        sprint.completed_by = Some(actor.to_string());
        self.store.update_sprint(&sprint)?;
        self.limiter.record(actor, &self.limits.complete_sprint.prefix);

        let mut cascaded_task_ids = Vec::new();
        let mut failures = Vec::new();
        match self.store.tasks_in_sprint(id) {
            Ok(tasks) => {
                for mut task in tasks {
                    if task.status == TaskStatus::Done {
                        // Already done: its original completer stays.
                        continue;
                    }
                    task.status = TaskStatus::Done;
                    task.completed_at = Some(now.clone());
                    task.completed_by = Some(actor.to_string());
                    task.updated_at = now.clone();
                    match self.store.update_task(&task) {
                        Ok(()) => {
                            cascaded_task_ids.push(task.id.clone());
                            self.log(self.entry(
                                &task.id,
                                &project.workspace_id,
                                actor,
                                ActivityKind::Completed,
                                None,
                                None,
                            ));
                        }
                        Err(e) => failures.push(format!("task {}: {e}", task.id)),
                    }
                }
            }
            Err(e) => failures.push(format!("listing sprint tasks: {e}")),
        }

        let cascade_warning = if failures.is_empty() {
            None
        } else {
            let msg = format!(
                "sprint {id} is completed but the task cascade partially failed: {}",
                failures.join("; ")
            );
            warn!("{msg}");
            Some(msg)
        };

        Ok(SprintCompletion {
            sprint,
            cascaded_task_ids,
            cascade_warning,
        })
    }

    /// Delete a sprint: detach its tasks, then delete the record.
    ///
    /// The two steps run in that order and never in parallel. If the
    /// record delete fails after detachment, the detached tasks are
    /// reattached so the system ends in its original state; only a
    /// failed reattach escalates to [`ServiceError::RollbackFailed`].
    pub fn delete_sprint(&self, actor: &str, id: &str) -> Result<(), ServiceError> {
        self.gate(actor, &self.limits.delete_sprint)?;
        let sprint = self.store.get_sprint(id)?;
        let project = self.writable_project(&sprint.project_id)?;
        self.require_member(&project.workspace_id, actor)?;

        let tasks = self.store.tasks_in_sprint(id)?;
        let mut detached: Vec<String> = Vec::with_capacity(tasks.len());
        for task in &tasks {
            if let Err(e) = self.store.set_task_sprint(&task.id, None) {
                self.reattach(&detached, id)?;
                return Err(e);
            }
            detached.push(task.id.clone());
        }

        if let Err(e) = self.store.delete_sprint(id) {
            self.reattach(&detached, id)?;
            return Err(e);
        }

        self.limiter.record(actor, &self.limits.delete_sprint.prefix);
        Ok(())
    }

    /// Compensating write: return detached tasks to their sprint.
    /// Failure here is the one state the design cannot self-heal.
    fn reattach(&self, task_ids: &[String], sprint_id: &str) -> Result<(), ServiceError> {
        for task_id in task_ids {
            if let Err(e) = self.store.set_task_sprint(task_id, Some(sprint_id)) {
                let msg = format!(
                    "sprint {sprint_id} delete failed and task {task_id} could not be \
                     reattached: {e}"
                );
                error!("{msg}");
                return Err(ServiceError::RollbackFailed(msg));
            }
        }
        Ok(())
    }
}

fn pin_optional(base: &mut serde_json::Value, key: &str, value: Option<&str>) {
    match value {
        Some(v) => base[key] = serde_json::json!(v),
        None => {
            if let Some(obj) = base.as_object_mut() {
                obj.remove(key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use opentrack_core::ServiceError;
    use opentrack_sql::{Row, SQLError, SQLStore, SqliteStore, Value};

    use crate::engine::TrackEngine;
    use crate::engine::testutil::{engine, engine_with, project};
    use crate::model::{
        CreateSprintRequest, CreateTaskRequest, SprintStatus, TaskStatus,
    };

    // A store that fails targeted statements, for exercising the
    // cascade and rollback paths.
    struct FlakyStore {
        inner: SqliteStore,
        fail_contains: Mutex<Option<String>>,
        task_update_budget: Mutex<Option<usize>>,
    }

    impl FlakyStore {
        fn new() -> Self {
            Self {
                inner: SqliteStore::open_in_memory().unwrap(),
                fail_contains: Mutex::new(None),
                task_update_budget: Mutex::new(None),
            }
        }

        fn fail_statements_containing(&self, pattern: &str) {
            *self.fail_contains.lock().unwrap() = Some(pattern.to_string());
        }

        /// Allow this many further `UPDATE tasks` statements, then
        /// fail the rest.
        fn limit_task_updates(&self, allowed: usize) {
            *self.task_update_budget.lock().unwrap() = Some(allowed);
        }
    }

    impl SQLStore for FlakyStore {
        fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, SQLError> {
            self.inner.query(sql, params)
        }

        fn exec(&self, sql: &str, params: &[Value]) -> Result<u64, SQLError> {
            if let Some(ref pattern) = *self.fail_contains.lock().unwrap() {
                if sql.contains(pattern.as_str()) {
                    return Err(SQLError::Execution("injected failure".into()));
                }
            }
            if sql.contains("UPDATE tasks") {
                let mut budget = self.task_update_budget.lock().unwrap();
                if let Some(n) = budget.as_mut() {
                    if *n == 0 {
                        return Err(SQLError::Execution("injected failure".into()));
                    }
                    *n -= 1;
                }
            }
            self.inner.exec(sql, params)
        }

        fn exec_batch(&self, sql: &str) -> Result<(), SQLError> {
            self.inner.exec_batch(sql)
        }
    }

    fn sprint_req(project_id: &str, name: &str, start: &str, end: &str) -> CreateSprintRequest {
        CreateSprintRequest {
            project_id: project_id.into(),
            name: name.into(),
            start_date: start.parse().unwrap(),
            end_date: end.parse().unwrap(),
        }
    }

    fn task_in_sprint(
        eng: &TrackEngine,
        project_id: &str,
        sprint_id: &str,
        title: &str,
        status: TaskStatus,
    ) -> crate::model::Task {
        let task = eng
            .create_task(
                "u1",
                CreateTaskRequest {
                    project_id: project_id.into(),
                    title: title.into(),
                    description: None,
                    status: Some(status),
                    priority: None,
                    sprint_id: Some(sprint_id.into()),
                    assignee_id: None,
                },
            )
            .unwrap();
        task
    }

    #[test]
    fn create_rejects_bad_date_ranges() {
        let eng = engine();
        let p = project(&eng);

        let equal = eng.create_sprint("u1", sprint_req(&p.id, "S", "2024-05-10", "2024-05-10"));
        assert!(matches!(equal, Err(ServiceError::Validation(_))));

        let inverted = eng.create_sprint("u1", sprint_req(&p.id, "S", "2024-05-10", "2024-05-09"));
        assert!(matches!(inverted, Err(ServiceError::Validation(_))));

        let ok = eng
            .create_sprint("u1", sprint_req(&p.id, "S", "2024-05-10", "2024-05-11"))
            .unwrap();
        assert!(ok.overlapping.is_empty());
    }

    #[test]
    fn overlap_advisory_is_non_blocking() {
        let eng = engine();
        let p = project(&eng);
        eng.create_sprint("u1", sprint_req(&p.id, "Sprint 1", "2024-05-01", "2024-05-14"))
            .unwrap();

        let created = eng
            .create_sprint("u1", sprint_req(&p.id, "Sprint 2", "2024-05-10", "2024-05-20"))
            .unwrap();
        assert_eq!(created.overlapping, vec!["Sprint 1".to_string()]);

        // Disjoint ranges carry no advisory.
        let clear = eng
            .create_sprint("u1", sprint_req(&p.id, "Sprint 3", "2024-06-01", "2024-06-14"))
            .unwrap();
        assert!(clear.overlapping.is_empty());
    }

    #[test]
    fn completed_sprints_do_not_count_as_overlapping() {
        let eng = engine();
        let p = project(&eng);
        let first = eng
            .create_sprint("u1", sprint_req(&p.id, "Sprint 1", "2024-05-01", "2024-05-14"))
            .unwrap();
        eng.complete_sprint("u1", &first.sprint.id).unwrap();

        let second = eng
            .create_sprint("u1", sprint_req(&p.id, "Sprint 2", "2024-05-10", "2024-05-20"))
            .unwrap();
        assert!(second.overlapping.is_empty());
    }

    #[test]
    fn single_field_date_patch_checked_against_stored_value() {
        let eng = engine();
        let p = project(&eng);
        let s = eng
            .create_sprint("u1", sprint_req(&p.id, "S", "2024-05-10", "2024-05-20"))
            .unwrap()
            .sprint;

        // End pulled to the start date: invalid against stored start.
        let err = eng
            .update_sprint("u1", &s.id, serde_json::json!({"endDate": "2024-05-10"}))
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        // Start pushed past the stored end: invalid.
        let err = eng
            .update_sprint("u1", &s.id, serde_json::json!({"startDate": "2024-05-25"}))
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        // Both supplied: validated against each other, not the stored row.
        let moved = eng
            .update_sprint(
                "u1",
                &s.id,
                serde_json::json!({"startDate": "2024-06-01", "endDate": "2024-06-14"}),
            )
            .unwrap();
        assert_eq!(moved.start_date.to_string(), "2024-06-01");
        assert_eq!(moved.end_date.to_string(), "2024-06-14");
    }

    #[test]
    fn patch_cannot_flip_completion_state() {
        let eng = engine();
        let p = project(&eng);
        let s = eng
            .create_sprint("u1", sprint_req(&p.id, "S", "2024-05-10", "2024-05-20"))
            .unwrap()
            .sprint;

        let updated = eng
            .update_sprint(
                "u1",
                &s.id,
                serde_json::json!({"completed": true, "completedBy": "mallory"}),
            )
            .unwrap();
        assert!(!updated.completed);
        assert!(updated.completed_at.is_none());
        assert!(updated.completed_by.is_none());
    }

    #[test]
    fn completion_cascade_end_to_end() {
        let eng = engine();
        let p = project(&eng);
        let s = eng
            .create_sprint("u1", sprint_req(&p.id, "S", "2024-05-01", "2024-05-14"))
            .unwrap()
            .sprint;

        let a = task_in_sprint(&eng, &p.id, &s.id, "A", TaskStatus::ToDo);
        let b = task_in_sprint(&eng, &p.id, &s.id, "B", TaskStatus::InProgress);
        let c = task_in_sprint(&eng, &p.id, &s.id, "C", TaskStatus::Done);
        let c_completed_at = c.completed_at.clone();

        let result = eng.complete_sprint("u2", &s.id).unwrap();
        assert!(result.sprint.completed);
        assert_eq!(result.sprint.completed_by.as_deref(), Some("u2"));
        assert!(result.sprint.completed_at.is_some());
        assert!(result.cascade_warning.is_none());

        let mut cascaded = result.cascaded_task_ids.clone();
        cascaded.sort();
        let mut expected = vec![a.id.clone(), b.id.clone()];
        expected.sort();
        assert_eq!(cascaded, expected);

        let a2 = eng.get_task(&a.id).unwrap();
        let b2 = eng.get_task(&b.id).unwrap();
        let c2 = eng.get_task(&c.id).unwrap();
        assert_eq!(a2.status, TaskStatus::Done);
        assert_eq!(b2.status, TaskStatus::Done);
        assert_eq!(a2.completed_by.as_deref(), Some("u2"));
        assert_eq!(b2.completed_by.as_deref(), Some("u2"));
        // One timestamp for the whole batch.
        assert_eq!(a2.completed_at, b2.completed_at);
        // The already-done task keeps its original completer and time.
        assert_eq!(c2.completed_by.as_deref(), Some("u1"));
        assert_eq!(c2.completed_at, c_completed_at);

        assert!(a2.completion_consistent());
        assert!(b2.completion_consistent());
        assert!(c2.completion_consistent());

        // Derived status reflects the flag from any vantage day.
        let view = eng.get_sprint(&s.id).unwrap();
        assert_eq!(view.status, SprintStatus::Completed);
    }

    #[test]
    fn completing_twice_is_a_validation_error() {
        let eng = engine();
        let p = project(&eng);
        let s = eng
            .create_sprint("u1", sprint_req(&p.id, "S", "2024-05-01", "2024-05-14"))
            .unwrap()
            .sprint;
        eng.complete_sprint("u1", &s.id).unwrap();

        let err = eng.complete_sprint("u1", &s.id).unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[test]
    fn cascade_failure_does_not_unwind_the_sprint() {
        let flaky = Arc::new(FlakyStore::new());
        let db: Arc<dyn SQLStore> = flaky.clone();
        let eng = engine_with(db, Arc::new(opentrack_core::AllowAll));
        let p = project(&eng);
        let s = eng
            .create_sprint("u1", sprint_req(&p.id, "S", "2024-05-01", "2024-05-14"))
            .unwrap()
            .sprint;
        task_in_sprint(&eng, &p.id, &s.id, "A", TaskStatus::ToDo);
        task_in_sprint(&eng, &p.id, &s.id, "B", TaskStatus::ToDo);

        // First task update succeeds, the second fails.
        flaky.limit_task_updates(1);

        let result = eng.complete_sprint("u2", &s.id).unwrap();
        assert!(result.sprint.completed);
        assert_eq!(result.cascaded_task_ids.len(), 1);
        assert!(result.cascade_warning.is_some());

        // The sprint is authoritatively complete despite the warning.
        flaky.limit_task_updates(usize::MAX);
        let view = eng.get_sprint(&s.id).unwrap();
        assert_eq!(view.status, SprintStatus::Completed);
        assert_eq!(view.sprint.completed_by.as_deref(), Some("u2"));
    }

    #[test]
    fn delete_detaches_tasks_but_keeps_them() {
        let eng = engine();
        let p = project(&eng);
        let s = eng
            .create_sprint("u1", sprint_req(&p.id, "S", "2024-05-01", "2024-05-14"))
            .unwrap()
            .sprint;
        let a = task_in_sprint(&eng, &p.id, &s.id, "A", TaskStatus::ToDo);

        eng.delete_sprint("u1", &s.id).unwrap();

        assert!(matches!(eng.get_sprint(&s.id), Err(ServiceError::NotFound(_))));
        let survivor = eng.get_task(&a.id).unwrap();
        assert!(survivor.sprint_id.is_none());
    }

    #[test]
    fn failed_record_delete_rolls_back_detachment() {
        let flaky = Arc::new(FlakyStore::new());
        let db: Arc<dyn SQLStore> = flaky.clone();
        let eng = engine_with(db, Arc::new(opentrack_core::AllowAll));
        let p = project(&eng);
        let s = eng
            .create_sprint("u1", sprint_req(&p.id, "S", "2024-05-01", "2024-05-14"))
            .unwrap()
            .sprint;
        let a = task_in_sprint(&eng, &p.id, &s.id, "A", TaskStatus::ToDo);
        let b = task_in_sprint(&eng, &p.id, &s.id, "B", TaskStatus::InProgress);

        flaky.fail_statements_containing("DELETE FROM sprints");

        let err = eng.delete_sprint("u1", &s.id).unwrap_err();
        assert!(matches!(err, ServiceError::Storage(_)));

        // Original state restored: sprint exists, tasks reattached.
        assert!(eng.get_sprint(&s.id).is_ok());
        assert_eq!(eng.get_task(&a.id).unwrap().sprint_id.as_deref(), Some(s.id.as_str()));
        assert_eq!(eng.get_task(&b.id).unwrap().sprint_id.as_deref(), Some(s.id.as_str()));
    }

    #[test]
    fn failed_rollback_is_loud() {
        let flaky = Arc::new(FlakyStore::new());
        let db: Arc<dyn SQLStore> = flaky.clone();
        let eng = engine_with(db, Arc::new(opentrack_core::AllowAll));
        let p = project(&eng);
        let s = eng
            .create_sprint("u1", sprint_req(&p.id, "S", "2024-05-01", "2024-05-14"))
            .unwrap()
            .sprint;
        task_in_sprint(&eng, &p.id, &s.id, "A", TaskStatus::ToDo);
        task_in_sprint(&eng, &p.id, &s.id, "B", TaskStatus::ToDo);

        // Both detach updates succeed, the record delete fails, and
        // the compensating reattach updates fail too.
        flaky.fail_statements_containing("DELETE FROM sprints");
        flaky.limit_task_updates(2);

        let err = eng.delete_sprint("u1", &s.id).unwrap_err();
        assert!(matches!(err, ServiceError::RollbackFailed(_)));
    }

    #[test]
    fn sprint_completion_metadata_invariant() {
        let eng = engine();
        let p = project(&eng);
        let s = eng
            .create_sprint("u1", sprint_req(&p.id, "S", "2024-05-01", "2024-05-14"))
            .unwrap()
            .sprint;
        assert!(!s.completed && s.completed_at.is_none() && s.completed_by.is_none());

        let done = eng.complete_sprint("u1", &s.id).unwrap().sprint;
        assert!(done.completed && done.completed_at.is_some() && done.completed_by.is_some());
    }
}
