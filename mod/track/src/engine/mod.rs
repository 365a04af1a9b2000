//! The lifecycle engine.
//!
//! `TrackEngine` owns the stores, the membership directory, and the
//! rate limiter, and is the only place lifecycle rules live. Every
//! mutating operation follows the same shape: rate-limit check first,
//! then authorization and validation against current persisted state,
//! then the write, then (and only then) quota consumption and
//! best-effort activity logging.

mod sprints;
mod tasks;

use std::sync::Arc;

use tracing::warn;

use opentrack_core::{Directory, ListResult, ServiceError, merge_patch, new_id, now_rfc3339};
use opentrack_sql::SQLStore;

use crate::activity::ActivityStore;
use crate::model::{ActivityEntry, ActivityKind, CreateProjectRequest, Project};
use crate::ratelimit::{RateLimiter, RateLimits, RatePolicy};
use crate::store::TrackStore;

pub struct TrackEngine {
    store: TrackStore,
    activity: ActivityStore,
    directory: Arc<dyn Directory>,
    limiter: RateLimiter,
    limits: RateLimits,
}

impl TrackEngine {
    pub fn new(
        db: Arc<dyn SQLStore>,
        directory: Arc<dyn Directory>,
        limits: RateLimits,
    ) -> Result<Self, ServiceError> {
        Ok(Self {
            store: TrackStore::new(Arc::clone(&db))?,
            activity: ActivityStore::new(db)?,
            directory,
            limiter: RateLimiter::new(),
            limits,
        })
    }

    // =======================================================================
    // Projects
    // =======================================================================

    pub fn create_project(
        &self,
        actor: &str,
        req: CreateProjectRequest,
    ) -> Result<Project, ServiceError> {
        self.gate(actor, &self.limits.create_project)?;
        self.require_member(&req.workspace_id, actor)?;

        if req.name.trim().is_empty() {
            return Err(ServiceError::Validation("project name must not be empty".into()));
        }

        let project = Project {
            id: new_id(),
            workspace_id: req.workspace_id,
            name: req.name,
            archived: false,
            created_at: now_rfc3339(),
        };
        self.store.create_project(&project)?;
        self.limiter.record(actor, &self.limits.create_project.prefix);
        Ok(project)
    }

    pub fn get_project(&self, id: &str) -> Result<Project, ServiceError> {
        self.store.get_project(id)
    }

    pub fn list_projects(
        &self,
        workspace_id: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<ListResult<Project>, ServiceError> {
        self.store.list_projects(workspace_id, limit, offset)
    }

    /// Patch a project (JSON merge-patch). This is how projects are
    /// archived and unarchived, so it is deliberately NOT blocked on
    /// the archived flag.
    pub fn update_project(
        &self,
        actor: &str,
        id: &str,
        patch: serde_json::Value,
    ) -> Result<Project, ServiceError> {
        self.gate(actor, &self.limits.update_project)?;
        let current = self.store.get_project(id)?;
        self.require_member(&current.workspace_id, actor)?;

        if !patch.is_object() {
            return Err(ServiceError::Validation("patch must be a JSON object".into()));
        }

        let mut base = serde_json::to_value(&current)
            .map_err(|e| ServiceError::Internal(e.to_string()))?;
        merge_patch(&mut base, &patch);
        base["id"] = serde_json::json!(current.id);
        base["workspaceId"] = serde_json::json!(current.workspace_id);
        base["createdAt"] = serde_json::json!(current.created_at);

        let updated: Project = serde_json::from_value(base)
            .map_err(|e| ServiceError::Validation(format!("invalid project patch: {e}")))?;
        if updated.name.trim().is_empty() {
            return Err(ServiceError::Validation("project name must not be empty".into()));
        }

        self.store.update_project(&updated)?;
        self.limiter.record(actor, &self.limits.update_project.prefix);
        Ok(updated)
    }

    // =======================================================================
    // Shared helpers
    // =======================================================================

    /// Rate-limit gate. Checks only — quota is consumed by `record`
    /// after the gated operation committed, so rejected requests never
    /// count against the actor.
    fn gate(&self, actor: &str, policy: &RatePolicy) -> Result<(), ServiceError> {
        let decision = self.limiter.check(actor, policy);
        if !decision.allowed {
            return Err(ServiceError::RateLimited {
                retry_after_secs: decision.reset_in_secs,
            });
        }
        Ok(())
    }

    /// Load a project and refuse writes when it is archived.
    fn writable_project(&self, project_id: &str) -> Result<Project, ServiceError> {
        let project = self.store.get_project(project_id)?;
        if project.archived {
            return Err(ServiceError::ReadOnly(format!(
                "project {} is archived",
                project.id
            )));
        }
        Ok(project)
    }

    /// The acting user must currently be a member of the workspace.
    fn require_member(&self, workspace_id: &str, user_id: &str) -> Result<(), ServiceError> {
        match self.directory.role_of(workspace_id, user_id)? {
            Some(_) => Ok(()),
            None => Err(ServiceError::PermissionDenied(format!(
                "user {user_id} is not a member of workspace {workspace_id}"
            ))),
        }
    }

    /// Resolve a user's display identity, falling back to the raw id.
    fn display(&self, workspace_id: &str, user_id: &str) -> String {
        self.directory
            .display_name(workspace_id, user_id)
            .unwrap_or_else(|| user_id.to_string())
    }

    /// Best-effort activity append. Logging failure must never fail
    /// the surrounding mutation.
    fn log(&self, entry: ActivityEntry) {
        if let Err(e) = self.activity.append(&entry) {
            warn!(task_id = %entry.task_id, kind = entry.kind.as_str(), "activity append failed: {e}");
        }
    }

    fn entry(
        &self,
        task_id: &str,
        workspace_id: &str,
        actor: &str,
        kind: ActivityKind,
        old_value: Option<String>,
        new_value: Option<String>,
    ) -> ActivityEntry {
        ActivityEntry {
            id: new_id(),
            task_id: task_id.to_string(),
            actor_id: actor.to_string(),
            actor_name: self.display(workspace_id, actor),
            kind,
            old_value,
            new_value,
            created_at: now_rfc3339(),
        }
    }
}
