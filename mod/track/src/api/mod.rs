mod projects;
mod sprints;
mod tasks;

use std::sync::Arc;

use axum::Router;
use axum::http::HeaderMap;

use opentrack_core::ServiceError;

use crate::engine::TrackEngine;

/// Build the complete track module router.
///
/// Routes:
/// - `POST   /projects`              — create project
/// - `GET    /projects`              — list projects
/// - `GET    /projects/{id}`         — get project
/// - `PATCH  /projects/{id}`         — patch project (incl. archive)
/// - `POST   /tasks`                 — create task
/// - `GET    /tasks`                 — list tasks (filters)
/// - `GET    /tasks/{id}`            — get task
/// - `PATCH  /tasks/{id}`            — patch task
/// - `DELETE /tasks/{id}`            — delete task
/// - `GET    /tasks/{id}/@activity`  — activity trail
/// - `POST   /sprints`               — create sprint (overlap advisory)
/// - `GET    /sprints`               — list sprints of a project
/// - `GET    /sprints/{id}`          — get sprint with derived status
/// - `PATCH  /sprints/{id}`          — patch sprint
/// - `DELETE /sprints/{id}`          — delete sprint (detach + rollback)
/// - `POST   /sprints/{id}/@complete`— complete sprint (cascade)
pub fn router(engine: Arc<TrackEngine>) -> Router {
    Router::new()
        .merge(projects::router(Arc::clone(&engine)))
        .merge(tasks::router(Arc::clone(&engine)))
        .merge(sprints::router(engine))
}

/// Acting user identity, injected by the authentication layer in
/// front of this module. Authentication itself is out of scope here;
/// the header is the contract.
pub(crate) fn actor(headers: &HeaderMap) -> Result<String, ServiceError> {
    headers
        .get("x-actor")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .ok_or_else(|| ServiceError::PermissionDenied("missing x-actor header".into()))
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderMap;

    use super::actor;

    #[test]
    fn actor_header_required() {
        let mut headers = HeaderMap::new();
        assert!(actor(&headers).is_err());

        headers.insert("x-actor", "u1".parse().unwrap());
        assert_eq!(actor(&headers).unwrap(), "u1");
    }
}
