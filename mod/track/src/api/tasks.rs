use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::routing::get;
use axum::{Json, Router};

use opentrack_core::ServiceError;

use crate::engine::TrackEngine;
use crate::model::{ActivityEntry, CreateTaskRequest, Task, TaskListQuery};

use super::actor;

type EngineState = Arc<TrackEngine>;

pub fn router(engine: Arc<TrackEngine>) -> Router {
    Router::new()
        .route("/tasks", get(list_tasks).post(create_task))
        .route(
            "/tasks/{id}",
            get(get_task).patch(update_task).delete(delete_task),
        )
        .route("/tasks/{id}/@activity", get(task_activity))
        .with_state(engine)
}

async fn create_task(
    State(engine): State<EngineState>,
    headers: HeaderMap,
    Json(req): Json<CreateTaskRequest>,
) -> Result<Json<Task>, ServiceError> {
    let actor = actor(&headers)?;
    Ok(Json(engine.create_task(&actor, req)?))
}

async fn list_tasks(
    State(engine): State<EngineState>,
    Query(query): Query<TaskListQuery>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    let result = engine.list_tasks(&query)?;
    Ok(Json(serde_json::json!({
        "items": result.items,
        "total": result.total,
    })))
}

async fn get_task(
    State(engine): State<EngineState>,
    Path(id): Path<String>,
) -> Result<Json<Task>, ServiceError> {
    Ok(Json(engine.get_task(&id)?))
}

async fn update_task(
    State(engine): State<EngineState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(patch): Json<serde_json::Value>,
) -> Result<Json<Task>, ServiceError> {
    let actor = actor(&headers)?;
    Ok(Json(engine.update_task(&actor, &id, patch)?))
}

async fn delete_task(
    State(engine): State<EngineState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ServiceError> {
    let actor = actor(&headers)?;
    engine.delete_task(&actor, &id)?;
    Ok(Json(serde_json::json!({"deleted": id})))
}

async fn task_activity(
    State(engine): State<EngineState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<ActivityEntry>>, ServiceError> {
    Ok(Json(engine.activity_for_task(&id)?))
}
