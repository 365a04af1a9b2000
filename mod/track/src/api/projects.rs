use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use opentrack_core::ServiceError;

use crate::engine::TrackEngine;
use crate::model::{CreateProjectRequest, Project};

use super::actor;

type EngineState = Arc<TrackEngine>;

pub fn router(engine: Arc<TrackEngine>) -> Router {
    Router::new()
        .route("/projects", get(list_projects).post(create_project))
        .route("/projects/{id}", get(get_project).patch(update_project))
        .with_state(engine)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectListQuery {
    #[serde(default)]
    workspace_id: Option<String>,
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(default)]
    offset: usize,
}

fn default_limit() -> usize {
    50
}

async fn create_project(
    State(engine): State<EngineState>,
    headers: HeaderMap,
    Json(req): Json<CreateProjectRequest>,
) -> Result<Json<Project>, ServiceError> {
    let actor = actor(&headers)?;
    Ok(Json(engine.create_project(&actor, req)?))
}

async fn list_projects(
    State(engine): State<EngineState>,
    Query(query): Query<ProjectListQuery>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    let result = engine.list_projects(query.workspace_id.as_deref(), query.limit, query.offset)?;
    Ok(Json(serde_json::json!({
        "items": result.items,
        "total": result.total,
    })))
}

async fn get_project(
    State(engine): State<EngineState>,
    Path(id): Path<String>,
) -> Result<Json<Project>, ServiceError> {
    Ok(Json(engine.get_project(&id)?))
}

async fn update_project(
    State(engine): State<EngineState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(patch): Json<serde_json::Value>,
) -> Result<Json<Project>, ServiceError> {
    let actor = actor(&headers)?;
    Ok(Json(engine.update_project(&actor, &id, patch)?))
}
