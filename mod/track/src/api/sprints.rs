use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use opentrack_core::ServiceError;

use crate::engine::TrackEngine;
use crate::model::{
    CreateSprintRequest, Sprint, SprintCompletion, SprintCreated, SprintView,
};

use super::actor;

type EngineState = Arc<TrackEngine>;

pub fn router(engine: Arc<TrackEngine>) -> Router {
    Router::new()
        .route("/sprints", get(list_sprints).post(create_sprint))
        .route(
            "/sprints/{id}",
            get(get_sprint).patch(update_sprint).delete(delete_sprint),
        )
        .route("/sprints/{id}/@complete", post(complete_sprint))
        .with_state(engine)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SprintListQuery {
    project_id: String,
}

async fn create_sprint(
    State(engine): State<EngineState>,
    headers: HeaderMap,
    Json(req): Json<CreateSprintRequest>,
) -> Result<Json<SprintCreated>, ServiceError> {
    let actor = actor(&headers)?;
    Ok(Json(engine.create_sprint(&actor, req)?))
}

async fn list_sprints(
    State(engine): State<EngineState>,
    Query(query): Query<SprintListQuery>,
) -> Result<Json<Vec<SprintView>>, ServiceError> {
    Ok(Json(engine.list_sprints(&query.project_id)?))
}

async fn get_sprint(
    State(engine): State<EngineState>,
    Path(id): Path<String>,
) -> Result<Json<SprintView>, ServiceError> {
    Ok(Json(engine.get_sprint(&id)?))
}

async fn update_sprint(
    State(engine): State<EngineState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(patch): Json<serde_json::Value>,
) -> Result<Json<Sprint>, ServiceError> {
    let actor = actor(&headers)?;
    Ok(Json(engine.update_sprint(&actor, &id, patch)?))
}

async fn delete_sprint(
    State(engine): State<EngineState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ServiceError> {
    let actor = actor(&headers)?;
    engine.delete_sprint(&actor, &id)?;
    Ok(Json(serde_json::json!({"deleted": id})))
}

async fn complete_sprint(
    State(engine): State<EngineState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<SprintCompletion>, ServiceError> {
    let actor = actor(&headers)?;
    Ok(Json(engine.complete_sprint(&actor, &id)?))
}
