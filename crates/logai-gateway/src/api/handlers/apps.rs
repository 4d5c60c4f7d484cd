use axum::Json;
use axum::extract::{Path, Query, State};
use logai_core::engine::DEFAULT_SCAN_HISTORY;
use serde::Deserialize;

use crate::api::{ApiResult, AppState};

const MAX_SCAN_HISTORY: usize = 100;

#[derive(Deserialize)]
pub struct CreateAppBody {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub source_paths: Vec<String>,
}

#[derive(Deserialize)]
pub struct SourcePathsBody {
    pub source_paths: Vec<String>,
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

pub async fn list_apps_endpoint(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let apps = state.engine.list_applications().await?;
    Ok(Json(serde_json::json!({ "success": true, "apps": apps })))
}

pub async fn create_app_endpoint(
    State(state): State<AppState>,
    Json(body): Json<CreateAppBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let app = state
        .engine
        .create_application(&body.name, body.description.as_deref(), &body.source_paths)
        .await?;
    Ok(Json(serde_json::json!({ "success": true, "app": app })))
}

pub async fn get_app_endpoint(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Json<serde_json::Value>> {
    let app = state.engine.get_application(&id).await?;
    Ok(Json(serde_json::json!({ "success": true, "app": app })))
}

pub async fn set_source_paths_endpoint(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<SourcePathsBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let app = state.engine.set_source_paths(&id, &body.source_paths).await?;
    Ok(Json(serde_json::json!({ "success": true, "app": app })))
}

pub async fn delete_app_endpoint(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Json<serde_json::Value>> {
    state.engine.delete_application(&id).await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

pub async fn app_stats_endpoint(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Json<serde_json::Value>> {
    let stats = state.engine.app_stats(&id).await?;
    Ok(Json(serde_json::json!({ "success": true, "stats": stats })))
}

pub async fn scan_history_endpoint(
    Path(id): Path<String>,
    Query(query): Query<HistoryQuery>,
    State(state): State<AppState>,
) -> ApiResult<Json<serde_json::Value>> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_SCAN_HISTORY)
        .clamp(1, MAX_SCAN_HISTORY);
    let scans = state.engine.scan_history(&id, limit).await?;
    Ok(Json(serde_json::json!({ "success": true, "scans": scans })))
}
