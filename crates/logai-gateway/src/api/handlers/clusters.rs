use axum::Json;
use axum::extract::{Path, State};
use logai_types::{ClusterStatus, TriageError};
use serde::Deserialize;

use crate::api::{ApiResult, AppState};

#[derive(Deserialize)]
pub struct StatusBody {
    pub status: String,
}

pub async fn list_clusters_endpoint(
    Path(app_id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Json<serde_json::Value>> {
    let clusters = state.engine.list_clusters(&app_id).await?;
    Ok(Json(serde_json::json!({ "success": true, "clusters": clusters })))
}

pub async fn get_cluster_endpoint(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Json<serde_json::Value>> {
    let cluster = state.engine.get_cluster(&id).await?;
    Ok(Json(serde_json::json!({ "success": true, "cluster": cluster })))
}

pub async fn set_status_endpoint(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<StatusBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let status = ClusterStatus::from_status(&body.status).ok_or_else(|| {
        TriageError::Validation(format!("unknown cluster status '{}'", body.status))
    })?;
    let cluster = state.engine.set_cluster_status(&id, status).await?;
    Ok(Json(serde_json::json!({ "success": true, "cluster": cluster })))
}

pub async fn current_analysis_endpoint(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Json<serde_json::Value>> {
    let analysis = state.engine.current_analysis(&id).await?;
    Ok(Json(serde_json::json!({ "success": true, "analysis": analysis })))
}

pub async fn analysis_history_endpoint(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Json<serde_json::Value>> {
    let analyses = state.engine.analysis_history(&id).await?;
    Ok(Json(serde_json::json!({ "success": true, "analyses": analyses })))
}

pub async fn status_history_endpoint(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Json<serde_json::Value>> {
    let history = state.engine.status_history(&id).await?;
    Ok(Json(serde_json::json!({ "success": true, "history": history })))
}
