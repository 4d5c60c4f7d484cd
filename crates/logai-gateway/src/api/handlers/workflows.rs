//! Scan, analyze and generate-patch: the three workflow entry points.

use axum::Json;
use axum::extract::{Path, State};
use logai_core::ScanRequest;
use logai_types::TriageError;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::api::{ApiResult, AppState};

fn default_hours() -> i64 {
    24
}

#[derive(Deserialize)]
pub struct ScanBody {
    pub app_id: String,
    #[serde(default = "default_hours")]
    pub hours: i64,
    #[serde(default)]
    pub analyze: bool,
}

pub async fn scan_endpoint(
    State(state): State<AppState>,
    Json(body): Json<ScanBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let request = ScanRequest {
        app_id: body.app_id,
        lookback_hours: body.hours,
        analyze: body.analyze,
    };

    // The scan runs on its own task; if the client goes away the guard
    // cancels it so the run is finalized instead of left RUNNING.
    let cancel = CancellationToken::new();
    let _abandon = cancel.clone().drop_guard();
    let engine = state.engine.clone();
    let report = tokio::spawn(async move { engine.scan(&request, cancel).await })
        .await
        .map_err(|e| TriageError::Cancelled(format!("scan task aborted: {}", e)))??;

    let scan = &report.scan;
    Ok(Json(serde_json::json!({
        "success": true,
        "scan_id": scan.id,
        "logs_scanned": scan.logs_scanned,
        "errors_found": scan.errors_found,
        "clusters_found": report.clusters_found,
        "clusters_created": scan.clusters_created,
        "clusters_analyzed": scan.clusters_analyzed,
        "cluster_ids": report.cluster_ids,
        "truncated": report.truncated,
    })))
}

#[derive(Deserialize)]
pub struct AnalyzeBody {
    pub cluster_id: String,
}

pub async fn analyze_endpoint(
    State(state): State<AppState>,
    Json(body): Json<AnalyzeBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let analysis = state.engine.analyze(&body.cluster_id).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "id": analysis.id,
        "cluster_id": analysis.cluster_id,
        "explanation": analysis.explanation,
        "root_cause": analysis.root_cause,
        "recommendation": analysis.recommendation,
        "confidence": analysis.confidence,
        "model_used": analysis.model_used,
        "tokens_used": analysis.tokens_used,
        "created_at": analysis.created_at,
    })))
}

#[derive(Deserialize)]
pub struct PatchBody {
    pub cluster_id: String,
    #[serde(default)]
    pub source_code: Option<String>,
}

pub async fn generate_patch_endpoint(
    State(state): State<AppState>,
    Json(body): Json<PatchBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let patch = state
        .engine
        .generate_patch(&body.cluster_id, body.source_code.as_deref())
        .await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "patch": patch.patch,
        "patch_file_name": patch.patch_file_name,
        "analysis_id": patch.analysis_id,
    })))
}

pub async fn get_scan_endpoint(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Json<serde_json::Value>> {
    let scan = state.engine.get_scan(&id).await?;
    Ok(Json(serde_json::json!({ "success": true, "scan": scan })))
}
