use axum::Router;
use axum::http::{HeaderValue, Method};
use axum::routing::{get, patch, post, put};
use tower_http::cors::{Any, CorsLayer};

use super::AppState;
use super::handlers::{apps, clusters, health, logs, settings, workflows};

pub fn build_api_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin([
            HeaderValue::from_static("http://localhost:3000"),
            HeaderValue::from_static("http://127.0.0.1:3000"),
            HeaderValue::from_static("http://localhost:5173"),
        ])
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health::health_endpoint))
        .route("/api/scan", post(workflows::scan_endpoint))
        .route("/api/scans/{id}", get(workflows::get_scan_endpoint))
        .route("/api/analyze", post(workflows::analyze_endpoint))
        .route("/api/generate-patch", post(workflows::generate_patch_endpoint))
        .route(
            "/api/apps",
            get(apps::list_apps_endpoint).post(apps::create_app_endpoint),
        )
        .route(
            "/api/apps/{id}",
            get(apps::get_app_endpoint).delete(apps::delete_app_endpoint),
        )
        .route("/api/apps/{id}/stats", get(apps::app_stats_endpoint))
        .route("/api/apps/{id}/source-paths", put(apps::set_source_paths_endpoint))
        .route("/api/apps/{id}/clusters", get(clusters::list_clusters_endpoint))
        .route("/api/apps/{id}/scans", get(apps::scan_history_endpoint))
        .route(
            "/api/apps/{id}/logs",
            get(logs::recent_logs_endpoint).post(logs::ingest_logs_endpoint),
        )
        .route("/api/clusters/{id}", get(clusters::get_cluster_endpoint))
        .route(
            "/api/clusters/{id}/status",
            patch(clusters::set_status_endpoint),
        )
        .route("/api/clusters/{id}/analysis", get(clusters::current_analysis_endpoint))
        .route("/api/clusters/{id}/analyses", get(clusters::analysis_history_endpoint))
        .route("/api/clusters/{id}/history", get(clusters::status_history_endpoint))
        .route(
            "/api/settings/{key}",
            get(settings::get_setting_endpoint).put(settings::put_setting_endpoint),
        )
        .route("/api/logs/stream", get(logs::sse_logs_endpoint))
        .layer(cors)
        .with_state(state)
}
