use axum::Json;
use axum::extract::State;

use crate::api::AppState;

pub async fn health_endpoint(State(state): State<AppState>) -> Json<serde_json::Value> {
    let config = state.engine.config();
    Json(serde_json::json!({
        "success": true,
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "model": config.llm.model,
        "use_watermark": config.scan.use_watermark,
    }))
}
