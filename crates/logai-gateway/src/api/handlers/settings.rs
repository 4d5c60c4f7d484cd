use axum::Json;
use axum::extract::{Path, State};
use serde::Deserialize;

use crate::api::{ApiResult, AppState};
use crate::provider::API_KEY_SETTING;

#[derive(Deserialize)]
pub struct SettingBody {
    pub value: String,
}

/// Secrets are never echoed back in full.
fn mask(key: &str, value: String) -> String {
    if key != API_KEY_SETTING {
        return value;
    }
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

pub async fn get_setting_endpoint(
    Path(key): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Json<serde_json::Value>> {
    let value = state
        .engine
        .get_setting(&key)
        .await?
        .map(|v| mask(&key, v));
    Ok(Json(serde_json::json!({ "success": true, "key": key, "value": value })))
}

pub async fn put_setting_endpoint(
    Path(key): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<SettingBody>,
) -> ApiResult<Json<serde_json::Value>> {
    state.engine.set_setting(&key, &body.value).await?;
    Ok(Json(serde_json::json!({ "success": true, "key": key })))
}
