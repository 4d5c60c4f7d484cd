use std::convert::Infallible;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, Sse};
use logai_types::LogEvent;
use serde::Deserialize;
use tokio_stream::{Stream, StreamExt, wrappers::BroadcastStream};

use crate::api::{ApiResult, AppState};

const DEFAULT_RECENT_LOGS: usize = 100;

#[derive(Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

/// A bare array of events or `{"events": [...]}`.
#[derive(Deserialize)]
#[serde(untagged)]
pub enum IngestBody {
    Batch { events: Vec<LogEvent> },
    Events(Vec<LogEvent>),
}

impl IngestBody {
    fn into_events(self) -> Vec<LogEvent> {
        match self {
            IngestBody::Batch { events } | IngestBody::Events(events) => events,
        }
    }
}

pub async fn recent_logs_endpoint(
    Path(app_id): Path<String>,
    Query(query): Query<LimitQuery>,
    State(state): State<AppState>,
) -> ApiResult<Json<serde_json::Value>> {
    let limit = query.limit.unwrap_or(DEFAULT_RECENT_LOGS);
    let logs = state.engine.recent_logs(&app_id, limit).await?;
    Ok(Json(serde_json::json!({ "success": true, "logs": logs })))
}

pub async fn ingest_logs_endpoint(
    Path(app_id): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<IngestBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let inserted = state.engine.ingest(&app_id, &body.into_events()).await?;
    Ok(Json(serde_json::json!({ "success": true, "inserted": inserted })))
}

pub async fn sse_logs_endpoint(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.log_tx.subscribe();
    let stream = BroadcastStream::new(receiver).map(|msg| match msg {
        Ok(line) => Ok(Event::default().data(line)),
        Err(_) => Ok(Event::default().data("log stream lagged")),
    });
    Sse::new(stream)
}
