use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::error;

use super::super::AppState;

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 500;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    limit: Option<usize>,
}

pub async fn list_callbacks_endpoint(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Response {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    match state.store.recent(limit).await {
        Ok(callbacks) => Json(serde_json::json!({ "status": "ok", "callbacks": callbacks }))
            .into_response(),
        Err(e) => {
            error!("Failed to list Akool callbacks: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "status": "error", "error": "database error" })),
            )
                .into_response()
        }
    }
}

pub async fn task_callback_endpoint(
    Path(task_id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    match state.store.latest_for_task(&task_id).await {
        Ok(Some(callback)) => Json(serde_json::json!({
            "status": "ok",
            "task_id": callback.task_id,
            "state": callback.status.label(),
            "callback": callback,
        }))
        .into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "status": "error", "error": "no callback for this task" })),
        )
            .into_response(),
        Err(e) => {
            error!("Failed to load Akool callback for task {}: {:#}", task_id, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "status": "error", "error": "database error" })),
            )
                .into_response()
        }
    }
}
