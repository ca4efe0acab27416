use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::{error, info, warn};

use super::super::AppState;
use crate::core::akool::{CallbackPayload, WebhookEnvelope, WebhookError};

fn status_for(err: &WebhookError) -> StatusCode {
    match err {
        WebhookError::Authentication => StatusCode::UNAUTHORIZED,
        WebhookError::Decryption(_)
        | WebhookError::MalformedPayload(_)
        | WebhookError::MalformedEnvelope(_) => StatusCode::BAD_REQUEST,
        WebhookError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(serde_json::json!({ "status": "error", "error": message })),
    )
        .into_response()
}

fn rejection(err: &WebhookError) -> Response {
    let status = status_for(err);
    if status.is_server_error() {
        error!("Akool callback could not be processed: {}", err);
        // Internal detail stays in the log.
        return error_response(status, "webhook is not configured correctly");
    }
    warn!("Rejected Akool callback: {}", err);
    error_response(status, &err.to_string())
}

// === Akool Callback Endpoint ===

pub async fn akool_webhook_endpoint(State(state): State<AppState>, body: Bytes) -> Response {
    let Some(verifier) = state.verifier.clone() else {
        error!("Akool callback received but credentials are not configured");
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "webhook is not configured",
        );
    };

    let envelope = match WebhookEnvelope::from_json(&body) {
        Ok(envelope) => envelope,
        Err(e) => return rejection(&e),
    };

    let opened = verifier
        .open(&envelope)
        .and_then(|value| CallbackPayload::from_value(&value).map(|payload| (payload, value)));
    let (payload, raw) = match opened {
        Ok(opened) => opened,
        Err(e) => return rejection(&e),
    };

    let stage = if payload.status.is_terminal() { "final" } else { "progress" };
    info!(
        "Verified Akool {} callback for task {} ({}, {})",
        stage,
        payload.id,
        payload.kind,
        payload.status.label()
    );

    if let Err(e) = state.store.record(&envelope, &payload, &raw).await {
        error!("Failed to store Akool callback for task {}: {:#}", payload.id, e);
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "callback could not be stored",
        );
    }

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "task_id": payload.id,
            "state": payload.status.label(),
        })),
    )
        .into_response()
}
