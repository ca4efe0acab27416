use axum::{
    Router,
    body::Body,
    http::{HeaderValue, Request, header},
    middleware,
    middleware::Next,
    routing::{get, post},
};

use super::AppState;
use super::handlers::{callbacks, health, webhooks};

pub fn build_router(state: AppState) -> Router {
    // Akool authenticates with the envelope signature, not with headers.
    Router::new()
        .route("/health", get(health::health_endpoint))
        .route("/akool/webhook", post(webhooks::akool_webhook_endpoint))
        .route("/akool/callbacks", get(callbacks::list_callbacks_endpoint))
        .route(
            "/akool/callbacks/{task_id}",
            get(callbacks::task_callback_endpoint),
        )
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

async fn security_headers(req: Request<Body>, next: Next) -> axum::response::Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}
