use axum::{http::StatusCode, routing::get, Router};
use tower_http::trace::TraceLayer;

/// Liveness only: answers while the process is up, regardless of consumer state
pub async fn health() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

pub fn router() -> Router {
    Router::new()
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
}
