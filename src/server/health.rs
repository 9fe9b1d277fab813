//! Health endpoint for the listener process.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;

use crate::consumer::Health;

/// `GET /ping` answers `200 .` while the consumer is subscribed and `503`
/// with the current state otherwise.
pub fn health_router(health: Health) -> Router {
    Router::new()
        .route("/ping", get(ping_handler))
        .with_state(health)
}

async fn ping_handler(State(health): State<Health>) -> impl IntoResponse {
    if health.is_healthy() {
        (StatusCode::OK, ".".to_string())
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, health.state().to_string())
    }
}
