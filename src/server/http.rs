//! The dispatcher's HTTP surface.
//!
//! ## Routes
//!
//! - `POST /`: liveness of the router itself, `{"error":false,"message":"Hit the broker"}`.
//! - `POST /handle`: action envelope in, response envelope out.
//! - `POST /log-grpc`: action envelope with a `log` payload, written over gRPC.
//! - `GET /ping`: `200`, body `.`.

use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::dispatch::{DispatchError, Dispatched, Dispatcher};
use crate::envelope::{self, ActionEnvelope, DecodeError, DecodeOptions, ResponseEnvelope};

#[derive(Clone)]
struct AppState {
    dispatcher: Arc<Dispatcher>,
    decode: DecodeOptions,
}

/// Build an axum `Router` that feeds request bodies to `dispatcher`.
pub fn router(dispatcher: Arc<Dispatcher>, decode: DecodeOptions) -> Router {
    Router::new()
        .route("/", post(broker_handler))
        .route("/handle", post(handle_handler))
        .route("/log-grpc", post(log_grpc_handler))
        .route("/ping", get(ping_handler))
        .with_state(AppState { dispatcher, decode })
}

/// `POST /`
async fn broker_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(ResponseEnvelope::success("Hit the broker", None)),
    )
}

/// `POST /handle`
async fn handle_handler(State(state): State<AppState>, body: Body) -> Response {
    let request = match read_envelope(body, &state.decode).await {
        Ok(request) => request,
        Err(e) => return reject(e),
    };
    reply(state.dispatcher.dispatch(&request).await)
}

/// `POST /log-grpc`
async fn log_grpc_handler(State(state): State<AppState>, body: Body) -> Response {
    let request = match read_envelope(body, &state.decode).await {
        Ok(request) => request,
        Err(e) => return reject(e),
    };
    let Some(entry) = request.log else {
        return reply(DispatchError::MissingPayload("log".into()).into());
    };
    reply(state.dispatcher.log_via_grpc(&entry).await)
}

/// `GET /ping`
async fn ping_handler() -> &'static str {
    "."
}

async fn read_envelope(body: Body, options: &DecodeOptions) -> Result<ActionEnvelope, DecodeError> {
    let raw = read_limited(body, options.max_size).await?;
    envelope::decode(&raw, options)
}

/// Collect at most `max + 1` bytes so the codec can tell "exactly at the
/// limit" from "over it".
pub(crate) async fn read_limited(body: Body, max: usize) -> Result<Bytes, DecodeError> {
    axum::body::to_bytes(body, max.saturating_add(1))
        .await
        .map_err(|_| DecodeError::TooLarge(max))
}

fn reject(err: DecodeError) -> Response {
    tracing::debug!(error = %err, "rejected request body");
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::BAD_REQUEST);
    (status, Json(ResponseEnvelope::failure(err.to_string()))).into_response()
}

fn reply(outcome: Dispatched) -> Response {
    let status =
        StatusCode::from_u16(outcome.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(outcome.envelope)).into_response()
}
