//! Mock downstream capabilities, each bound to port 0.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use switchboard::adapter::rpc::{RpcArgs, RpcServer};
use switchboard::envelope::{AuthPayload, ResponseEnvelope};
use switchboard::Config;

pub const GOOD_PASSWORD: &str = "verysecret";

/// Payloads a mock capability has received.
#[derive(Clone, Default)]
pub struct Recorded(Arc<Mutex<Vec<Value>>>);

impl Recorded {
    pub fn all(&self) -> Vec<Value> {
        self.0.lock().clone()
    }

    fn push(&self, value: Value) {
        self.0.lock().push(value);
    }
}

/// Bind to port 0, serve `app`, and return the base URL.
pub async fn spawn_http(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// `POST /auth`: the good password gets `202` plus the user, a
/// `blocked@…` address gets a `202` error envelope, anything else `401`.
pub async fn spawn_auth() -> String {
    async fn auth(Json(payload): Json<AuthPayload>) -> (StatusCode, Json<ResponseEnvelope>) {
        if payload.email.starts_with("blocked@") {
            return (
                StatusCode::ACCEPTED,
                Json(ResponseEnvelope::failure("account disabled")),
            );
        }
        if payload.password != GOOD_PASSWORD {
            return (
                StatusCode::UNAUTHORIZED,
                Json(ResponseEnvelope::failure("invalid credentials")),
            );
        }
        let user = json!({ "id": 1, "email": payload.email, "active": 1 });
        (
            StatusCode::ACCEPTED,
            Json(ResponseEnvelope::success(
                format!("Logged in user {}", payload.email),
                Some(user),
            )),
        )
    }

    spawn_http(Router::new().route("/auth", post(auth))).await
}

/// `POST <path>` answering `status` and recording every body.
pub async fn spawn_recorder(path: &str, status: StatusCode) -> (String, Recorded) {
    async fn record(
        State((recorded, status)): State<(Recorded, StatusCode)>,
        Json(body): Json<Value>,
    ) -> StatusCode {
        recorded.push(body);
        status
    }

    let recorded = Recorded::default();
    let app = Router::new()
        .route(path, post(record))
        .with_state((recorded.clone(), status));
    let base = spawn_http(app).await;
    (format!("{base}{path}"), recorded)
}

/// Binary-RPC logger answering `RPCServer.LogInfo`.
pub async fn spawn_rpc_logger() -> (String, Recorded) {
    let recorded = Recorded::default();
    let seen = recorded.clone();
    let server = RpcServer::new().procedure("RPCServer.LogInfo", move |args: RpcArgs| {
        let seen = seen.clone();
        async move {
            let reply = format!("Processed payload via RPC: {}", args.name);
            seen.push(json!({ "name": args.name, "data": args.data }));
            Ok::<_, String>(reply)
        }
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        server.serve(listener).await.unwrap();
    });
    (addr.to_string(), recorded)
}

/// An address nothing listens on.
pub fn dead_addr() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr.to_string()
}

/// Defaults with every target pointed at local mocks.
pub fn config(auth_url: &str, logger_url: &str, mailer_url: &str, rpc_addr: &str) -> Config {
    let mut config = Config::default();
    config.targets.auth_url = auth_url.to_string();
    config.targets.logger_url = logger_url.to_string();
    config.targets.mailer_url = mailer_url.to_string();
    config.targets.logger_rpc_addr = rpc_addr.to_string();
    config
}
