//! gRPC route: unary `WriteLog` under a hard deadline.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use switchboard::adapter::grpc::{GrpcAdapter, Log, LogRequest, LogResponse, LogService, LogServiceServer};
use switchboard::adapter::{AdapterError, TransportKind};
use switchboard::envelope::{ActionEnvelope, LogPayload, ResponseEnvelope};
use switchboard::{dispatch, Config, Dispatcher, RouteTable};
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::{Request, Response, Status};

/// Records entries and answers after `delay`.
#[derive(Clone, Default)]
struct Logger {
    entries: Arc<Mutex<Vec<Log>>>,
    delay: Duration,
}

#[tonic::async_trait]
impl LogService for Logger {
    async fn write_log(
        &self,
        request: Request<LogRequest>,
    ) -> Result<Response<LogResponse>, Status> {
        tokio::time::sleep(self.delay).await;
        let entry = request
            .into_inner()
            .log_entry
            .ok_or_else(|| Status::invalid_argument("missing entry"))?;
        self.entries.lock().push(entry);
        Ok(Response::new(LogResponse {
            result: "logged!".into(),
        }))
    }
}

/// Bind to port 0, spawn the gRPC server, and return its endpoint.
async fn start_server(logger: Logger) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        tonic::transport::Server::builder()
            .add_service(LogServiceServer::new(logger))
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn write_log_returns_result() {
    let logger = Logger::default();
    let endpoint = start_server(logger.clone()).await;

    let adapter = GrpcAdapter::new(endpoint);
    let result = adapter
        .write_log(Log {
            name: "event".into(),
            data: "via grpc".into(),
        })
        .await
        .unwrap();

    assert_eq!(result, "logged!");
    let entries = logger.entries.lock().clone();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].data, "via grpc");
}

#[tokio::test]
async fn slow_downstream_times_out_at_deadline() {
    let logger = Logger {
        delay: Duration::from_secs(2),
        ..Default::default()
    };
    let endpoint = start_server(logger).await;
    let adapter = GrpcAdapter::new(endpoint);

    let started = Instant::now();
    let err = adapter
        .write_log(Log {
            name: "event".into(),
            data: "slow".into(),
        })
        .await
        .unwrap_err();
    let elapsed = started.elapsed();

    assert_eq!(err, AdapterError::Timeout);
    assert!(elapsed >= Duration::from_millis(900), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(1800), "{elapsed:?}");
}

#[tokio::test]
async fn unreachable_endpoint_is_connect_failed() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let adapter = GrpcAdapter::new(format!("http://{addr}"));
    let err = adapter
        .write_log(Log::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AdapterError::ConnectFailed(_)), "{err:?}");
}

#[tokio::test]
async fn log_grpc_route_answers_logged() {
    let logger = Logger::default();
    let endpoint = start_server(logger.clone()).await;

    let mut config = Config::default();
    config.targets.logger_grpc_endpoint = endpoint;
    let dispatcher = Dispatcher::new(RouteTable::new())
        .with_grpc_logger(dispatch::grpc_logger(&config.targets).unwrap());

    let out = dispatcher
        .log_via_grpc(&LogPayload::new("event", "from route"))
        .await;

    assert_eq!(out.status, 202);
    assert_eq!(out.envelope, ResponseEnvelope::success("logged", None));
    assert_eq!(logger.entries.lock().len(), 1);
}

#[tokio::test]
async fn log_action_can_use_grpc_transport() {
    let logger = Logger::default();
    let endpoint = start_server(logger.clone()).await;

    let mut config = Config::default();
    config.targets.logger_grpc_endpoint = endpoint;
    config.routes.log_transport = TransportKind::Grpc;
    let dispatcher = Dispatcher::new(RouteTable::from_config(&config, None).unwrap());

    let out = dispatcher
        .dispatch(&ActionEnvelope::log(LogPayload::new("event", "routed")))
        .await;

    assert_eq!(out.status, 202);
    assert_eq!(out.envelope.message, "logged!");
}
