//! The static action → adapter table.

use std::collections::HashMap;
use std::sync::Arc;

use reqwest::Url;

use crate::adapter::{Adapter, HttpAdapter, Invocation, PublishAdapter, RpcAdapter, TransportKind};
use crate::broker::{BrokerConnection, RoutingKey, Topology};
use crate::config::{Config, ConfigError, TargetsConfig};
use crate::envelope::{Action, ActionEnvelope};

/// Builds the success message for a routed action.
pub type Summarize = fn(&ActionEnvelope, &Invocation) -> String;

/// One table entry.
#[derive(Clone)]
pub struct Route {
    pub adapter: Arc<dyn Adapter>,
    pub summarize: Summarize,
}

/// Success messages per action.
pub mod summary {
    use super::*;

    pub fn authenticated(envelope: &ActionEnvelope, _: &Invocation) -> String {
        let email = envelope
            .auth
            .as_ref()
            .map(|auth| auth.email.as_str())
            .unwrap_or_default();
        format!("Authenticated user {email}")
    }

    /// The adapter's own message (the RPC result), else the logged data.
    pub fn logged(envelope: &ActionEnvelope, outcome: &Invocation) -> String {
        match &outcome.message {
            Some(message) if !message.is_empty() => message.clone(),
            _ => {
                let data = envelope
                    .log
                    .as_ref()
                    .map(|log| log.data.as_str())
                    .unwrap_or_default();
                format!("Logged data: {data}")
            }
        }
    }

    pub fn published(_: &ActionEnvelope, _: &Invocation) -> String {
        "logged via RabbitMQ".to_string()
    }

    pub fn mailed(envelope: &ActionEnvelope, _: &Invocation) -> String {
        let to = envelope
            .mail
            .as_ref()
            .map(|mail| mail.to.as_str())
            .unwrap_or_default();
        format!("Message sent to {to}")
    }
}

/// Action → route, built once at startup and read-only afterwards.
///
/// ## Example
///
/// ```ignore
/// let routes = RouteTable::new()
///     .route(Action::Auth, auth_adapter, summary::authenticated)
///     .route(Action::Log, rpc_adapter, summary::logged)
///     .route(Action::Mail, mail_adapter, summary::mailed);
/// ```
#[derive(Clone, Default)]
pub struct RouteTable {
    routes: HashMap<Action, Route>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a route. Uses builder pattern; returns `self` for chaining.
    pub fn route(mut self, action: Action, adapter: Arc<dyn Adapter>, summarize: Summarize) -> Self {
        self.routes.insert(action, Route { adapter, summarize });
        self
    }

    pub fn get(&self, action: &Action) -> Option<&Route> {
        self.routes.get(action)
    }

    /// Routed action names, sorted.
    pub fn actions(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.routes.keys().map(|a| a.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// The standard table: auth and mail over HTTP, log over the configured
    /// transport.
    ///
    /// `broker` is only needed when the log transport is `publish`.
    pub fn from_config(
        config: &Config,
        broker: Option<Arc<dyn BrokerConnection>>,
    ) -> Result<Self, ConfigError> {
        let targets = &config.targets;
        let client = reqwest::Client::new();

        let auth = HttpAdapter::new(parse_url("targets.auth_url", &targets.auth_url)?)
            .with_client(client.clone())
            .decode_envelope(true);
        let mail = HttpAdapter::new(parse_url("targets.mailer_url", &targets.mailer_url)?)
            .with_client(client.clone());

        let (log, summarize): (Arc<dyn Adapter>, Summarize) = match config.routes.log_transport {
            TransportKind::Rpc => (
                Arc::new(RpcAdapter::new(
                    targets.logger_rpc_addr.clone(),
                    targets.logger_rpc_method.clone(),
                )),
                summary::logged,
            ),
            TransportKind::Http => (
                Arc::new(
                    HttpAdapter::new(parse_url("targets.logger_url", &targets.logger_url)?)
                        .with_client(client),
                ),
                summary::logged,
            ),
            TransportKind::Grpc => (grpc_logger(targets)?, summary::logged),
            TransportKind::Publish => {
                let connection = broker.ok_or_else(|| {
                    ConfigError::Invalid(
                        "log_transport = \"publish\" needs a broker connection".into(),
                    )
                })?;
                let key = RoutingKey::parse(&config.broker.routing_key).ok_or_else(|| {
                    ConfigError::Invalid(format!(
                        "broker.routing_key '{}' must look like category.severity",
                        config.broker.routing_key
                    ))
                })?;
                let topology = Topology::new(config.broker.exchange.clone());
                let adapter = PublishAdapter::new(connection, topology).with_routing_key(key);
                (Arc::new(adapter), summary::published)
            }
        };

        Ok(Self::new()
            .route(Action::Auth, Arc::new(auth), summary::authenticated)
            .route(Action::Log, log, summarize)
            .route(Action::Mail, Arc::new(mail), summary::mailed))
    }
}

fn parse_url(field: &str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|e| ConfigError::Invalid(format!("{field} '{raw}': {e}")))
}

/// The gRPC logging adapter described by `targets`.
#[cfg(feature = "grpc")]
pub fn grpc_logger(targets: &TargetsConfig) -> Result<Arc<dyn Adapter>, ConfigError> {
    use crate::adapter::GrpcAdapter;
    use tonic::transport::{Certificate, ClientTlsConfig};

    let mut adapter = GrpcAdapter::new(targets.logger_grpc_endpoint.clone())
        .with_deadline(targets.grpc_deadline());

    if targets.logger_grpc_endpoint.starts_with("https://") {
        let mut tls = ClientTlsConfig::new();
        if let Some(path) = &targets.grpc_ca_certificate {
            let pem = std::fs::read(path).map_err(|source| ConfigError::Io {
                path: path.clone(),
                source,
            })?;
            tls = tls.ca_certificate(Certificate::from_pem(pem));
        }
        adapter = adapter.with_tls(tls);
    }

    Ok(Arc::new(adapter))
}

#[cfg(not(feature = "grpc"))]
pub fn grpc_logger(_: &TargetsConfig) -> Result<Arc<dyn Adapter>, ConfigError> {
    Err(ConfigError::Invalid(
        "gRPC transport requires the `grpc` feature".into(),
    ))
}
