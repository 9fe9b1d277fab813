//! HTTP-REST adapter: JSON `POST` to a fixed URL.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode, Url};
use serde_json::Value;

use super::{Adapter, AdapterError, Invocation, Target, TransportKind};
use crate::envelope::ResponseEnvelope;

/// Posts the payload as JSON and checks the peer's status.
///
/// - `401` becomes `UpstreamStatus(401)`.
/// - Any status other than the expected one (default `202 Accepted`)
///   becomes `UpstreamStatus(code)`.
/// - With [`decode_envelope`](Self::decode_envelope) on, the peer's body is
///   read as a [`ResponseEnvelope`]; a peer envelope with `error: true` is
///   surfaced as an unauthorized `UpstreamStatus` carrying the peer's
///   message.
///
/// No timeout is set here; the client's own defaults apply.
pub struct HttpAdapter {
    target: Target,
    url: Url,
    client: Client,
    expect: StatusCode,
    decode_envelope: bool,
}

impl HttpAdapter {
    pub fn new(url: Url) -> Self {
        let address = match (url.host_str(), url.port_or_known_default()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            _ => String::new(),
        };
        Self {
            target: Target {
                kind: TransportKind::Http,
                address,
                endpoint: url.path().to_string(),
                timeout: None,
            },
            url,
            client: Client::new(),
            expect: StatusCode::ACCEPTED,
            decode_envelope: false,
        }
    }

    /// Share a client (and its connection pool) across adapters.
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    /// The status the peer answers with on success.
    pub fn expect_status(mut self, status: StatusCode) -> Self {
        self.expect = status;
        self
    }

    /// Read the peer's reply as a response envelope.
    pub fn decode_envelope(mut self, decode: bool) -> Self {
        self.decode_envelope = decode;
        self
    }
}

#[async_trait]
impl Adapter for HttpAdapter {
    fn target(&self) -> &Target {
        &self.target
    }

    async fn invoke(&self, payload: Value) -> Result<Invocation, AdapterError> {
        let body = serde_json::to_vec(&payload)
            .map_err(|e| AdapterError::DecodeFailed(format!("could not marshal json: {e}")))?;

        let response = self
            .client
            .post(self.url.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| AdapterError::ConnectFailed(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(AdapterError::upstream(401));
        }
        if status != self.expect {
            return Err(AdapterError::upstream(status.as_u16()));
        }
        if !self.decode_envelope {
            return Ok(Invocation::default());
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AdapterError::DecodeFailed(e.to_string()))?;
        let peer: ResponseEnvelope = serde_json::from_slice(&bytes)
            .map_err(|e| AdapterError::DecodeFailed(e.to_string()))?;

        if peer.error {
            return Err(AdapterError::UpstreamStatus {
                code: 401,
                message: Some(peer.message),
            });
        }

        Ok(Invocation {
            message: Some(peer.message),
            data: peer.data,
        })
    }
}
