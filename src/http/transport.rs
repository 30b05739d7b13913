//! Transport abstraction and the default hyper-based implementation.
//!
//! # Responsibilities
//! - Execute exactly one request against one concrete server
//! - Enforce the per-attempt connect and read timeouts
//! - Classify failures so the retry policy can tell circuit-related errors apart
//!
//! # Design Decisions
//! - One pooled client per distinct connect timeout; clients are cheap to clone
//! - Response bodies are buffered before returning
//! - TLS is not built in; non-`http` targets are rejected before dispatch and never
//!   charged to the server's circuit

use async_trait::async_trait;
use axum::body::Body;
use dashmap::DashMap;
use hyper::http::uri::Scheme;
use hyper::Request;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use std::error::Error as StdError;
use std::io;
use std::time::Duration;

use crate::config::ServiceProperties;
use crate::http::{LbRequest, LbResponse};

/// Per-attempt timeouts handed to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportOptions {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self::from_properties(&ServiceProperties::default())
    }
}

impl TransportOptions {
    pub fn from_properties(props: &ServiceProperties) -> Self {
        Self {
            connect_timeout: Duration::from_millis(props.connect_timeout_ms),
            read_timeout: Duration::from_millis(props.read_timeout_ms),
        }
    }
}

/// Transport-level failure of a single attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("connection refused by {0}")]
    ConnectionRefused(String),

    #[error("unknown host {0}")]
    UnknownHost(String),

    #[error("connect to {target} timed out after {after:?}")]
    ConnectTimeout { target: String, after: Duration },

    #[error("read from {target} timed out after {after:?}")]
    ReadTimeout { target: String, after: Duration },

    #[error("connection to {0} reset")]
    ConnectionReset(String),

    #[error("connect error: {0}")]
    Connect(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl TransportError {
    /// Whether this failure should count against the server's circuit.
    pub fn is_circuit_related(&self) -> bool {
        matches!(
            self,
            TransportError::ConnectionRefused(_)
                | TransportError::UnknownHost(_)
                | TransportError::ConnectTimeout { .. }
                | TransportError::ReadTimeout { .. }
                | TransportError::ConnectionReset(_)
                | TransportError::Connect(_)
        )
    }
}

impl From<io::Error> for TransportError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::ConnectionRefused => TransportError::ConnectionRefused(e.to_string()),
            io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted => {
                TransportError::ConnectionReset(e.to_string())
            }
            _ => TransportError::Io(e.to_string()),
        }
    }
}

/// Executes one request against one server.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(
        &self,
        request: LbRequest,
        options: &TransportOptions,
    ) -> Result<LbResponse, TransportError>;
}

/// Plain-HTTP transport on the hyper-util pooled client.
#[derive(Debug, Default)]
pub struct HttpTransport {
    clients: DashMap<Duration, Client<HttpConnector, Body>>,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn client_for(&self, connect_timeout: Duration) -> Client<HttpConnector, Body> {
        self.clients
            .entry(connect_timeout)
            .or_insert_with(|| {
                let mut connector = HttpConnector::new();
                connector.set_connect_timeout(Some(connect_timeout));
                connector.set_nodelay(true);
                Client::builder(TokioExecutor::new()).build(connector)
            })
            .value()
            .clone()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(
        &self,
        request: LbRequest,
        options: &TransportOptions,
    ) -> Result<LbResponse, TransportError> {
        // A scheme the connector cannot speak is a caller problem, not a server fault.
        if request.uri.scheme() != Some(&Scheme::HTTP) {
            return Err(TransportError::InvalidRequest(format!(
                "unsupported scheme in {}, HttpTransport speaks plain http only",
                request.uri
            )));
        }

        let target = request
            .uri
            .authority()
            .map(|a| a.to_string())
            .unwrap_or_default();
        let uri = request.uri.clone();

        let mut outgoing = Request::builder()
            .method(request.method)
            .uri(request.uri)
            .body(Body::from(request.body))
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
        *outgoing.headers_mut() = request.headers;

        let client = self.client_for(options.connect_timeout);

        // The head deadline covers connect and first byte; the body gets its own read window.
        let head_deadline = options.connect_timeout + options.read_timeout;
        let response = match tokio::time::timeout(head_deadline, client.request(outgoing)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(classify_client_error(&e, &target, options)),
            Err(_) => {
                return Err(TransportError::ReadTimeout {
                    target,
                    after: options.read_timeout,
                })
            }
        };

        let (parts, body) = response.into_parts();
        let body = match tokio::time::timeout(
            options.read_timeout,
            axum::body::to_bytes(Body::new(body), usize::MAX),
        )
        .await
        {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => return Err(TransportError::Io(e.to_string())),
            Err(_) => {
                return Err(TransportError::ReadTimeout {
                    target,
                    after: options.read_timeout,
                })
            }
        };

        Ok(LbResponse {
            status: parts.status,
            headers: parts.headers,
            body,
            uri,
        })
    }
}

fn classify_client_error(
    error: &hyper_util::client::legacy::Error,
    target: &str,
    options: &TransportOptions,
) -> TransportError {
    let mut source: Option<&(dyn StdError + 'static)> = error.source();
    while let Some(cause) = source {
        if let Some(io_error) = cause.downcast_ref::<io::Error>() {
            return match io_error.kind() {
                io::ErrorKind::ConnectionRefused => TransportError::ConnectionRefused(target.to_string()),
                io::ErrorKind::TimedOut => TransportError::ConnectTimeout {
                    target: target.to_string(),
                    after: options.connect_timeout,
                },
                io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted => {
                    TransportError::ConnectionReset(target.to_string())
                }
                _ if error.is_connect() => TransportError::Connect(format!("{}: {}", target, io_error)),
                _ => TransportError::Io(io_error.to_string()),
            };
        }
        if cause.to_string().contains("dns error") {
            return TransportError::UnknownHost(target.to_string());
        }
        if let Some(hyper_error) = cause.downcast_ref::<hyper::Error>() {
            if hyper_error.is_incomplete_message() {
                return TransportError::ConnectionReset(target.to_string());
            }
        }
        source = cause.source();
    }

    if error.is_connect() {
        TransportError::Connect(format!("{}: {}", target, error))
    } else {
        TransportError::Io(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circuit_classification() {
        assert!(TransportError::ConnectionRefused("a:1".into()).is_circuit_related());
        assert!(TransportError::UnknownHost("nope".into()).is_circuit_related());
        assert!(TransportError::ReadTimeout {
            target: "a:1".into(),
            after: Duration::from_millis(5)
        }
        .is_circuit_related());
        assert!(!TransportError::Io("broken pipe".into()).is_circuit_related());
        assert!(!TransportError::InvalidRequest("bad".into()).is_circuit_related());
    }

    #[test]
    fn test_io_error_mapping() {
        let refused: TransportError = io::Error::from(io::ErrorKind::ConnectionRefused).into();
        assert!(matches!(refused, TransportError::ConnectionRefused(_)));
        let other: TransportError = io::Error::new(io::ErrorKind::Other, "boom").into();
        assert!(matches!(other, TransportError::Io(_)));
    }

    #[test]
    fn test_options_from_properties() {
        let options = TransportOptions::default();
        assert_eq!(options.connect_timeout, Duration::from_millis(1000));
        assert_eq!(options.read_timeout, Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn test_refused_connection_is_classified() {
        // Bind then drop to get a port nobody listens on.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let transport = HttpTransport::new();
        let request = LbRequest::get(&format!("http://127.0.0.1:{}/", port)).unwrap();
        let err = transport
            .execute(request, &TransportOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_circuit_related(), "unexpected error: {err:?}");
    }

    #[tokio::test]
    async fn test_https_target_rejected_without_circuit_charge() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let transport = HttpTransport::new();

        for scheme in ["https", "ws"] {
            let request = LbRequest::get(&format!("{}://{}/", scheme, addr)).unwrap();
            let err = transport
                .execute(request, &TransportOptions::default())
                .await
                .unwrap_err();
            assert!(matches!(err, TransportError::InvalidRequest(_)), "unexpected error: {err:?}");
            assert!(!err.is_circuit_related());
        }
    }
}
