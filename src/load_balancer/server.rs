//! Server identity.
//!
//! # Responsibilities
//! - Represent a single concrete instance backing a logical service
//! - Provide the stats key (`host:port`) and base URL for request rewriting
//! - Parse the `servers = [...]` entries of the configuration file

use std::collections::BTreeMap;
use std::fmt;
use url::Url;

/// Errors produced while parsing a server address.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ServerParseError {
    #[error("invalid server address '{0}'")]
    InvalidAddress(String),

    #[error("server address '{0}' has no port")]
    MissingPort(String),

    #[error("unsupported scheme '{scheme}' in '{address}'")]
    UnsupportedScheme { scheme: String, address: String },
}

/// A concrete server instance chosen for one attempt.
///
/// Created by a [`ServerDirectory`](crate::load_balancer::ServerDirectory) and never
/// mutated by the executor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerIdentity {
    pub host: String,
    pub port: u16,
    pub zone: Option<String>,
    /// Server-reported TLS flag. Client configuration may override it.
    pub secure: bool,
    pub metadata: BTreeMap<String, String>,
}

impl ServerIdentity {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            zone: None,
            secure: false,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_zone(mut self, zone: impl Into<String>) -> Self {
        self.zone = Some(zone.into());
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Parse `host:port`, `http://host:port` or `https://host:port`.
    ///
    /// An `https` scheme marks the server secure; without an explicit port the
    /// scheme default is used.
    pub fn parse(address: &str) -> Result<Self, ServerParseError> {
        let address = address.trim();
        if address.is_empty() {
            return Err(ServerParseError::InvalidAddress(address.to_string()));
        }

        let with_scheme = if address.contains("://") {
            address.to_string()
        } else {
            format!("http://{}", address)
        };

        let url = Url::parse(&with_scheme)
            .map_err(|_| ServerParseError::InvalidAddress(address.to_string()))?;

        let secure = match url.scheme() {
            "http" => false,
            "https" => true,
            other => {
                return Err(ServerParseError::UnsupportedScheme {
                    scheme: other.to_string(),
                    address: address.to_string(),
                })
            }
        };

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ServerParseError::InvalidAddress(address.to_string()))?;

        // Bare `host` without a scheme would silently pick port 80; require it.
        if !address.contains("://") && !address.contains(':') {
            return Err(ServerParseError::MissingPort(address.to_string()));
        }

        let port = url
            .port_or_known_default()
            .ok_or_else(|| ServerParseError::MissingPort(address.to_string()))?;

        Ok(Self::new(host, port).with_secure(secure))
    }

    /// Key used by the stats registry.
    pub fn host_port(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Base URL of this instance, honoring the server-reported secure flag.
    pub fn base_url(&self) -> Result<Url, url::ParseError> {
        let scheme = if self.secure { "https" } else { "http" };
        Url::parse(&format!("{}://{}", scheme, self.host_port()))
    }
}

impl fmt::Display for ServerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
