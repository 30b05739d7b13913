//! Outgoing request model.
//!
//! # Responsibilities
//! - Carry method, target, headers and a buffered body for one logical call
//! - Carry the per-request retry opt-out
//! - Produce the per-attempt copy aimed at a concrete server
//!
//! # Design Decisions
//! - The body is `Bytes`, so every attempt re-sends the same payload without re-reading a stream
//! - The URI may be relative (`/users/1?x=y`); only path and query survive the rewrite

use hyper::body::Bytes;
use hyper::header::{HeaderName, HeaderValue};
use hyper::http::uri::InvalidUri;
use hyper::{HeaderMap, Method, Uri};

/// Header carrying the execution id of a logical call.
pub const X_REQUEST_ID: &str = "x-request-id";

/// A request addressed to a logical service rather than a concrete server.
#[derive(Debug, Clone)]
pub struct LbRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// `Some(false)` forces a single attempt regardless of service settings.
    pub retryable: Option<bool>,
}

impl LbRequest {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            retryable: None,
        }
    }

    /// Build a request from a method and a textual target such as `/users/1?active=true`.
    pub fn parse(method: Method, uri: &str) -> Result<Self, InvalidUri> {
        Ok(Self::new(method, uri.parse()?))
    }

    pub fn get(uri: &str) -> Result<Self, InvalidUri> {
        Self::parse(Method::GET, uri)
    }

    pub fn post(uri: &str) -> Result<Self, InvalidUri> {
        Self::parse(Method::POST, uri)
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = Some(retryable);
        self
    }

    /// Copy of this request aimed at an absolute `uri`.
    pub fn to_attempt(&self, uri: Uri) -> Self {
        Self {
            method: self.method.clone(),
            uri,
            headers: self.headers.clone(),
            body: self.body.clone(),
            retryable: self.retryable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::CONTENT_TYPE;

    #[test]
    fn test_attempt_copy_keeps_payload() {
        let request = LbRequest::post("/orders?draft=true")
            .unwrap()
            .with_header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .with_body(r#"{"id":1}"#)
            .with_retryable(false);

        let attempt = request.to_attempt("http://10.0.0.1:8080/orders?draft=true".parse().unwrap());
        assert_eq!(attempt.method, Method::POST);
        assert_eq!(attempt.uri.host(), Some("10.0.0.1"));
        assert_eq!(attempt.headers.get(CONTENT_TYPE).unwrap(), "application/json");
        assert_eq!(attempt.body, Bytes::from_static(br#"{"id":1}"#));
        assert_eq!(attempt.retryable, Some(false));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(LbRequest::get("http://[bad").is_err());
    }
}
