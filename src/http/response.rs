//! Buffered response returned by a transport.

use hyper::body::Bytes;
use hyper::{HeaderMap, StatusCode, Uri};
use serde::de::DeserializeOwned;

/// A fully received response.
///
/// The body is buffered by the transport, so a response kept aside while a retry
/// is attempted is still complete when it is finally handed back.
#[derive(Debug, Clone)]
pub struct LbResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Absolute URI the response came from.
    pub uri: Uri,
}

impl LbResponse {
    pub fn new(status: StatusCode, uri: Uri) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            uri,
        }
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    pub fn into_body(self) -> Bytes {
        self.body
    }
}
