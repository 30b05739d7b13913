//! HTTP request/response model and transport subsystem.
//!
//! # Data Flow
//! ```text
//! Caller builds LbRequest (relative path + buffered body)
//!     → executor rewrites it per attempt (absolute URI on chosen server)
//!     → transport.rs (one attempt, connect/read timeouts)
//!     → response.rs (status, headers, buffered body)
//!     → back to executor for classification
//! ```

pub mod request;
pub mod response;
pub mod transport;

pub use request::{LbRequest, X_REQUEST_ID};
pub use response::LbResponse;
pub use transport::{HttpTransport, Transport, TransportError, TransportOptions};
