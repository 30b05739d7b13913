//! Per-attempt request URI rewriting.
//!
//! The original request's path and query are kept; scheme, host and port come
//! from the chosen server. Secure targets get their scheme upgraded.

use hyper::Uri;

use crate::executor::ExecuteError;
use crate::load_balancer::ServerIdentity;

/// Whether the target must be reached securely. Configuration wins over the server.
pub fn is_secure(server: &ServerIdentity, configured: Option<bool>) -> bool {
    configured.unwrap_or(server.secure)
}

/// Secure counterpart of `scheme`; unknown schemes are returned unchanged.
pub fn secure_scheme(scheme: &str) -> &str {
    match scheme {
        "http" => "https",
        "ws" => "wss",
        other => other,
    }
}

/// Absolute URI for `original` on `server`.
pub fn reconstruct_uri(
    server: &ServerIdentity,
    original: &Uri,
    secure: bool,
) -> Result<Uri, ExecuteError> {
    let scheme = original.scheme_str().filter(|s| !s.is_empty()).unwrap_or("http");
    let (scheme, upgraded) = if secure {
        let upgraded = secure_scheme(scheme);
        (upgraded, upgraded != scheme)
    } else {
        (scheme, false)
    };

    let path = match original.path() {
        "" => "/",
        p => p,
    };
    let query = original.query().map(|q| {
        if upgraded {
            q.replace('+', "%20")
        } else {
            q.to_string()
        }
    });

    let host = if server.host.contains(':') && !server.host.starts_with('[') {
        format!("[{}]", server.host)
    } else {
        server.host.clone()
    };

    let mut rebuilt = format!("{}://{}:{}{}", scheme, host, server.port, path);
    if let Some(query) = query {
        rebuilt.push('?');
        rebuilt.push_str(&query);
    }

    rebuilt
        .parse()
        .map_err(|e| ExecuteError::InvalidRequest(format!("{}: {}", rebuilt, e)))
}
