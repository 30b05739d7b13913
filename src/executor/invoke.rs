//! Method-descriptor dispatch.
//!
//! A [`ServiceClient`] maps method names to HTTP method + path templates once,
//! then turns `invoke(name, args, body)` into a load-balanced call.

use hyper::body::Bytes;
use hyper::Method;
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

use crate::config::ServiceOverrides;
use crate::executor::{ExecuteError, LoadBalancedExecutor};
use crate::http::{LbRequest, LbResponse};

#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    #[error("unknown method '{0}'")]
    UnknownMethod(String),

    #[error("method '{method}' is missing argument '{argument}'")]
    MissingArgument { method: String, argument: String },

    #[error("invalid path for method '{method}': {reason}")]
    InvalidPath { method: String, reason: String },

    #[error(transparent)]
    Execute(#[from] ExecuteError),
}

/// HTTP method and path template of one declared operation.
///
/// Templates look like `/users/{id}/orders?status={status}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSpec {
    pub method: Method,
    pub path: String,
}

impl MethodSpec {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
        }
    }

    /// Substitute `{name}` placeholders; values are percent-encoded.
    pub fn render(&self, name: &str, args: &HashMap<&str, &str>) -> Result<String, InvokeError> {
        let (path, query) = match self.path.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (self.path.as_str(), None),
        };

        let invalid = |reason: String| InvokeError::InvalidPath {
            method: name.to_string(),
            reason,
        };

        let mut url = Url::parse("http://placeholder/").map_err(|e| invalid(e.to_string()))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| invalid("base url cannot have path segments".into()))?;
            segments.clear();
            for segment in path.trim_start_matches('/').split('/') {
                segments.push(&substitute(name, segment, args, |v| v.to_string())?);
            }
        }

        if let Some(query) = query {
            let rendered = substitute(name, query, args, |v| {
                url::form_urlencoded::byte_serialize(v.as_bytes()).collect()
            })?;
            url.set_query(Some(&rendered));
        }

        let mut out = url.path().to_string();
        if let Some(query) = url.query() {
            out.push('?');
            out.push_str(query);
        }
        Ok(out)
    }
}

fn substitute(
    method: &str,
    template: &str,
    args: &HashMap<&str, &str>,
    encode: impl Fn(&str) -> String,
) -> Result<String, InvokeError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after.find('}').ok_or_else(|| InvokeError::InvalidPath {
            method: method.to_string(),
            reason: format!("unclosed placeholder in '{}'", template),
        })?;
        let argument = &after[..close];
        let value = args.get(argument).ok_or_else(|| InvokeError::MissingArgument {
            method: method.to_string(),
            argument: argument.to_string(),
        })?;
        out.push_str(&encode(value));
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Declared client for one logical service.
pub struct ServiceClient {
    service: String,
    executor: Arc<LoadBalancedExecutor>,
    methods: HashMap<String, MethodSpec>,
    overrides: Option<ServiceOverrides>,
}

impl ServiceClient {
    pub fn new(service: impl Into<String>, executor: Arc<LoadBalancedExecutor>) -> Self {
        Self {
            service: service.into(),
            executor,
            methods: HashMap::new(),
            overrides: None,
        }
    }

    /// Declare an operation.
    pub fn method(mut self, name: impl Into<String>, method: Method, path: impl Into<String>) -> Self {
        self.methods.insert(name.into(), MethodSpec::new(method, path));
        self
    }

    /// Overrides applied to every call made through this client.
    pub fn with_overrides(mut self, overrides: ServiceOverrides) -> Self {
        self.overrides = Some(overrides);
        self
    }

    pub fn spec(&self, name: &str) -> Option<&MethodSpec> {
        self.methods.get(name)
    }

    /// Build the request for `name` without executing it.
    pub fn request(&self, name: &str, args: &[(&str, &str)], body: Option<Bytes>) -> Result<LbRequest, InvokeError> {
        let spec = self
            .methods
            .get(name)
            .ok_or_else(|| InvokeError::UnknownMethod(name.to_string()))?;
        let args: HashMap<&str, &str> = args.iter().copied().collect();
        let target = spec.render(name, &args)?;

        let request = LbRequest::parse(spec.method.clone(), &target).map_err(|e| InvokeError::InvalidPath {
            method: name.to_string(),
            reason: e.to_string(),
        })?;
        Ok(match body {
            Some(body) => request.with_body(body),
            None => request,
        })
    }

    pub async fn invoke(
        &self,
        name: &str,
        args: &[(&str, &str)],
        body: Option<Bytes>,
    ) -> Result<LbResponse, InvokeError> {
        let request = self.request(name, args, body)?;
        let response = self
            .executor
            .execute(&self.service, request, self.overrides.as_ref())
            .await?;
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args<'a>(pairs: &[(&'a str, &'a str)]) -> HashMap<&'a str, &'a str> {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_render_path_and_query() {
        let spec = MethodSpec::new(Method::GET, "/users/{id}/orders?status={status}&limit=10");
        let rendered = spec
            .render("list_orders", &args(&[("id", "a b/c"), ("status", "open&new")]))
            .unwrap();
        assert_eq!(rendered, "/users/a%20b%2Fc/orders?status=open%26new&limit=10");
    }

    #[test]
    fn test_render_errors() {
        let spec = MethodSpec::new(Method::GET, "/users/{id}");
        assert!(matches!(
            spec.render("get_user", &HashMap::new()),
            Err(InvokeError::MissingArgument { ref argument, .. }) if argument == "id"
        ));

        let broken = MethodSpec::new(Method::GET, "/users/{id");
        assert!(matches!(
            broken.render("get_user", &args(&[("id", "1")])),
            Err(InvokeError::InvalidPath { .. })
        ));
    }

    #[test]
    fn test_render_root() {
        let spec = MethodSpec::new(Method::GET, "/");
        assert_eq!(spec.render("root", &HashMap::new()).unwrap(), "/");
    }
}
