//! REST transport abstraction.
//!
//! The core only needs "send verb + path + body, get JSON back or an error".
//! [`RestTransport`] captures that; [`HttpTransport`] implements it over
//! reqwest and [`RetryingTransport`] decorates any transport with rate-limit
//! backoff. Managers talk to the transport through the cheap-to-clone
//! [`Rest`] handle.

pub mod http;
pub mod retry;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::{HuginnError, Result};

pub use http::HttpTransport;
pub use retry::{RetryConfig, RetryingTransport};

/// HTTP verb of a REST request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single REST call.
#[derive(Debug, Clone, PartialEq)]
pub struct RestRequest {
    pub method: Method,
    /// Path relative to the API base URL, starting with `/`.
    pub path: String,
    pub body: Option<Value>,
    pub query: Vec<(String, String)>,
}

impl RestRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            query: Vec::new(),
        }
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }
}

/// Transport that executes REST requests.
///
/// Implementations return `Ok(None)` for responses without a body (e.g. 204)
/// and map non-2xx responses to [`HuginnError::Api`] or
/// [`HuginnError::RateLimited`].
#[async_trait]
pub trait RestTransport: Send + Sync {
    async fn request(&self, request: RestRequest) -> Result<Option<Value>>;
}

/// Shared handle to the configured REST transport.
#[derive(Clone)]
pub struct Rest {
    transport: Arc<dyn RestTransport>,
}

impl Rest {
    pub fn new(transport: Arc<dyn RestTransport>) -> Self {
        Self { transport }
    }

    pub async fn request(&self, request: RestRequest) -> Result<Option<Value>> {
        self.transport.request(request).await
    }

    pub async fn get(&self, path: impl Into<String>, query: Vec<(String, String)>) -> Result<Value> {
        let request = RestRequest::new(Method::Get, path).query(query);
        self.expect_body(request).await
    }

    /// Send a request with a JSON body and expect a JSON response.
    pub async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: impl Into<String>,
        body: &B,
    ) -> Result<Value> {
        let request = RestRequest::new(method, path).body(serde_json::to_value(body)?);
        self.expect_body(request).await
    }

    /// Send a request whose response body is ignored.
    pub async fn send_empty(&self, method: Method, path: impl Into<String>) -> Result<()> {
        self.request(RestRequest::new(method, path)).await?;
        Ok(())
    }

    async fn expect_body(&self, request: RestRequest) -> Result<Value> {
        let path = request.path.clone();
        self.request(request)
            .await?
            .ok_or_else(|| HuginnError::Decode(format!("empty response body from {path}")))
    }
}

/// Flatten a serializable query struct into `key=value` pairs.
///
/// `null` fields are skipped; arrays become repeated keys.
pub fn query_pairs<T: Serialize + ?Sized>(query: &T) -> Result<Vec<(String, String)>> {
    let value = serde_json::to_value(query)?;
    let Value::Object(map) = value else {
        return match value {
            Value::Null => Ok(Vec::new()),
            other => Err(HuginnError::Decode(format!(
                "query must serialize to an object, got {other}"
            ))),
        };
    };

    let mut pairs = Vec::new();
    for (key, value) in map {
        match value {
            Value::Null => {}
            Value::Array(items) => {
                for item in items {
                    pairs.push((key.clone(), scalar(item)));
                }
            }
            other => pairs.push((key, scalar(other))),
        }
    }
    Ok(pairs)
}

fn scalar(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct ListQuery {
        before: Option<String>,
        limit: Option<u32>,
        include_private: bool,
        tags: Vec<&'static str>,
    }

    #[test]
    fn query_pairs_skips_nulls_and_flattens_arrays() {
        let pairs = query_pairs(&ListQuery {
            before: None,
            limit: Some(50),
            include_private: true,
            tags: vec!["a", "b"],
        })
        .unwrap();

        assert!(pairs.contains(&("limit".into(), "50".into())));
        assert!(pairs.contains(&("includePrivate".into(), "true".into())));
        assert!(pairs.contains(&("tags".into(), "a".into())));
        assert!(pairs.contains(&("tags".into(), "b".into())));
        assert!(!pairs.iter().any(|(k, _)| k == "before"));
    }

    #[test]
    fn query_pairs_accepts_unit() {
        assert!(query_pairs(&()).unwrap().is_empty());
    }

    #[test]
    fn method_display() {
        assert_eq!(Method::Patch.to_string(), "PATCH");
    }
}
