//! reqwest-backed [`RestTransport`].

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, RETRY_AFTER, USER_AGENT};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{Method, RestRequest, RestTransport};
use crate::telemetry;
use crate::{HuginnError, Result};

/// Default base URL for the platform REST API.
pub const DEFAULT_BASE_URL: &str = "https://www.guilded.gg/api/v1";

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Error body returned by the API on non-2xx responses.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: Option<String>,
    message: Option<String>,
}

/// REST transport over HTTPS with bearer-token authentication.
#[derive(Clone)]
pub struct HttpTransport {
    token: String,
    http: Client,
    base_url: String,
    user_agent: String,
}

impl HttpTransport {
    /// Create a transport for the default API base URL.
    pub fn new(token: impl Into<String>) -> Result<Self> {
        Self::with_base_url(token, DEFAULT_BASE_URL)
    }

    /// Create a transport with a custom base URL (for testing with wiremock).
    pub fn with_base_url(token: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        Self::with_options(token, base_url, DEFAULT_TIMEOUT)
    }

    /// Create a transport with a custom base URL and request timeout.
    pub fn with_options(
        token: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HuginnError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            token: token.into(),
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            user_agent: crate::version::user_agent(),
        })
    }

    fn reqwest_method(method: Method) -> reqwest::Method {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }

    /// Map a non-2xx response to a typed error.
    async fn error_for(response: Response, request: &RestRequest) -> HuginnError {
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<f64>().ok())
                .filter(|secs| secs.is_finite() && *secs >= 0.0)
                .map(Duration::from_secs_f64);
            return HuginnError::RateLimited { retry_after };
        }

        let text = response.text().await.unwrap_or_default();
        let parsed: Option<ErrorBody> = serde_json::from_str(&text).ok();
        let (code, message) = match parsed {
            Some(body) => (
                body.code,
                body.message
                    .unwrap_or_else(|| status.canonical_reason().unwrap_or("").to_string()),
            ),
            None => (None, text),
        };

        HuginnError::Api {
            status: status.as_u16(),
            code,
            message,
            method: request.method,
            path: request.path.clone(),
            body: request.body.clone(),
        }
    }
}

#[async_trait]
impl RestTransport for HttpTransport {
    async fn request(&self, request: RestRequest) -> Result<Option<Value>> {
        let url = format!("{}{}", self.base_url, request.path);
        let method = request.method.as_str();
        let start = Instant::now();

        let mut builder = self
            .http
            .request(Self::reqwest_method(request.method), &url)
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .header(USER_AGENT, &self.user_agent);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let result = async {
            let response = builder
                .send()
                .await
                .map_err(|e| HuginnError::Http(e.to_string()))?;

            if !response.status().is_success() {
                return Err(Self::error_for(response, &request).await);
            }

            let bytes = response
                .bytes()
                .await
                .map_err(|e| HuginnError::Http(e.to_string()))?;
            if bytes.is_empty() {
                return Ok(None);
            }
            Ok(Some(serde_json::from_slice(&bytes)?))
        }
        .await;

        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(telemetry::REST_REQUESTS_TOTAL, "method" => method, "status" => status)
            .increment(1);
        metrics::histogram!(telemetry::REST_REQUEST_DURATION_SECONDS, "method" => method)
            .record(start.elapsed().as_secs_f64());
        debug!(method, path = %request.path, status, "rest request");

        result
    }
}
