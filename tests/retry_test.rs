use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use huginn::{
    HuginnError, Method, RestRequest, RestTransport, Result, RetryConfig, RetryingTransport,
};
use serde_json::{Value, json};

/// Mock transport that fails N times then succeeds.
struct FailThenSucceed {
    fail_count: AtomicU32,
    fail_with: fn() -> HuginnError,
    total_calls: AtomicU32,
}

impl FailThenSucceed {
    fn new(failures: u32, fail_with: fn() -> HuginnError) -> Self {
        Self {
            fail_count: AtomicU32::new(failures),
            fail_with,
            total_calls: AtomicU32::new(0),
        }
    }

    fn call_count(&self) -> u32 {
        self.total_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl RestTransport for FailThenSucceed {
    async fn request(&self, _request: RestRequest) -> Result<Option<Value>> {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        let remaining = self.fail_count.load(Ordering::Relaxed);
        if remaining > 0 {
            self.fail_count.fetch_sub(1, Ordering::Relaxed);
            return Err((self.fail_with)());
        }
        Ok(Some(json!({ "ok": true })))
    }
}

fn rate_limited() -> HuginnError {
    HuginnError::RateLimited { retry_after: None }
}

fn fast_config(max_attempts: u32) -> RetryConfig {
    RetryConfig::new()
        .max_attempts(max_attempts)
        .initial_delay(Duration::from_millis(1))
}

fn request() -> RestRequest {
    RestRequest::new(Method::Post, "/channels/c1/messages").body(json!({ "content": "hi" }))
}

#[tokio::test]
async fn retries_rate_limit_then_succeeds() {
    let inner = Arc::new(FailThenSucceed::new(2, rate_limited));
    let transport = RetryingTransport::new(inner.clone(), fast_config(3));

    let body = transport.request(request()).await.unwrap();
    assert_eq!(body, Some(json!({ "ok": true })));
    assert_eq!(inner.call_count(), 3);
}

#[tokio::test]
async fn gives_up_after_max_attempts() {
    let inner = Arc::new(FailThenSucceed::new(10, rate_limited));
    let transport = RetryingTransport::new(inner.clone(), fast_config(3));

    let err = transport.request(request()).await.unwrap_err();
    assert!(err.is_rate_limited());
    assert_eq!(inner.call_count(), 3);
}

#[tokio::test]
async fn other_errors_are_not_retried() {
    let inner = Arc::new(FailThenSucceed::new(1, || HuginnError::Http("reset".into())));
    let transport = RetryingTransport::new(inner.clone(), fast_config(5));

    let err = transport.request(request()).await.unwrap_err();
    assert!(matches!(err, HuginnError::Http(_)));
    assert_eq!(inner.call_count(), 1);
}

#[tokio::test]
async fn disabled_config_makes_single_attempt() {
    let inner = Arc::new(FailThenSucceed::new(1, rate_limited));
    let transport = RetryingTransport::new(inner.clone(), RetryConfig::disabled());

    assert!(transport.request(request()).await.is_err());
    assert_eq!(inner.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn honours_retry_after_hint() {
    let inner = Arc::new(FailThenSucceed::new(1, || HuginnError::RateLimited {
        retry_after: Some(Duration::from_secs(3)),
    }));
    let transport = RetryingTransport::new(inner.clone(), fast_config(2));

    let start = tokio::time::Instant::now();
    transport.request(request()).await.unwrap();
    assert!(start.elapsed() >= Duration::from_secs(3));
}

#[tokio::test]
async fn zero_attempts_still_tries_once() {
    let inner = Arc::new(FailThenSucceed::new(0, rate_limited));
    let transport = RetryingTransport::new(inner.clone(), RetryConfig::new().max_attempts(0));

    transport.request(request()).await.unwrap();
    assert_eq!(inner.call_count(), 1);
}
