//! Telemetry metric name constants.
//!
//! Centralised metric names for huginn operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `huginn_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `method`: REST verb (e.g. "GET", "PATCH")
//! - `kind`: entity kind (e.g. "message", "channel")
//! - `event`: inbound event name (e.g. "ChatMessageCreated")
//! - `status`: outcome: "ok" or "error"

/// Total REST requests sent by the HTTP transport.
///
/// Labels: `method`, `status` ("ok" | "error").
pub const REST_REQUESTS_TOTAL: &str = "huginn_rest_requests_total";

/// REST request duration in seconds.
///
/// Labels: `method`.
pub const REST_REQUEST_DURATION_SECONDS: &str = "huginn_rest_request_duration_seconds";

/// Total retry attempts after rate limiting (not counting the initial request).
///
/// Labels: `method`.
pub const RETRIES_TOTAL: &str = "huginn_retries_total";

/// Total entity cache hits in manager `fetch`.
///
/// Labels: `kind`.
pub const CACHE_HITS_TOTAL: &str = "huginn_cache_hits_total";

/// Total entity cache misses in manager `fetch`.
///
/// Labels: `kind`.
pub const CACHE_MISSES_TOTAL: &str = "huginn_cache_misses_total";

/// Total inbound events processed by the synchronization pipeline.
///
/// Labels: `event`, `status` ("ok" | "error").
pub const EVENTS_TOTAL: &str = "huginn_events_total";

/// Total inbound events dropped because their name is not recognised.
pub const EVENTS_UNKNOWN_TOTAL: &str = "huginn_events_unknown_total";

/// Total stream reconnect attempts.
pub const RECONNECTS_TOTAL: &str = "huginn_reconnects_total";
