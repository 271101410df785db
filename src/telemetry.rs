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
//! - `model`: model identifier (e.g. "ollama/mistral")
//! - `operation`: "call" or "generate" for model calls; store operation
//!   (e.g. "load", "save_final") for store errors
//! - `status`: outcome: "ok" or "error"
//! - `namespace`: cache namespace: "final" or "prompts"

/// Total model invocations that reached the timing layer.
///
/// Labels: `model`, `operation`, `status` ("ok" | "error").
pub const REQUESTS_TOTAL: &str = "huginn_requests_total";

/// Model call duration in seconds, retries and backoff included.
///
/// Labels: `model`, `operation`.
pub const REQUEST_DURATION_SECONDS: &str = "huginn_request_duration_seconds";

/// Total retry attempts (not counting the initial request).
///
/// Labels: `model`, `operation`.
pub const RETRIES_TOTAL: &str = "huginn_retries_total";

/// Total live cache hits.
///
/// Labels: `namespace`.
pub const CACHE_HITS_TOTAL: &str = "huginn_cache_hits_total";

/// Total cache misses, expired entries included.
///
/// Labels: `namespace`.
pub const CACHE_MISSES_TOTAL: &str = "huginn_cache_misses_total";

/// Persistent store failures absorbed by the cache manager.
///
/// Labels: `operation`.
pub const STORE_ERRORS_TOTAL: &str = "huginn_store_errors_total";

/// Call records the registered sink failed to accept.
pub const SINK_FAILURES_TOTAL: &str = "huginn_sink_failures_total";
