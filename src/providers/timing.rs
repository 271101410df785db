//! Retry configuration, backoff, and the timing decorator.
//!
//! [`TimingClient`] wraps a raw [`ModelClient`] and adds three things:
//!
//! - retries with exponential backoff, via the shared [`with_retry`] helper;
//! - wall-clock measurement of each call, retries included;
//! - a [`CallRecord`] per successful call, handed to a registered
//!   [`CallSink`] (normally the [`CacheManager`](crate::CacheManager)).
//!
//! The sink is attached explicitly with [`TimingClient::set_sink`] or
//! [`TimingClient::with_sink`]. Without one, no records are produced; metrics
//! and logs still are.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::{error, instrument, warn};

use super::traits::{CallSink, ModelClient, ResponseText};
use crate::cache::key::{PROMPT_PREVIEW_CHARS, truncate_chars};
use crate::clock::{Clock, SystemClock};
use crate::store::CallRecord;
use crate::{LlmClient, Result, telemetry};

/// How hard [`TimingClient`] tries before giving up on a model call.
///
/// Failed attempt `n` (counting from 0) is followed by a sleep of
/// `backoff_unit * 2^n`, never more than `max_delay`. Out of the box that is
/// 1s, 2s, then the error.
///
/// ```rust
/// # use huginn::RetryConfig;
/// # use std::time::Duration;
/// let config = RetryConfig::new()
///     .max_attempts(5)
///     .backoff_unit(Duration::from_millis(200));
/// assert_eq!(config.delay_for_attempt(2), Duration::from_millis(800));
/// ```
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts per call, the first one included. `1` means a single try.
    pub max_attempts: u32,
    /// Sleep after the first failure; each later one doubles it.
    pub backoff_unit: Duration,
    /// Ceiling on any single sleep.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_unit: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryConfig {
    /// Three attempts on a one second unit.
    pub fn new() -> Self {
        Self::default()
    }

    /// One attempt, no sleeping.
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    pub fn backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// `backoff_unit * 2^attempt`, clamped to `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self
            .backoff_unit
            .saturating_mul(2u32.saturating_pow(attempt));
        delay.min(self.max_delay)
    }

    /// Sleep before the next attempt. A provider `retry_after` hint can
    /// lengthen the exponential delay but never shorten it.
    pub fn effective_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let computed = self.delay_for_attempt(attempt);
        retry_after.map_or(computed, |hint| hint.max(computed))
    }
}

// ============================================================================
// Shared retry helper
// ============================================================================

/// Execute an async operation with retry logic.
///
/// Retries errors classified as transient by
/// [`HuginnError::is_transient()`](crate::HuginnError::is_transient), up to
/// `config.max_attempts` in total. Permanent errors are returned on the spot.
/// After the last attempt the final error is returned unchanged.
pub(crate) async fn with_retry<F, Fut, T>(
    config: &RetryConfig,
    model: &str,
    operation: &str,
    f: F,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_transient() && attempt + 1 < max_attempts => {
                let delay = config.effective_delay(attempt, e.retry_after());
                metrics::counter!(telemetry::RETRIES_TOTAL,
                    "model" => model.to_owned(),
                    "operation" => operation.to_owned(),
                )
                .increment(1);
                warn!(
                    model,
                    operation,
                    attempt = attempt + 1,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "model call failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                error!(
                    model,
                    operation,
                    attempts = attempt + 1,
                    error = %e,
                    "model call failed"
                );
                return Err(e);
            }
        }
    }
}

// ============================================================================
// TimingClient
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Call,
    Generate,
}

impl Operation {
    fn as_str(self) -> &'static str {
        match self {
            Operation::Call => "call",
            Operation::Generate => "generate",
        }
    }
}

/// Decorator that times, retries, and records calls to a [`ModelClient`].
pub struct TimingClient<C> {
    inner: C,
    retry: RetryConfig,
    sink: Option<Arc<dyn CallSink>>,
    clock: Arc<dyn Clock>,
}

impl<C: ModelClient> TimingClient<C> {
    /// Wrap a model client. No sink is registered.
    pub fn new(inner: C, retry: RetryConfig) -> Self {
        Self {
            inner,
            retry,
            sink: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Register the sink that receives call records.
    pub fn set_sink(&mut self, sink: Arc<dyn CallSink>) {
        self.sink = Some(sink);
    }

    /// Builder form of [`set_sink`](Self::set_sink).
    pub fn with_sink(mut self, sink: Arc<dyn CallSink>) -> Self {
        self.set_sink(sink);
        self
    }

    /// Stop producing call records.
    pub fn clear_sink(&mut self) {
        self.sink = None;
    }

    /// Replace the clock used to stamp call records.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// The wrapped client, for capabilities huginn does not wrap.
    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn into_inner(self) -> C {
        self.inner
    }

    async fn invoke(
        &self,
        operation: Operation,
        prompt: &str,
        caller: Option<&str>,
    ) -> Result<C::Output> {
        let use_generate = operation == Operation::Generate && self.inner.supports_generate();
        let inner = &self.inner;
        let start = Instant::now();

        let result = with_retry(&self.retry, inner.model(), operation.as_str(), move || {
            if use_generate {
                inner.generate(prompt)
            } else {
                inner.call(prompt)
            }
        })
        .await;

        let elapsed = start.elapsed();
        self.record_request(operation, elapsed, result.is_ok());
        if let Ok(output) = &result {
            self.record_call(prompt, caller, elapsed, output);
        }
        result
    }

    fn record_request(&self, operation: Operation, elapsed: Duration, ok: bool) {
        let status = if ok { "ok" } else { "error" };
        metrics::counter!(telemetry::REQUESTS_TOTAL,
            "model" => self.inner.model().to_owned(),
            "operation" => operation.as_str(),
            "status" => status,
        )
        .increment(1);
        metrics::histogram!(telemetry::REQUEST_DURATION_SECONDS,
            "model" => self.inner.model().to_owned(),
            "operation" => operation.as_str(),
        )
        .record(elapsed.as_secs_f64());
    }

    fn record_call(
        &self,
        prompt: &str,
        caller: Option<&str>,
        elapsed: Duration,
        output: &C::Output,
    ) {
        let Some(sink) = &self.sink else {
            return;
        };
        let record = CallRecord {
            time: unix_seconds(self.clock.now()),
            duration_seconds: round_millis(elapsed),
            model: self.inner.model().to_owned(),
            caller: caller.map(str::to_owned),
            prompt_preview: truncate_chars(prompt, PROMPT_PREVIEW_CHARS).to_owned(),
            response_length: output.to_text().chars().count(),
        };
        if let Err(e) = sink.record_call(record) {
            warn!(error = %e, "failed to record call profile");
            metrics::counter!(telemetry::SINK_FAILURES_TOTAL).increment(1);
        }
    }
}

#[async_trait]
impl<C: ModelClient> LlmClient for TimingClient<C> {
    type Output = C::Output;

    fn model(&self) -> &str {
        self.inner.model()
    }

    fn temperature(&self) -> f64 {
        self.inner.temperature()
    }

    #[instrument(skip(self, prompt), fields(model = self.inner.model()))]
    async fn call(&self, prompt: &str, caller: Option<&str>) -> Result<C::Output> {
        self.invoke(Operation::Call, prompt, caller).await
    }

    #[instrument(skip(self, prompt), fields(model = self.inner.model()))]
    async fn generate(&self, prompt: &str, caller: Option<&str>) -> Result<C::Output> {
        self.invoke(Operation::Generate, prompt, caller).await
    }
}

fn unix_seconds(at: DateTime<Utc>) -> f64 {
    at.timestamp_micros() as f64 / 1_000_000.0
}

fn round_millis(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 1000.0).round() / 1000.0
}
