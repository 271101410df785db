//! Prompt-level de-duplication of model calls.
//!
//! [`CachingClient`] wraps any [`LlmClient`], normally a
//! [`TimingClient`](super::TimingClient). Before each call it asks the
//! [`CacheManager`] for a live response to `(prompt, model, temperature)`.
//!
//! - **Hit**: the cached text is returned as
//!   [`ResponseText::from_cached`]. The wrapped client is not touched, so
//!   there are no retries, no latency metrics, and no call record.
//! - **Miss**: the call is delegated. On success the response's text form is
//!   saved and the original response is returned to the caller unchanged.
//!   Errors pass through untouched and nothing is cached.
//!
//! `call` and `generate` share one key space: both map the same prompt to
//! the same entry. An empty stored response counts as a miss, so a blank
//! answer is never replayed for the rest of the expiry window.
//!
//! Concurrent misses on the same key are not collapsed. Each one calls the
//! model, and the last save wins.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use super::traits::ResponseText;
use crate::{CacheManager, LlmClient, Result};

/// Decorator that serves repeated prompts from the persistent cache.
pub struct CachingClient<C> {
    inner: C,
    cache: Arc<CacheManager>,
}

impl<C: LlmClient> CachingClient<C> {
    /// Wrap `inner`. Keys use `inner.model()` and `inner.temperature()`.
    pub fn new(inner: C, cache: Arc<CacheManager>) -> Self {
        Self { inner, cache }
    }

    /// The wrapped client, for capabilities huginn does not wrap.
    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn into_inner(self) -> C {
        self.inner
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    fn lookup(&self, prompt: &str, caller: Option<&str>) -> Option<C::Output> {
        let text = self
            .cache
            .get_prompt(prompt, self.inner.model(), self.inner.temperature())
            .filter(|text| !text.is_empty())?;
        debug!(caller, "serving cached model response");
        Some(<C::Output as ResponseText>::from_cached(text))
    }

    fn store(&self, prompt: &str, output: &C::Output) {
        self.cache.save_prompt(
            prompt,
            self.inner.model(),
            self.inner.temperature(),
            &output.to_text(),
        );
    }
}

#[async_trait]
impl<C: LlmClient> LlmClient for CachingClient<C> {
    type Output = C::Output;

    fn model(&self) -> &str {
        self.inner.model()
    }

    fn temperature(&self) -> f64 {
        self.inner.temperature()
    }

    #[instrument(skip(self, prompt), fields(model = self.inner.model()))]
    async fn call(&self, prompt: &str, caller: Option<&str>) -> Result<C::Output> {
        if let Some(cached) = self.lookup(prompt, caller) {
            return Ok(cached);
        }
        let output = self.inner.call(prompt, caller).await?;
        self.store(prompt, &output);
        Ok(output)
    }

    #[instrument(skip(self, prompt), fields(model = self.inner.model()))]
    async fn generate(&self, prompt: &str, caller: Option<&str>) -> Result<C::Output> {
        if let Some(cached) = self.lookup(prompt, caller) {
            return Ok(cached);
        }
        let output = self.inner.generate(prompt, caller).await?;
        self.store(prompt, &output);
        Ok(output)
    }
}
