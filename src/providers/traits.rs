//! Traits at the seams between huginn and the outside world.
//!
//! - [`ModelClient`]: the raw "send this prompt to the model" capability
//!   huginn wraps. Implemented by [`OllamaClient`](super::OllamaClient) or by
//!   whatever client the host application already has.
//! - [`ResponseText`]: what a model response must offer so it can be cached.
//! - [`CallSink`]: where the timing layer sends [`CallRecord`]s.
//!
//! # Capability detection
//!
//! `call` is mandatory. `generate` is optional. A client that has a distinct
//! generate endpoint overrides both [`ModelClient::generate`] and
//! [`ModelClient::supports_generate`]. Decorators check the flag and fall back
//! to `call` otherwise, so a call-only client works everywhere.
//!
//! # Example
//!
//! ```ignore
//! struct Echo;
//!
//! #[async_trait]
//! impl ModelClient for Echo {
//!     type Output = String;
//!     fn model(&self) -> &str { "echo" }
//!     fn temperature(&self) -> f64 { 0.0 }
//!     async fn call(&self, prompt: &str) -> Result<String> {
//!         Ok(prompt.to_string())
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::store::CallRecord;
use crate::{HuginnError, Result};

// ============================================================================
// Response text
// ============================================================================

/// A model response that can be stored as text and rebuilt from stored text.
pub trait ResponseText: Send + Sized + 'static {
    /// Text form written to the cache and measured for `response_len`.
    fn to_text(&self) -> String;

    /// Rebuild a response from a cache hit.
    fn from_cached(text: String) -> Self;
}

impl ResponseText for String {
    fn to_text(&self) -> String {
        self.clone()
    }

    fn from_cached(text: String) -> Self {
        text
    }
}

// ============================================================================
// Model client
// ============================================================================

/// Raw model invocation.
///
/// `model()` and `temperature()` describe the sampling setup the client
/// actually uses. The caching layer reads them to build its keys, so they must
/// be accurate.
#[async_trait]
pub trait ModelClient: Send + Sync {
    type Output: ResponseText;

    /// Model identifier, used as the cache namespace.
    fn model(&self) -> &str;

    /// Sampling temperature sent with each request.
    fn temperature(&self) -> f64;

    /// Invoke the model with `prompt`.
    async fn call(&self, prompt: &str) -> Result<Self::Output>;

    /// Whether [`generate`](Self::generate) is a real capability.
    fn supports_generate(&self) -> bool {
        false
    }

    /// Generate-style variant with the same semantics as `call`.
    async fn generate(&self, _prompt: &str) -> Result<Self::Output> {
        Err(HuginnError::NotImplemented("generate"))
    }
}

// ============================================================================
// Call sink
// ============================================================================

/// Receiver for per-call performance records.
///
/// Errors are reported back to the timing layer, which logs them and moves
/// on. A sink can never change the outcome of a model call.
pub trait CallSink: Send + Sync {
    fn record_call(&self, record: CallRecord) -> Result<()>;
}
