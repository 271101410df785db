//! Model clients and the decorators that wrap them.
//!
//! A typical stack, bottom-up:
//!
//! ```text
//! OllamaClient            raw ModelClient (HTTP)
//!   -> TimingClient       retries, latency, call records -> CacheManager
//!     -> CachingClient    prompt de-duplication via CacheManager
//! ```
//!
//! Each layer implements [`LlmClient`](crate::LlmClient), so callers hold
//! whichever layer they need.

pub mod caching;
pub mod ollama;
pub mod timing;
pub mod traits;

pub use caching::CachingClient;
pub use ollama::{Completion, OllamaClient};
pub use timing::{RetryConfig, TimingClient};
pub use traits::{CallSink, ModelClient, ResponseText};
