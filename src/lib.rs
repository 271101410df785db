//! Huginn - prompt-response caching and call instrumentation for LLM pipelines
//!
//! Huginn sits between an agent runtime and a model client. It provides:
//!
//! - a persistent cache of final per-subject results and of individual
//!   prompt responses, with time-based expiry ([`CacheManager`]);
//! - a timing decorator that retries failed calls with exponential backoff
//!   and records one [`CallRecord`] per successful call ([`TimingClient`]);
//! - a caching decorator that serves repeated prompts without touching the
//!   model ([`CachingClient`]).
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use huginn::{CacheConfig, CacheManager, CachingClient, LlmClient, OllamaClient,
//!     RetryConfig, TimingClient};
//!
//! #[tokio::main]
//! async fn main() -> huginn::Result<()> {
//!     let cache = Arc::new(CacheManager::open(CacheConfig::new(".cache")));
//!
//!     let model = OllamaClient::new("ollama/mistral", 0.2);
//!     let timed = TimingClient::new(model, RetryConfig::default()).with_sink(cache.clone());
//!     let client = CachingClient::new(timed, cache.clone());
//!
//!     let answer = client.call("Summarise ACME's last quarter.", Some("summary")).await?;
//!     println!("{answer}");
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod providers;
pub mod research;
pub mod store;
pub mod telemetry;
pub mod traits;

// Re-export main types at crate root
pub use cache::{CacheConfig, CacheManager, CacheStats, CallerStats, ProfileSummary};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::{HuginnError, Result};
pub use providers::{
    CachingClient, CallSink, Completion, ModelClient, OllamaClient, ResponseText, RetryConfig,
    TimingClient,
};
pub use research::{Analysis, ResearchPipeline, ResearchRunner, SubjectReport, validate_subject};
pub use store::{CallLog, CallRecord, PruneReport};
pub use traits::LlmClient;
