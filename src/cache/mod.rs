//! Caching subsystem.
//!
//! - [`CacheManager`]: the persistent, expiry-aware store for per-subject
//!   results and per-prompt responses, plus the performance call log.
//!   Constructed once at startup and shared by `Arc`.
//!
//! - [`key`]: deterministic prompt cache keys.
//!
//! - [`profile`]: aggregates over the call log.

pub mod key;
pub mod manager;
pub mod profile;

pub use key::{prompt_key, truncate_chars};
pub use manager::{CacheConfig, CacheManager, CacheStats};
pub use profile::{CallerStats, ProfileSummary};
