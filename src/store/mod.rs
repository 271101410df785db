//! On-disk document model.
//!
//! Two JSON documents live in the cache directory:
//!
//! - `cache.json`: [`CacheDocument`] with the `final` (per-subject results)
//!   and `prompts` (per-prompt responses) namespaces. Both are subject to
//!   expiry and pruning.
//! - `profile.json`: [`CallLog`], the append-only `calls` performance log.
//!   Never pruned.
//!
//! The field names and timestamp format match files written by earlier
//! versions of the pipeline, so existing caches stay readable.
//!
//! # Liveness
//!
//! An entry is live iff `now - saved_at < window`. Missing or unparseable
//! timestamps are never live: a record we cannot date is treated as absent.

mod file;

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

pub(crate) use file::{file_size, read_document, write_document};

/// The `cache.json` document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheDocument {
    /// Final per-subject results, keyed by subject (e.g. a ticker).
    #[serde(rename = "final", default)]
    pub finals: BTreeMap<String, FinalEntry>,
    /// Prompt responses, keyed by [`prompt_key`](crate::cache::prompt_key).
    #[serde(default)]
    pub prompts: BTreeMap<String, PromptEntry>,
}

/// A stored per-subject result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalEntry {
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub saved_at: Option<String>,
}

/// A stored prompt response.
///
/// `prompt` is a truncated audit copy; lookups go through the hashed key,
/// which is derived from the full prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptEntry {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub temperature: f64,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub saved_at: Option<String>,
}

/// Outcome of a pruning pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub final_removed: usize,
    pub prompts_removed: usize,
}

impl PruneReport {
    pub fn total(&self) -> usize {
        self.final_removed + self.prompts_removed
    }
}

impl CacheDocument {
    /// Live result for `subject`, if any.
    pub fn live_final(&self, subject: &str, now: DateTime<Utc>, window: Duration) -> Option<&str> {
        self.finals
            .get(subject)
            .filter(|e| is_live(e.saved_at.as_deref(), now, window))
            .and_then(|e| e.result.as_deref())
    }

    /// Live response stored under `key`, if any.
    pub fn live_prompt(&self, key: &str, now: DateTime<Utc>, window: Duration) -> Option<&str> {
        self.prompts
            .get(key)
            .filter(|e| is_live(e.saved_at.as_deref(), now, window))
            .and_then(|e| e.response.as_deref())
    }

    /// Drop every non-live entry from `final` and `prompts`.
    pub fn prune(&mut self, now: DateTime<Utc>, window: Duration) -> PruneReport {
        let finals_before = self.finals.len();
        let prompts_before = self.prompts.len();

        self.finals
            .retain(|_, e| is_live(e.saved_at.as_deref(), now, window));
        self.prompts
            .retain(|_, e| is_live(e.saved_at.as_deref(), now, window));

        PruneReport {
            final_removed: finals_before - self.finals.len(),
            prompts_removed: prompts_before - self.prompts.len(),
        }
    }

    /// Number of live entries in `(final, prompts)`.
    pub fn live_counts(&self, now: DateTime<Utc>, window: Duration) -> (usize, usize) {
        let finals = self
            .finals
            .values()
            .filter(|e| is_live(e.saved_at.as_deref(), now, window))
            .count();
        let prompts = self
            .prompts
            .values()
            .filter(|e| is_live(e.saved_at.as_deref(), now, window))
            .count();
        (finals, prompts)
    }
}

/// The `profile.json` document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallLog {
    #[serde(default)]
    pub calls: Vec<CallRecord>,
}

/// One successful model invocation, as observed by the timing layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    /// Unix timestamp (seconds) when the call finished.
    pub time: f64,
    /// Wall-clock duration, retries and backoff included.
    #[serde(rename = "duration_s")]
    pub duration_seconds: f64,
    pub model: String,
    /// Pipeline stage that issued the call.
    #[serde(default)]
    pub caller: Option<String>,
    pub prompt_preview: String,
    #[serde(rename = "response_len")]
    pub response_length: usize,
}

/// Whether an entry stamped `saved_at` is still live at `now`.
pub fn is_live(saved_at: Option<&str>, now: DateTime<Utc>, window: Duration) -> bool {
    saved_at
        .and_then(parse_timestamp)
        .is_some_and(|saved| now - saved < window)
}

/// Render a timestamp as ISO-8601 UTC with microseconds and a `Z` suffix.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// Parse an ISO-8601 timestamp.
///
/// Accepts RFC 3339 (`Z` or numeric offset) and naive timestamps, which are
/// taken to be UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
