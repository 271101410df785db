//! Persistent prompt/result cache with expiry, size-bounded pruning, and a
//! performance log.
//!
//! [`CacheManager`] is the only component that touches the cache directory.
//! It owns two documents (see [`store`](crate::store)):
//!
//! - `cache.json`: `final` results and `prompts` responses, expiry-managed.
//! - `profile.json`: the append-only `calls` log.
//!
//! # Read-through and write path
//!
//! Each document is read from disk once, on first access, and kept in memory.
//! Every mutation clones the in-memory copy, applies the change, and rewrites
//! the whole document. The in-memory copy is replaced only after the write
//! succeeds. Before each `cache.json` write, if the file on disk is larger
//! than [`CacheConfig::max_size_bytes`], expired entries are dropped from the
//! document being written.
//!
//! # Failure policy
//!
//! Lookups and saves never return errors. A corrupt or unreadable document
//! loads as empty. A failed write leaves the previous state in place. Both are
//! logged and counted in [`STORE_ERRORS_TOTAL`](crate::telemetry::STORE_ERRORS_TOTAL).
//! A cold cache is always preferable to a failed pipeline. Maintenance
//! operations ([`prune`](CacheManager::prune), [`clear`](CacheManager::clear),
//! [`flush`](CacheManager::flush)) do report errors, since an operator asked
//! for them explicitly.
//!
//! # Concurrency
//!
//! Each document sits behind its own mutex, held for the full
//! read-modify-write. Concurrent writers in one process are serialised and
//! never lose each other's updates. Writers in separate processes still race,
//! and the last one wins; call [`reload`](CacheManager::reload) to pick up
//! their changes.
//!
//! All file access is synchronous `std::fs`. From async code the read and the
//! whole-document rewrite block the calling worker thread while the mutex is
//! held, so writes cost time proportional to the document size (at most
//! [`CacheConfig::max_size_bytes`] plus whatever arrives before the next prune).

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::key::{STORED_PROMPT_CHARS, prompt_key, truncate_chars};
use super::profile::ProfileSummary;
use crate::clock::{Clock, SystemClock};
use crate::providers::traits::CallSink;
use crate::store::{
    self, CacheDocument, CallLog, CallRecord, FinalEntry, PromptEntry, PruneReport,
    format_timestamp,
};
use crate::{HuginnError, Result, telemetry};

const CACHE_FILE: &str = "cache.json";
const PROFILE_FILE: &str = "profile.json";
const BYTES_PER_MB: u64 = 1024 * 1024;

/// Configuration for the persistent cache.
///
/// ```rust
/// # use huginn::CacheConfig;
/// let config = CacheConfig::new(".cache")
///     .expiry_hours(12)
///     .max_size_mb(50);
/// assert_eq!(config.cache_file(), std::path::Path::new(".cache/cache.json"));
/// ```
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Directory holding `cache.json` and `profile.json`. Default: `.cache`.
    pub dir: PathBuf,
    /// Liveness window for `final` and `prompts` entries. Default: 24 hours.
    pub expiry: Duration,
    /// On-disk size of `cache.json` above which the next write prunes
    /// expired entries. Default: 100 MB.
    pub max_size_bytes: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".cache"),
            expiry: Duration::from_secs(24 * 3600),
            max_size_bytes: 100 * BYTES_PER_MB,
        }
    }
}

impl CacheConfig {
    /// Create a config rooted at `dir`, other values defaulted.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Self::default()
        }
    }

    /// Set the liveness window.
    pub fn expiry(mut self, expiry: Duration) -> Self {
        self.expiry = expiry;
        self
    }

    /// Set the liveness window in hours. Saturates instead of overflowing.
    pub fn expiry_hours(self, hours: u64) -> Self {
        self.expiry(Duration::from_secs(hours.saturating_mul(3600)))
    }

    /// Set the pruning threshold in bytes.
    pub fn max_size_bytes(mut self, bytes: u64) -> Self {
        self.max_size_bytes = bytes;
        self
    }

    /// Set the pruning threshold in megabytes.
    pub fn max_size_mb(self, mb: u64) -> Self {
        self.max_size_bytes(mb.saturating_mul(BYTES_PER_MB))
    }

    /// Path of the `final`/`prompts` document.
    pub fn cache_file(&self) -> PathBuf {
        self.dir.join(CACHE_FILE)
    }

    /// Path of the `calls` document.
    pub fn profile_file(&self) -> PathBuf {
        self.dir.join(PROFILE_FILE)
    }
}

/// Snapshot of cache contents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub final_entries: usize,
    pub live_final_entries: usize,
    pub prompt_entries: usize,
    pub live_prompt_entries: usize,
    pub logged_calls: usize,
    /// Size of `cache.json` on disk.
    pub size_bytes: u64,
}

/// Sole gateway to the on-disk cache. See the module docs.
pub struct CacheManager {
    config: CacheConfig,
    window: chrono::Duration,
    clock: Arc<dyn Clock>,
    cache: Mutex<Option<CacheDocument>>,
    calls: Mutex<Option<CallLog>>,
}

impl CacheManager {
    /// Open the cache, creating the directory and empty documents if absent.
    ///
    /// Never fails: setup problems are logged and surface later as cache
    /// misses.
    pub fn open(config: CacheConfig) -> Self {
        let window = chrono::Duration::from_std(config.expiry).unwrap_or(chrono::Duration::MAX);
        let manager = Self {
            config,
            window,
            clock: Arc::new(SystemClock),
            cache: Mutex::new(None),
            calls: Mutex::new(None),
        };
        if let Err(e) = seed(&manager.config.cache_file(), &CacheDocument::default()) {
            store_error("init", &e);
        }
        if let Err(e) = seed(&manager.config.profile_file(), &CallLog::default()) {
            store_error("init", &e);
        }
        manager
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    // ===== final namespace =====

    /// Live result for `subject`, or `None` on miss, expiry, or store failure.
    pub fn get_final(&self, subject: &str) -> Option<String> {
        let now = self.clock.now();
        let mut slot = lock(&self.cache);
        let hit = self
            .cache_doc(&mut slot)
            .live_final(subject, now, self.window)
            .map(str::to_owned);
        record_lookup("final", hit.is_some());
        if hit.is_some() {
            debug!(subject, "final result cache hit");
        }
        hit
    }

    /// Store `result` for `subject`, stamped now.
    pub fn save_final(&self, subject: &str, result: &str) {
        let entry = FinalEntry {
            result: Some(result.to_owned()),
            saved_at: Some(format_timestamp(self.clock.now())),
        };
        self.update_cache("save_final", |doc| {
            doc.finals.insert(subject.to_owned(), entry);
        });
    }

    // ===== prompts namespace =====

    /// Live response for the triple, or `None` on miss, expiry, or store failure.
    pub fn get_prompt(&self, prompt: &str, model: &str, temperature: f64) -> Option<String> {
        let key = prompt_key(prompt, model, temperature);
        let now = self.clock.now();
        let mut slot = lock(&self.cache);
        let hit = self
            .cache_doc(&mut slot)
            .live_prompt(&key, now, self.window)
            .map(str::to_owned);
        record_lookup("prompts", hit.is_some());
        debug!(key = &key[..12], model, hit = hit.is_some(), "prompt cache lookup");
        hit
    }

    /// Store `response` for the triple. Only the first
    /// [`STORED_PROMPT_CHARS`] characters of the prompt are kept on disk.
    pub fn save_prompt(&self, prompt: &str, model: &str, temperature: f64, response: &str) {
        let key = prompt_key(prompt, model, temperature);
        let entry = PromptEntry {
            model: model.to_owned(),
            temperature,
            prompt: truncate_chars(prompt, STORED_PROMPT_CHARS).to_owned(),
            response: Some(response.to_owned()),
            saved_at: Some(format_timestamp(self.clock.now())),
        };
        self.update_cache("save_prompt", |doc| {
            doc.prompts.insert(key, entry);
        });
    }

    // ===== calls log =====

    /// Append `record` to the performance log. Failures are logged, never raised.
    pub fn log_call(&self, record: CallRecord) {
        let mut slot = lock(&self.calls);
        let mut log = self.call_doc(&mut slot).clone();
        log.calls.push(record);
        match store::write_document(&self.config.profile_file(), &log) {
            Ok(()) => *slot = Some(log),
            Err(e) => store_error("log_call", &e),
        }
    }

    /// Copy of the performance log.
    pub fn call_log(&self) -> CallLog {
        let mut slot = lock(&self.calls);
        self.call_doc(&mut slot).clone()
    }

    /// Aggregated view of the performance log.
    pub fn profile_summary(&self) -> ProfileSummary {
        let mut slot = lock(&self.calls);
        ProfileSummary::from_log(self.call_doc(&mut slot))
    }

    // ===== maintenance =====

    /// Drop every expired `final`/`prompts` entry now, regardless of size.
    pub fn prune(&self) -> Result<PruneReport> {
        let now = self.clock.now();
        let mut slot = lock(&self.cache);
        let mut doc = self.cache_doc(&mut slot).clone();
        let report = doc.prune(now, self.window);
        store::write_document(&self.config.cache_file(), &doc)?;
        *slot = Some(doc);
        info!(
            final_removed = report.final_removed,
            prompts_removed = report.prompts_removed,
            "pruned expired cache entries"
        );
        Ok(report)
    }

    /// Remove all `final` and `prompts` entries. The call log is kept.
    pub fn clear(&self) -> Result<()> {
        let mut slot = lock(&self.cache);
        let doc = CacheDocument::default();
        store::write_document(&self.config.cache_file(), &doc)?;
        *slot = Some(doc);
        Ok(())
    }

    /// Entry counts and on-disk size.
    pub fn stats(&self) -> CacheStats {
        let now = self.clock.now();
        let size_bytes = store::file_size(&self.config.cache_file()).unwrap_or(0);
        let logged_calls = {
            let mut slot = lock(&self.calls);
            self.call_doc(&mut slot).calls.len()
        };
        let mut slot = lock(&self.cache);
        let doc = self.cache_doc(&mut slot);
        let (live_final_entries, live_prompt_entries) = doc.live_counts(now, self.window);
        CacheStats {
            final_entries: doc.finals.len(),
            live_final_entries,
            prompt_entries: doc.prompts.len(),
            live_prompt_entries,
            logged_calls,
            size_bytes,
        }
    }

    /// Forget the in-memory copies; the next access re-reads disk.
    pub fn reload(&self) {
        *lock(&self.cache) = None;
        *lock(&self.calls) = None;
    }

    /// Rewrite whichever documents are loaded. Call at shutdown.
    pub fn flush(&self) -> Result<()> {
        let cache_result = match lock(&self.cache).as_ref() {
            Some(doc) => store::write_document(&self.config.cache_file(), doc),
            None => Ok(()),
        };
        let calls_result = match lock(&self.calls).as_ref() {
            Some(log) => store::write_document(&self.config.profile_file(), log),
            None => Ok(()),
        };
        cache_result.and(calls_result)
    }

    // ===== internals =====

    fn cache_doc<'a>(&self, slot: &'a mut Option<CacheDocument>) -> &'a mut CacheDocument {
        slot.get_or_insert_with(|| load_or_default(&self.config.cache_file(), "load_cache"))
    }

    fn call_doc<'a>(&self, slot: &'a mut Option<CallLog>) -> &'a mut CallLog {
        slot.get_or_insert_with(|| load_or_default(&self.config.profile_file(), "load_calls"))
    }

    fn update_cache(&self, operation: &'static str, mutate: impl FnOnce(&mut CacheDocument)) {
        let mut slot = lock(&self.cache);
        let mut doc = self.cache_doc(&mut slot).clone();
        mutate(&mut doc);
        self.prune_if_oversized(&mut doc);
        match store::write_document(&self.config.cache_file(), &doc) {
            Ok(()) => *slot = Some(doc),
            Err(e) => store_error(operation, &e),
        }
    }

    fn prune_if_oversized(&self, doc: &mut CacheDocument) {
        let size = match store::file_size(&self.config.cache_file()) {
            Ok(size) => size,
            Err(e) => {
                store_error("size_check", &e);
                return;
            }
        };
        if size <= self.config.max_size_bytes {
            return;
        }
        let report = doc.prune(self.clock.now(), self.window);
        info!(
            size_bytes = size,
            limit_bytes = self.config.max_size_bytes,
            final_removed = report.final_removed,
            prompts_removed = report.prompts_removed,
            "cache over size limit, pruned expired entries"
        );
    }
}

impl CallSink for CacheManager {
    fn record_call(&self, record: CallRecord) -> Result<()> {
        self.log_call(record);
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn seed<T: Serialize>(path: &Path, empty: &T) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    store::write_document(path, empty)
}

fn load_or_default<T>(path: &Path, operation: &'static str) -> T
where
    T: serde::de::DeserializeOwned + Default,
{
    store::read_document(path).unwrap_or_else(|e| {
        store_error(operation, &e);
        T::default()
    })
}

fn store_error(operation: &'static str, error: &HuginnError) {
    warn!(operation, error = %error, "cache store failure, continuing with cold cache");
    metrics::counter!(telemetry::STORE_ERRORS_TOTAL, "operation" => operation).increment(1);
}

fn record_lookup(namespace: &'static str, hit: bool) {
    let name = if hit {
        telemetry::CACHE_HITS_TOTAL
    } else {
        telemetry::CACHE_MISSES_TOTAL
    };
    metrics::counter!(name, "namespace" => namespace).increment(1);
}
