//! Tests for the persistent cache manager: namespaces, expiry, pruning,
//! persistence, and fail-open behaviour.

use std::fs;
use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use serde_json::Value;
use tempfile::TempDir;

use huginn::{CacheConfig, CacheManager, CallRecord, ManualClock};

// ============================================================================
// Helpers
// ============================================================================

fn start() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 6, 12, 0, 0).unwrap()
}

fn manager_with_clock(dir: &TempDir) -> (CacheManager, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(start()));
    let manager = CacheManager::open(CacheConfig::new(dir.path())).with_clock(clock.clone());
    (manager, clock)
}

fn read_json(path: &std::path::Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

fn record(caller: Option<&str>, duration: f64) -> CallRecord {
    CallRecord {
        time: 1_714_996_800.0,
        duration_seconds: duration,
        model: "ollama/mistral".into(),
        caller: caller.map(str::to_string),
        prompt_preview: "Analyse ACME".into(),
        response_length: 42,
    }
}

// ============================================================================
// final namespace
// ============================================================================

#[test]
fn open_seeds_empty_documents() {
    let dir = TempDir::new().unwrap();
    let manager = CacheManager::open(CacheConfig::new(dir.path().join("nested")));

    let cache = read_json(&manager.config().cache_file());
    assert_eq!(cache["final"], serde_json::json!({}));
    assert_eq!(cache["prompts"], serde_json::json!({}));
    let profile = read_json(&manager.config().profile_file());
    assert_eq!(profile["calls"], serde_json::json!([]));
}

#[test]
fn final_result_round_trip_and_persistence() {
    let dir = TempDir::new().unwrap();
    let (manager, _clock) = manager_with_clock(&dir);

    assert_eq!(manager.get_final("ACME"), None);
    manager.save_final("ACME", "BUY");
    assert_eq!(manager.get_final("ACME").as_deref(), Some("BUY"));

    let on_disk = read_json(&manager.config().cache_file());
    assert_eq!(on_disk["final"]["ACME"]["result"], "BUY");
    assert_eq!(
        on_disk["final"]["ACME"]["saved_at"],
        "2024-05-06T12:00:00.000000Z"
    );

    // A fresh manager (a new process) sees the same entry.
    let clock = Arc::new(ManualClock::new(start() + Duration::hours(1)));
    let reopened = CacheManager::open(CacheConfig::new(dir.path())).with_clock(clock);
    assert_eq!(reopened.get_final("ACME").as_deref(), Some("BUY"));
}

#[test]
fn later_save_overwrites_earlier() {
    let dir = TempDir::new().unwrap();
    let (manager, _clock) = manager_with_clock(&dir);

    manager.save_final("ACME", "BUY");
    manager.save_final("ACME", "SELL");
    assert_eq!(manager.get_final("ACME").as_deref(), Some("SELL"));
}

#[test]
fn final_entry_expires_at_window_boundary() {
    let dir = TempDir::new().unwrap();
    let (manager, clock) = manager_with_clock(&dir);
    manager.save_final("ACME", "BUY");

    clock.advance(Duration::hours(24) - Duration::seconds(1));
    assert_eq!(manager.get_final("ACME").as_deref(), Some("BUY"));

    clock.advance(Duration::seconds(1));
    assert_eq!(manager.get_final("ACME"), None);
}

#[test]
fn custom_expiry_window() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(start()));
    let manager = CacheManager::open(CacheConfig::new(dir.path()).expiry_hours(1))
        .with_clock(clock.clone());

    manager.save_final("ACME", "BUY");
    clock.advance(Duration::minutes(59));
    assert!(manager.get_final("ACME").is_some());
    clock.advance(Duration::minutes(1));
    assert!(manager.get_final("ACME").is_none());
}

// ============================================================================
// prompts namespace
// ============================================================================

#[test]
fn prompt_response_round_trip() {
    let dir = TempDir::new().unwrap();
    let (manager, _clock) = manager_with_clock(&dir);

    assert_eq!(manager.get_prompt("p", "m", 0.2), None);
    manager.save_prompt("p", "m", 0.2, "r");
    assert_eq!(manager.get_prompt("p", "m", 0.2).as_deref(), Some("r"));
}

#[test]
fn prompt_key_covers_model_and_temperature() {
    let dir = TempDir::new().unwrap();
    let (manager, _clock) = manager_with_clock(&dir);

    manager.save_prompt("p", "ollama/mistral", 0.2, "r");
    assert!(manager.get_prompt("p", "ollama/llama3", 0.2).is_none());
    assert!(manager.get_prompt("p", "ollama/mistral", 0.7).is_none());
    assert!(manager.get_prompt("p ", "ollama/mistral", 0.2).is_none());
}

#[test]
fn stored_prompt_is_truncated_but_key_uses_full_prompt() {
    let dir = TempDir::new().unwrap();
    let (manager, _clock) = manager_with_clock(&dir);

    let long_a = format!("{}A", "x".repeat(600));
    let long_b = format!("{}B", "x".repeat(600));
    manager.save_prompt(&long_a, "m", 0.0, "first");

    assert_eq!(manager.get_prompt(&long_a, "m", 0.0).as_deref(), Some("first"));
    // Same first 500 characters, different prompt: still a miss.
    assert!(manager.get_prompt(&long_b, "m", 0.0).is_none());

    let on_disk = read_json(&manager.config().cache_file());
    let entries = on_disk["prompts"].as_object().unwrap();
    assert_eq!(entries.len(), 1);
    let entry = entries.values().next().unwrap();
    assert_eq!(entry["prompt"].as_str().unwrap().chars().count(), 500);
    assert_eq!(entry["model"], "m");
    assert_eq!(entry["temperature"], 0.0);
}

#[test]
fn huge_expiry_keeps_entries_live() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(start()));
    let manager = CacheManager::open(CacheConfig::new(dir.path()).expiry_hours(u64::MAX))
        .with_clock(clock.clone());

    manager.save_final("ACME", "BUY");
    clock.advance(Duration::days(365 * 50));
    assert_eq!(manager.get_final("ACME").as_deref(), Some("BUY"));
}

#[test]
fn prompt_entry_expires() {
    let dir = TempDir::new().unwrap();
    let (manager, clock) = manager_with_clock(&dir);

    manager.save_prompt("p", "m", 0.2, "r");
    clock.advance(Duration::hours(25));
    assert!(manager.get_prompt("p", "m", 0.2).is_none());
}

// ============================================================================
// Legacy and damaged documents
// ============================================================================

#[test]
fn entry_without_timestamp_is_expired() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("cache.json"),
        r#"{"final": {"ACME": {"result": "BUY"}}}"#,
    )
    .unwrap();

    let (manager, _clock) = manager_with_clock(&dir);
    assert_eq!(manager.get_final("ACME"), None);
}

#[test]
fn naive_timestamps_from_older_files_are_honoured() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("cache.json"),
        r#"{"final": {"ACME": {"result": "HOLD", "saved_at": "2024-05-06T11:00:00.250000"}}, "prompts": {}}"#,
    )
    .unwrap();

    let (manager, _clock) = manager_with_clock(&dir);
    assert_eq!(manager.get_final("ACME").as_deref(), Some("HOLD"));
}

#[test]
fn corrupt_cache_file_fails_open() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("cache.json"), "{ this is not json").unwrap();

    let (manager, _clock) = manager_with_clock(&dir);
    assert_eq!(manager.get_final("ACME"), None);

    // The next save replaces the damaged document.
    manager.save_final("ACME", "BUY");
    assert_eq!(manager.get_final("ACME").as_deref(), Some("BUY"));
    let on_disk = read_json(&manager.config().cache_file());
    assert_eq!(on_disk["final"]["ACME"]["result"], "BUY");
}

#[test]
fn unwritable_cache_dir_never_raises() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("not-a-dir");
    fs::write(&blocker, "file in the way").unwrap();

    let manager = CacheManager::open(CacheConfig::new(blocker.join("cache")));
    manager.save_final("ACME", "BUY");
    manager.save_prompt("p", "m", 0.2, "r");
    manager.log_call(record(None, 1.0));

    assert_eq!(manager.get_final("ACME"), None);
    assert_eq!(manager.get_prompt("p", "m", 0.2), None);
    assert!(manager.call_log().calls.is_empty());
    assert!(manager.prune().is_err());
}

// ============================================================================
// Pruning
// ============================================================================

#[test]
fn oversized_cache_prunes_expired_entries_on_write() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(start()));
    let manager = CacheManager::open(CacheConfig::new(dir.path()).max_size_bytes(0))
        .with_clock(clock.clone());

    manager.save_final("OLD", "stale");
    manager.save_prompt("old prompt", "m", 0.2, "stale");
    clock.advance(Duration::hours(30));
    manager.save_final("NEW", "fresh");

    let on_disk = read_json(&manager.config().cache_file());
    let finals = on_disk["final"].as_object().unwrap();
    assert!(finals.contains_key("NEW"));
    assert!(!finals.contains_key("OLD"));
    assert!(on_disk["prompts"].as_object().unwrap().is_empty());
}

#[test]
fn cache_under_limit_keeps_expired_entries() {
    let dir = TempDir::new().unwrap();
    let (manager, clock) = manager_with_clock(&dir);

    manager.save_final("OLD", "stale");
    clock.advance(Duration::hours(30));
    manager.save_final("NEW", "fresh");

    let on_disk = read_json(&manager.config().cache_file());
    assert!(on_disk["final"].as_object().unwrap().contains_key("OLD"));
    // Still invisible to lookups.
    assert_eq!(manager.get_final("OLD"), None);
}

#[test]
fn explicit_prune_reports_removed_entries() {
    let dir = TempDir::new().unwrap();
    let (manager, clock) = manager_with_clock(&dir);

    manager.save_final("OLD", "stale");
    manager.save_prompt("p1", "m", 0.2, "stale");
    manager.save_prompt("p2", "m", 0.2, "stale");
    clock.advance(Duration::hours(25));
    manager.save_final("NEW", "fresh");

    let report = manager.prune().unwrap();
    assert_eq!(report.final_removed, 1);
    assert_eq!(report.prompts_removed, 2);
    assert_eq!(report.total(), 3);

    let stats = manager.stats();
    assert_eq!(stats.final_entries, 1);
    assert_eq!(stats.prompt_entries, 0);
}

// ============================================================================
// Call log
// ============================================================================

#[test]
fn call_log_appends_and_persists() {
    let dir = TempDir::new().unwrap();
    let (manager, _clock) = manager_with_clock(&dir);

    manager.log_call(record(Some("research"), 1.5));
    manager.log_call(record(None, 0.5));

    let log = manager.call_log();
    assert_eq!(log.calls.len(), 2);
    assert_eq!(log.calls[0].caller.as_deref(), Some("research"));

    let on_disk = read_json(&manager.config().profile_file());
    let calls = on_disk["calls"].as_array().unwrap();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0]["duration_s"], 1.5);
    assert_eq!(calls[0]["response_len"], 42);
    assert_eq!(calls[0]["caller"], "research");
    assert_eq!(calls[1]["caller"], Value::Null);
}

#[test]
fn profile_summary_groups_by_caller() {
    let dir = TempDir::new().unwrap();
    let (manager, _clock) = manager_with_clock(&dir);

    manager.log_call(record(Some("research"), 1.0));
    manager.log_call(record(Some("research"), 3.0));
    manager.log_call(record(Some("summary"), 2.0));

    let summary = manager.profile_summary();
    assert_eq!(summary.overall.calls, 3);
    assert_eq!(summary.overall.total_seconds, 6.0);
    let research = &summary.by_caller["research"];
    assert_eq!(research.calls, 2);
    assert_eq!(research.mean_seconds(), 2.0);
    assert_eq!(research.max_seconds, 3.0);
}

// ============================================================================
// Maintenance
// ============================================================================

#[test]
fn clear_keeps_call_log() {
    let dir = TempDir::new().unwrap();
    let (manager, _clock) = manager_with_clock(&dir);

    manager.save_final("ACME", "BUY");
    manager.save_prompt("p", "m", 0.2, "r");
    manager.log_call(record(None, 1.0));

    manager.clear().unwrap();
    assert_eq!(manager.get_final("ACME"), None);
    assert_eq!(manager.get_prompt("p", "m", 0.2), None);
    assert_eq!(manager.call_log().calls.len(), 1);
}

#[test]
fn stats_counts_live_and_total_entries() {
    let dir = TempDir::new().unwrap();
    let (manager, clock) = manager_with_clock(&dir);

    manager.save_final("OLD", "stale");
    clock.advance(Duration::hours(25));
    manager.save_final("NEW", "fresh");
    manager.save_prompt("p", "m", 0.2, "r");
    manager.log_call(record(None, 1.0));

    let stats = manager.stats();
    assert_eq!(stats.final_entries, 2);
    assert_eq!(stats.live_final_entries, 1);
    assert_eq!(stats.prompt_entries, 1);
    assert_eq!(stats.live_prompt_entries, 1);
    assert_eq!(stats.logged_calls, 1);
    assert!(stats.size_bytes > 0);
}

#[test]
fn reload_picks_up_writes_from_another_manager() {
    let dir = TempDir::new().unwrap();
    let (first, _c1) = manager_with_clock(&dir);
    let (second, _c2) = manager_with_clock(&dir);

    assert_eq!(first.get_final("ACME"), None);
    second.save_final("ACME", "BUY");

    // The first manager still serves its in-memory copy.
    assert_eq!(first.get_final("ACME"), None);
    first.reload();
    assert_eq!(first.get_final("ACME").as_deref(), Some("BUY"));
}

#[test]
fn flush_rewrites_loaded_documents() {
    let dir = TempDir::new().unwrap();
    let (manager, _clock) = manager_with_clock(&dir);
    manager.save_final("ACME", "BUY");

    fs::remove_file(manager.config().cache_file()).unwrap();
    manager.flush().unwrap();
    let on_disk = read_json(&manager.config().cache_file());
    assert_eq!(on_disk["final"]["ACME"]["result"], "BUY");
}

#[test]
fn concurrent_saves_are_not_lost() {
    let dir = TempDir::new().unwrap();
    let manager = Arc::new(CacheManager::open(CacheConfig::new(dir.path())));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let manager = manager.clone();
            std::thread::spawn(move || {
                for j in 0..5 {
                    manager.save_final(&format!("S{i}-{j}"), "ok");
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(manager.stats().final_entries, 40);
    manager.reload();
    assert_eq!(manager.stats().final_entries, 40);
}
