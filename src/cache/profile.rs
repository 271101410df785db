//! Aggregates over the `calls` performance log.

use std::collections::BTreeMap;

use crate::store::CallLog;

/// Label used for calls that carried no caller tag.
pub const UNTAGGED_CALLER: &str = "(untagged)";

/// Per-caller call statistics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallerStats {
    pub calls: usize,
    pub total_seconds: f64,
    pub max_seconds: f64,
    pub response_chars: usize,
}

impl CallerStats {
    pub fn mean_seconds(&self) -> f64 {
        if self.calls == 0 {
            0.0
        } else {
            self.total_seconds / self.calls as f64
        }
    }
}

/// Summary of a [`CallLog`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileSummary {
    pub overall: CallerStats,
    pub by_caller: BTreeMap<String, CallerStats>,
    pub by_model: BTreeMap<String, CallerStats>,
}

impl ProfileSummary {
    pub fn from_log(log: &CallLog) -> Self {
        let mut summary = Self::default();
        for record in &log.calls {
            let caller = record.caller.as_deref().unwrap_or(UNTAGGED_CALLER);
            for stats in [
                &mut summary.overall,
                summary.by_caller.entry(caller.to_string()).or_default(),
                summary.by_model.entry(record.model.clone()).or_default(),
            ] {
                stats.calls += 1;
                stats.total_seconds += record.duration_seconds;
                stats.max_seconds = stats.max_seconds.max(record.duration_seconds);
                stats.response_chars += record.response_length;
            }
        }
        summary
    }
}
