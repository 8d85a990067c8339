//! Core data types shared across the service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Timing and outcome of the most recent run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LastRun {
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
    pub duration_ms: Option<u64>,
}

/// Run coordinator state, exposed through /status
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunState {
    pub running: bool,
    pub want_another_run: bool,
    pub last_run: LastRun,
}

/// Scheduler interval unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleMode {
    Minutes,
    Hours,
}

/// Active schedule; `ms` is always derived from `mode` and `value`
#[derive(Debug, Clone, Default, Serialize)]
pub struct Schedule {
    pub mode: Option<ScheduleMode>,
    pub value: Option<u64>,
    pub ms: Option<u64>,
}

impl Schedule {
    /// Build a schedule with the derived millisecond interval.
    pub fn new(mode: ScheduleMode, value: u64) -> Self {
        let ms = match mode {
            ScheduleMode::Minutes => value * 60 * 1000,
            ScheduleMode::Hours => value * 60 * 60 * 1000,
        };
        Self {
            mode: Some(mode),
            value: Some(value),
            ms: Some(ms),
        }
    }
}

/// Outcome of one HTTP check within a site's check list
#[derive(Debug, Clone, Serialize)]
pub struct CheckItem {
    pub label: String,
    pub url: String,
    pub http: Option<u16>,
    pub content_type: Option<String>,
    pub bytes: Option<u64>,
    pub ok: bool,
    pub note: Option<String>,
}

/// Result of running a site's full check list once
#[derive(Debug, Clone, Serialize)]
pub struct SiteCheckResult {
    pub site: String,
    pub name: String,
    pub base: String,
    pub ok: bool,
    pub items: Vec<CheckItem>,
    pub ts: DateTime<Utc>,
}

/// Attachment classification for a failed test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Trace,
    Screenshot,
    Video,
    File,
}

/// One servable artifact attached to a failure
#[derive(Debug, Clone, Serialize)]
pub struct Attachment {
    pub name: String,
    pub kind: AttachmentKind,
    pub href: String,
}

/// Reconciled metadata describing one failed test
#[derive(Debug, Clone, Serialize)]
pub struct FailureRecord {
    pub title: String,
    pub file: Option<String>,
    pub line: Option<u64>,
    pub project: Option<String>,
    pub error: Option<String>,
    pub attachments: Vec<Attachment>,
}

/// Aggregate outcome counters for a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SummaryCounts {
    pub total: u64,
    pub passed: u64,
    pub failed: u64,
    pub skipped: u64,
    pub flaky: u64,
}

/// Unified failure summary produced by the reconciler
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub summary: SummaryCounts,
    pub failures: Vec<FailureRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_derives_minutes() {
        let s = Schedule::new(ScheduleMode::Minutes, 5);
        assert_eq!(s.ms, Some(300_000));
        assert_eq!(s.value, Some(5));
    }

    #[test]
    fn schedule_derives_hours() {
        let s = Schedule::new(ScheduleMode::Hours, 2);
        assert_eq!(s.ms, Some(7_200_000));
    }

    #[test]
    fn empty_schedule_serializes_nulls() {
        let v = serde_json::to_value(Schedule::default()).unwrap();
        assert!(v["mode"].is_null());
        assert!(v["ms"].is_null());
    }
}
