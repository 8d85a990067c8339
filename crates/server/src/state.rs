//! Shared service state
//!
//! One `AppState` instance owns everything mutable: the run slot, the log
//! buffer, the schedule, and per-site check history. Components hold it via
//! `Arc` instead of reaching for process-wide globals.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::watch;

use testwatch_common::{
    LastRun, LogBuffer, RunState, Schedule, SiteCheckResult, SiteConfig, WatchConfig,
};

/// Maximum retained entries in a site's rolling check log.
pub const SITE_LOG_CAP: usize = 30;

/// Process state shared across the HTTP surface and the orchestration engine.
pub struct AppState {
    pub config: WatchConfig,

    /// Rolling tail of the most recent run output
    pub log: Arc<LogBuffer>,

    run: Mutex<RunState>,
    schedule: RwLock<Schedule>,

    /// Latest check result per site
    site_current: RwLock<HashMap<String, SiteCheckResult>>,
    /// Rolling check history per site, newest last
    site_history: RwLock<HashMap<String, VecDeque<SiteCheckResult>>>,

    /// Pulses true at run start and false at run end
    running_tx: watch::Sender<bool>,
}

impl AppState {
    pub fn new(config: WatchConfig) -> Arc<Self> {
        let (running_tx, _) = watch::channel(false);
        Arc::new(Self {
            config,
            log: Arc::new(LogBuffer::new()),
            run: Mutex::new(RunState::default()),
            schedule: RwLock::new(Schedule::default()),
            site_current: RwLock::new(HashMap::new()),
            site_history: RwLock::new(HashMap::new()),
            running_tx,
        })
    }

    /// Look up a configured site by key.
    pub fn site(&self, key: &str) -> Option<SiteConfig> {
        self.config.sites.iter().find(|s| s.key == key).cloned()
    }

    pub fn run_state(&self) -> RunState {
        self.run.lock().clone()
    }

    pub fn schedule_snapshot(&self) -> Schedule {
        self.schedule.read().clone()
    }

    pub fn set_schedule(&self, schedule: Schedule) {
        *self.schedule.write() = schedule;
    }

    /// Claim the single run slot.
    ///
    /// Returns false and flags a coalesced re-run when a run is already
    /// active; the flag is consumed exactly once by `take_rerun_flag`.
    pub fn begin_run(&self, started_at: DateTime<Utc>) -> bool {
        let mut run = self.run.lock();
        if run.running {
            run.want_another_run = true;
            return false;
        }
        run.running = true;
        run.want_another_run = false;
        run.last_run = LastRun {
            started_at: Some(started_at),
            ended_at: None,
            exit_code: None,
            duration_ms: None,
        };
        self.running_tx.send_replace(true);
        true
    }

    /// Release the run slot and record the outcome.
    pub fn finish_run(&self, ended_at: DateTime<Utc>, exit_code: Option<i32>, duration_ms: u64) {
        let mut run = self.run.lock();
        run.running = false;
        run.last_run.ended_at = Some(ended_at);
        run.last_run.exit_code = exit_code;
        run.last_run.duration_ms = Some(duration_ms);
        self.running_tx.send_replace(false);
    }

    /// Consume the coalesced-rerun flag.
    pub fn take_rerun_flag(&self) -> bool {
        let mut run = self.run.lock();
        std::mem::take(&mut run.want_another_run)
    }

    /// Observe run-slot activity; used by the scheduler to re-arm after a
    /// triggered run completes.
    pub fn subscribe_running(&self) -> watch::Receiver<bool> {
        self.running_tx.subscribe()
    }

    /// Record a completed site check: replace the snapshot and append to the
    /// rolling history, evicting the oldest entry past the cap.
    pub fn record_site_result(&self, result: SiteCheckResult) {
        {
            let mut history = self.site_history.write();
            let log = history.entry(result.site.clone()).or_default();
            log.push_back(result.clone());
            while log.len() > SITE_LOG_CAP {
                log.pop_front();
            }
        }
        self.site_current.write().insert(result.site.clone(), result);
    }

    pub fn site_status(&self, key: &str) -> Option<SiteCheckResult> {
        self.site_current.read().get(key).cloned()
    }

    pub fn site_logs(&self, key: &str) -> Vec<SiteCheckResult> {
        self.site_history
            .read()
            .get(key)
            .map(|l| l.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use testwatch_common::CheckItem;

    fn sample_result(site: &str, seq: u64) -> SiteCheckResult {
        SiteCheckResult {
            site: site.to_string(),
            name: site.to_string(),
            base: format!("https://{}.example.com", site),
            ok: true,
            items: vec![CheckItem {
                label: format!("check {}", seq),
                url: String::new(),
                http: Some(200),
                content_type: None,
                bytes: None,
                ok: true,
                note: None,
            }],
            ts: Utc::now(),
        }
    }

    #[test]
    fn run_slot_is_exclusive_and_coalesces() {
        let state = AppState::new(WatchConfig::default());

        assert!(state.begin_run(Utc::now()));
        // every extra trigger while running flags exactly one re-run
        assert!(!state.begin_run(Utc::now()));
        assert!(!state.begin_run(Utc::now()));
        assert!(state.run_state().running);
        assert!(state.run_state().want_another_run);

        state.finish_run(Utc::now(), Some(0), 1200);
        let run = state.run_state();
        assert!(!run.running);
        assert_eq!(run.last_run.exit_code, Some(0));
        assert_eq!(run.last_run.duration_ms, Some(1200));

        // the flag is consumed exactly once
        assert!(state.take_rerun_flag());
        assert!(!state.take_rerun_flag());
    }

    #[test]
    fn begin_run_resets_rerun_flag() {
        let state = AppState::new(WatchConfig::default());
        assert!(state.begin_run(Utc::now()));
        assert!(!state.begin_run(Utc::now()));
        state.finish_run(Utc::now(), Some(1), 10);

        // a fresh run claims the slot and clears any stale flag
        assert!(state.begin_run(Utc::now()));
        assert!(!state.run_state().want_another_run);
    }

    #[test]
    fn site_history_caps_at_thirty_fifo() {
        let state = AppState::new(WatchConfig::default());
        for seq in 0..40 {
            state.record_site_result(sample_result("portal", seq));
        }

        let logs = state.site_logs("portal");
        assert_eq!(logs.len(), SITE_LOG_CAP);
        // oldest entries were evicted first
        assert_eq!(logs[0].items[0].label, "check 10");
        assert_eq!(logs[29].items[0].label, "check 39");

        let current = state.site_status("portal").unwrap();
        assert_eq!(current.items[0].label, "check 39");
    }

    #[test]
    fn unknown_site_has_no_status() {
        let state = AppState::new(WatchConfig::default());
        assert!(state.site_status("portal").is_none());
        assert!(state.site_logs("portal").is_empty());
        assert!(state.site("nope").is_none());
        assert!(state.site("portal").is_some());
    }
}
