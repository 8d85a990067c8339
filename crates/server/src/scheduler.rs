//! Recurring run scheduling
//!
//! The timer is single-shot and re-arms only after the triggered run
//! completes, so a run slower than the interval delays the next tick
//! instead of overlapping it.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use testwatch_common::{Error, Result, Schedule, ScheduleMode};

use crate::runner::RunCoordinator;
use crate::state::AppState;

pub struct Scheduler {
    state: Arc<AppState>,
    coordinator: Arc<RunCoordinator>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(state: Arc<AppState>, coordinator: Arc<RunCoordinator>) -> Self {
        Self {
            state,
            coordinator,
            task: Mutex::new(None),
        }
    }

    /// (Re)configure the schedule, replacing any previous timer atomically.
    ///
    /// Performs one immediate run, then keeps re-arming after each run
    /// completes. Invalid input fails with `InvalidConfig` and leaves the
    /// existing timer untouched.
    pub fn configure(&self, mode: ScheduleMode, value: u64) -> Result<Schedule> {
        if value == 0 {
            return Err(Error::InvalidConfig(
                "schedule value must be a positive number".to_string(),
            ));
        }

        let schedule = Schedule::new(mode, value);
        let interval = Duration::from_millis(schedule.ms.unwrap_or_default());

        let mut task = self.task.lock();
        if let Some(handle) = task.take() {
            handle.abort();
        }
        self.state.set_schedule(schedule.clone());

        let state = Arc::clone(&self.state);
        let coordinator = Arc::clone(&self.coordinator);
        *task = Some(tokio::spawn(async move {
            loop {
                let mut running = state.subscribe_running();
                coordinator.trigger();

                // Wait out the triggered (or already active) run before
                // arming the timer.
                loop {
                    if !*running.borrow_and_update() {
                        break;
                    }
                    if running.changed().await.is_err() {
                        return;
                    }
                }

                debug!(interval_ms = interval.as_millis() as u64, "timer armed");
                tokio::time::sleep(interval).await;
            }
        }));

        info!(?mode, value, "schedule configured");
        Ok(schedule)
    }

    /// Stop the recurring timer; idempotent. An in-flight run is never
    /// interrupted.
    pub fn cancel(&self) {
        let mut task = self.task.lock();
        if let Some(handle) = task.take() {
            handle.abort();
            info!("schedule cancelled");
        }
        self.state.set_schedule(Schedule::default());
    }
}
