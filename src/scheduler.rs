//! Minute-cycle scheduler for the four tasks.
//!
//! Each task gets its own tokio task ticking once a minute at a fixed
//! second. Runs of one task never overlap: a tick that arrives while the
//! previous run is still going is dropped. Different tasks may overlap in
//! time and serialize on the store.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Timelike, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::ScheduleConfig;
use crate::notify::{AlertChannel, error_message};
use crate::reconcile::{Reconciler, Task, TaskReport};
use crate::source::Session;

const MINUTE: Duration = Duration::from_secs(60);

/// Second-of-minute at which `task` fires.
pub fn task_second(schedule: &ScheduleConfig, task: Task) -> u32 {
    match task {
        Task::Intake => schedule.intake_second,
        Task::OrderChanges => schedule.order_changes_second,
        Task::Dispatch => schedule.dispatch_second,
        Task::DispatchChanges => schedule.dispatch_changes_second,
    }
}

/// Time from `now` until the next instant whose second-of-minute is `second`.
pub fn delay_until_second(now: DateTime<Utc>, second: u32) -> Duration {
    let into_minute = u64::from(now.second()) * 1000 + u64::from(now.timestamp_subsec_millis() % 1000);
    let target = u64::from(second % 60) * 1000;
    let wait = (target + 60_000 - into_minute) % 60_000;
    Duration::from_millis(wait)
}

/// Run a task once, turning a failure into an error log and an Error alert.
pub async fn run_reported(
    reconciler: &Reconciler,
    task: Task,
    session: &mut Session,
) -> Option<TaskReport> {
    match reconciler.run(task, session).await {
        Ok(report) => Some(report),
        Err(e) => {
            tracing::error!(task = task.name(), error = format!("{:#}", e), "Task run failed");
            let text = error_message(task.name(), &e);
            if let Err(send_err) = reconciler.notifier().send(AlertChannel::Error, &text).await {
                tracing::warn!(error = %send_err, "Failed to deliver error alert");
            }
            None
        }
    }
}

async fn task_loop(
    reconciler: Arc<Reconciler>,
    task: Task,
    second: u32,
    mut shutdown: watch::Receiver<bool>,
) {
    let start = Instant::now() + delay_until_second(Utc::now(), second);
    let mut ticker = tokio::time::interval_at(start, MINUTE);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut session = Session::new();
    tracing::info!(task = task.name(), second, "Task scheduled");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                run_reported(&reconciler, task, &mut session).await;
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    tracing::info!(task = task.name(), "Task stopped");
}

/// The four running task loops.
pub struct Scheduler {
    stop: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn start(reconciler: Arc<Reconciler>) -> Self {
        let (stop, stopped) = watch::channel(false);
        let handles = Task::ALL
            .into_iter()
            .map(|task| {
                let second = task_second(&reconciler.config().schedule, task);
                tokio::spawn(task_loop(reconciler.clone(), task, second, stopped.clone()))
            })
            .collect();
        Self { stop, handles }
    }

    /// Signal every loop to stop and wait for in-flight runs to finish.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Task loop ended abnormally");
            }
        }
    }
}
