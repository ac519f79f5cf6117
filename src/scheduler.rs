//! Recurring job runner.
//!
//! Every registered job gets one timer task per trigger. A tick launches the
//! job on the shared task tracker unless the previous run of the same job is
//! still in flight or the tick woke up later than the misfire grace.

pub mod cadence;
pub mod jobs;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::observability::Metrics;

pub use cadence::{TickDecision, Trigger, classify_tick, duration_until};
pub use jobs::{
    PartitionMaintenanceJob, QueueDrainJob, RollupJob, RouteSyncJob, ScheduledJob,
};

struct JobEntry {
    job: Arc<dyn ScheduledJob>,
    triggers: Vec<Trigger>,
    in_flight: Arc<Mutex<()>>,
}

pub struct Scheduler {
    entries: Vec<JobEntry>,
    misfire_grace: Duration,
    metrics: Arc<Metrics>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    started: AtomicBool,
}

impl Scheduler {
    #[must_use]
    pub fn new(misfire_grace: Duration, metrics: Arc<Metrics>) -> Self {
        Self {
            entries: Vec::new(),
            misfire_grace,
            metrics,
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
            started: AtomicBool::new(false),
        }
    }

    /// Adds a job fired by any of `triggers`. All triggers of one job share
    /// its overlap guard.
    pub fn register(&mut self, job: Arc<dyn ScheduledJob>, triggers: Vec<Trigger>) {
        info!(job = job.name(), triggers = ?triggers, "job registered");
        self.entries.push(JobEntry {
            job,
            triggers,
            in_flight: Arc::new(Mutex::new(())),
        });
    }

    #[must_use]
    pub fn job_names(&self) -> Vec<&str> {
        self.entries.iter().map(|entry| entry.job.name()).collect()
    }

    /// Spawns the timer tasks. Calling it again is a no-op.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("scheduler already started");
            return;
        }

        for entry in &self.entries {
            for trigger in &entry.triggers {
                let timer = TriggerLoop {
                    job: Arc::clone(&entry.job),
                    trigger: *trigger,
                    in_flight: Arc::clone(&entry.in_flight),
                    misfire_grace: self.misfire_grace,
                    metrics: Arc::clone(&self.metrics),
                    shutdown: self.shutdown.clone(),
                    tracker: self.tracker.clone(),
                };
                self.tracker.spawn(timer.run());
            }
        }
        info!(jobs = self.entries.len(), "scheduler started");
    }

    /// Stops starting new runs and waits up to `grace` for in-flight runs.
    ///
    /// Returns `true` when everything finished within the grace period.
    pub async fn stop(&self, grace: Duration) -> bool {
        self.shutdown.cancel();
        self.tracker.close();

        if timeout(grace, self.tracker.wait()).await.is_ok() {
            info!("scheduler stopped");
            true
        } else {
            warn!(
                grace_secs = grace.as_secs(),
                remaining = self.tracker.len(),
                "scheduler grace period elapsed with runs in flight"
            );
            false
        }
    }

    #[must_use]
    pub fn is_stopping(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

struct TriggerLoop {
    job: Arc<dyn ScheduledJob>,
    trigger: Trigger,
    in_flight: Arc<Mutex<()>>,
    misfire_grace: Duration,
    metrics: Arc<Metrics>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl TriggerLoop {
    async fn run(self) {
        let name = self.job.name().to_string();
        let Some(mut scheduled) = self.trigger.next_after(Utc::now()) else {
            error!(job = %name, trigger = %self.trigger, "trigger never fires; not scheduling");
            return;
        };

        loop {
            let wait = duration_until(scheduled, Utc::now());
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                () = sleep(wait) => {}
            }

            let now = Utc::now();
            match classify_tick(scheduled, now, self.misfire_grace) {
                TickDecision::Run => self.launch(&name),
                TickDecision::Misfire { late_by } => {
                    self.metrics
                        .job_skipped
                        .with_label_values(&[name.as_str(), "misfire"])
                        .inc();
                    warn!(job = %name, late_by_ms = late_by.as_millis() as u64, "misfired tick skipped");
                }
            }

            let next = self.trigger.next_after(scheduled).filter(|next| *next > now);
            match next.or_else(|| self.trigger.next_after(now)) {
                Some(next) => scheduled = next,
                None => {
                    error!(job = %name, "no further fire time; timer exiting");
                    break;
                }
            }
        }
    }

    fn launch(&self, name: &str) {
        let Ok(guard) = Arc::clone(&self.in_flight).try_lock_owned() else {
            self.metrics
                .job_skipped
                .with_label_values(&[name, "overlap"])
                .inc();
            info!(job = %name, "previous run still in flight; tick skipped");
            return;
        };

        let job = Arc::clone(&self.job);
        let metrics = Arc::clone(&self.metrics);
        let name = name.to_string();
        self.tracker.spawn(async move {
            let _guard = guard;
            execute(job.as_ref(), &name, &metrics).await;
        });
    }
}

/// Runs one job invocation with timing, outcome metrics and logging.
pub(crate) async fn execute(job: &dyn ScheduledJob, name: &str, metrics: &Metrics) -> bool {
    let run_id = Uuid::new_v4();
    let started = Instant::now();
    info!(job = %name, %run_id, "job run started");

    let outcome = job.run(Utc::now()).await;
    let elapsed = started.elapsed();
    metrics
        .job_duration
        .with_label_values(&[name])
        .observe(elapsed.as_secs_f64());

    match outcome {
        Ok(()) => {
            metrics.job_runs.with_label_values(&[name, "success"]).inc();
            info!(job = %name, %run_id, elapsed_ms = elapsed.as_millis() as u64, "job run finished");
            true
        }
        Err(err) => {
            metrics.job_runs.with_label_values(&[name, "failure"]).inc();
            error!(job = %name, %run_id, error = format!("{err:#}"), "job run failed");
            false
        }
    }
}
