//! Background scheduling of the unique sync job.
//!
//! At most one job named [`SYNC_WORK_NAME`] is queued or running at a time;
//! a request made while one is pending is dropped (keep-existing policy).
//! The loop runs one job right away, then periodically, backing off after
//! failed runs and deferring while the network is down.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::{SyncJob, SyncOutcome};
use crate::errors::AppError;

pub const SYNC_WORK_NAME: &str = "SyncWorkName";

/// Reports whether the device can reach the network.
pub trait NetworkMonitor: Send + Sync {
    fn is_online(&self) -> bool;
}

/// Monitor for hosts without connectivity tracking.
#[derive(Debug, Default)]
pub struct AlwaysOnline;

impl NetworkMonitor for AlwaysOnline {
    fn is_online(&self) -> bool {
        true
    }
}

/// Timing knobs for the scheduler loop.
#[derive(Debug, Clone)]
pub struct SchedulePolicy {
    pub interval: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Delay before re-checking connectivity while offline.
    pub offline_recheck: Duration,
}

impl Default for SchedulePolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3600),
            initial_backoff: Duration::from_secs(30),
            max_backoff: Duration::from_secs(3600),
            offline_recheck: Duration::from_secs(30),
        }
    }
}

impl SchedulePolicy {
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            ..Default::default()
        }
    }
}

/// Whether a sync request was queued or dropped in favour of the pending one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EnqueueResult {
    Enqueued,
    Kept,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub work_name: &'static str,
    pub is_syncing: bool,
    pub last_outcome: Option<SyncOutcome>,
    pub last_finished_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
}

struct Shared {
    queued: AtomicBool,
    trigger: Notify,
    status: watch::Sender<SyncStatus>,
    cancel: CancellationToken,
}

/// Handle to the background sync loop.
#[derive(Clone)]
pub struct SyncScheduler {
    shared: Arc<Shared>,
    handle: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl SyncScheduler {
    /// Spawn the loop. The first job starts immediately.
    pub fn start(
        job: Arc<dyn SyncJob>,
        monitor: Arc<dyn NetworkMonitor>,
        policy: SchedulePolicy,
    ) -> Self {
        let (status, _) = watch::channel(SyncStatus {
            work_name: SYNC_WORK_NAME,
            ..Default::default()
        });
        let shared = Arc::new(Shared {
            queued: AtomicBool::new(true),
            trigger: Notify::new(),
            status,
            cancel: CancellationToken::new(),
        });

        tracing::info!(
            work = SYNC_WORK_NAME,
            interval_secs = policy.interval.as_secs(),
            "Starting sync scheduler"
        );
        let handle = tokio::spawn(run_loop(shared.clone(), job, monitor, policy));

        Self {
            shared,
            handle: Arc::new(Mutex::new(Some(handle))),
        }
    }

    /// Ask for a sync now. Dropped if a job is already queued or running.
    pub fn request_sync(&self) -> EnqueueResult {
        if self.shared.queued.swap(true, Ordering::SeqCst) {
            tracing::debug!(work = SYNC_WORK_NAME, "Sync already pending, keeping it");
            return EnqueueResult::Kept;
        }
        self.shared.trigger.notify_one();
        EnqueueResult::Enqueued
    }

    pub fn status(&self) -> SyncStatus {
        self.shared.status.borrow().clone()
    }

    pub fn is_syncing(&self) -> bool {
        self.shared.status.borrow().is_syncing
    }

    /// Watch status changes, e.g. to drive a "syncing" indicator.
    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.shared.status.subscribe()
    }

    /// Cancel any in-flight job and stop the loop.
    pub async fn shutdown(&self) {
        self.shared.cancel.cancel();
        let handle = self.handle.lock().await.take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                tracing::error!("Sync scheduler task failed: {}", err);
            }
        }
        tracing::info!(work = SYNC_WORK_NAME, "Sync scheduler stopped");
    }
}

async fn run_loop(
    shared: Arc<Shared>,
    job: Arc<dyn SyncJob>,
    monitor: Arc<dyn NetworkMonitor>,
    policy: SchedulePolicy,
) {
    let mut backoff = policy.initial_backoff;
    let mut next_due = Instant::now();

    loop {
        tokio::select! {
            _ = shared.cancel.cancelled() => break,
            _ = shared.trigger.notified() => {}
            _ = tokio::time::sleep_until(next_due) => {
                shared.queued.store(true, Ordering::SeqCst);
            }
        }
        if !shared.queued.load(Ordering::SeqCst) {
            continue;
        }

        if !monitor.is_online() {
            tracing::debug!(work = SYNC_WORK_NAME, "Offline, deferring sync");
            next_due = Instant::now() + policy.offline_recheck;
            continue;
        }

        shared.status.send_modify(|s| s.is_syncing = true);
        let result = job.run(shared.cancel.child_token()).await;
        shared.queued.store(false, Ordering::SeqCst);

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(AppError::Cancelled) => {
                shared.status.send_modify(|s| s.is_syncing = false);
                break;
            }
            Err(err) => {
                tracing::error!(code = err.error_code(), "Sync job failed: {}", err);
                SyncOutcome::Retry
            }
        };

        let delay = match outcome {
            SyncOutcome::Success => {
                backoff = policy.initial_backoff;
                policy.interval
            }
            SyncOutcome::Retry => {
                let delay = backoff;
                backoff = (backoff * 2).min(policy.max_backoff);
                delay
            }
        };
        next_due = Instant::now() + delay;

        shared.status.send_modify(|s| {
            s.is_syncing = false;
            s.last_outcome = Some(outcome);
            s.last_finished_at = Some(Utc::now());
            s.consecutive_failures = match outcome {
                SyncOutcome::Success => 0,
                SyncOutcome::Retry => s.consecutive_failures + 1,
            };
        });
        tracing::debug!(
            work = SYNC_WORK_NAME,
            ?outcome,
            next_in_secs = delay.as_secs(),
            "Next sync scheduled"
        );
    }
}
