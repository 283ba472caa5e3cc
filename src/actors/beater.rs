//! BeatScheduler - one periodic health-check loop per service
//!
//! ## Tick
//!
//! ```text
//! start ─► load service + config ─► gone? ─yes─► Stopped
//!                 │no
//!                 ▼
//!          run_check() ─► insert_beat() ─► sleep(next_sleep(interval, elapsed))
//! ```
//!
//! The service is re-read on every tick, so config edits apply on the next
//! wake. A tick that overruns its interval does not trigger back-to-back
//! catch-up checks: the missed ticks are dropped and the loop sleeps until
//! the next interval boundary measured from the start of the slow tick.
//! A tick whose service cannot be read still records a failed beat and
//! retries after the minimum interval.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::checks::{self, CheckOutcome};
use crate::model::{Beat, MIN_INTERVAL_SECS, ServiceId};
use crate::ssh::SessionPool;
use crate::storage::StorageBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    /// Terminal: the service no longer exists
    Stopped,
}

/// Time to sleep after a tick that took `elapsed`.
///
/// Returns the sleep and, for an overrun tick, the number `k ≥ 2` of
/// intervals the tick spans: the smallest `k` with `k * interval ≥ elapsed`.
/// `k` is computed in closed form, so a pathologically long tick costs no
/// more than a short one. Intervals below the minimum are clamped.
pub fn next_sleep(interval_secs: f64, elapsed: Duration) -> (Duration, Option<u64>) {
    let interval = if interval_secs.is_finite() && interval_secs >= MIN_INTERVAL_SECS {
        interval_secs
    } else {
        MIN_INTERVAL_SECS
    };
    let elapsed = elapsed.as_secs_f64();

    let remaining = interval - elapsed;
    if remaining >= 0.0 {
        return (secs(remaining), None);
    }

    let k = (elapsed / interval).ceil().max(2.0);
    (secs(k * interval - elapsed), Some(k as u64))
}

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.max(0.0)).unwrap_or(Duration::ZERO)
}

/// Periodic check loop for a single service
pub struct BeatScheduler {
    service_id: ServiceId,
    storage: Arc<dyn StorageBackend>,
    pool: Arc<SessionPool>,
    state_tx: watch::Sender<SchedulerState>,
}

impl BeatScheduler {
    pub fn new(
        service_id: ServiceId,
        storage: Arc<dyn StorageBackend>,
        pool: Arc<SessionPool>,
        state_tx: watch::Sender<SchedulerState>,
    ) -> Self {
        Self {
            service_id,
            storage,
            pool,
            state_tx,
        }
    }

    /// Run until the service disappears from storage
    #[instrument(skip(self), fields(service_id = self.service_id))]
    pub async fn run(self) {
        debug!("starting beat scheduler");
        self.state_tx.send_replace(SchedulerState::Running);

        while let Some(sleep) = self.tick().await {
            trace!("next check in {sleep:?}");
            tokio::time::sleep(sleep).await;
        }

        info!("service no longer exists, scheduler stopped");
        self.state_tx.send_replace(SchedulerState::Stopped);
    }

    /// Run one check and persist its beat.
    ///
    /// Returns the sleep before the next tick, or `None` once the service is gone.
    async fn tick(&self) -> Option<Duration> {
        let started = Instant::now();
        let timestamp = Utc::now();

        let service = match self.storage.get_service(self.service_id).await {
            Ok(Some(service)) => service,
            Ok(None) => return None,
            Err(e) => {
                error!("failed to load service, retrying in {MIN_INTERVAL_SECS}s: {e}");
                self.record(timestamp, CheckOutcome::failed()).await;
                return Some(secs(MIN_INTERVAL_SECS));
            }
        };

        let outcome = checks::run_check(&self.pool, &service).await;
        trace!(
            active = outcome.active,
            connectivity = outcome.connectivity,
            "check finished"
        );
        self.record(timestamp, outcome).await;

        let interval = service.config.interval();
        let (sleep, skipped) = next_sleep(interval, started.elapsed());
        if let Some(k) = skipped {
            warn!(
                "check of {} took {:.1}s, longer than its {interval}s interval; skipping to tick {k}",
                service.service.name,
                started.elapsed().as_secs_f64()
            );
        }
        Some(sleep)
    }

    async fn record(&self, timestamp: DateTime<Utc>, outcome: CheckOutcome) {
        let beat = Beat::from_outcome(self.service_id, timestamp, outcome);
        if let Err(e) = self.storage.insert_beat(beat).await {
            error!("failed to persist beat: {e}");
        }
    }
}

/// Handle for a spawned [`BeatScheduler`]
pub struct BeaterHandle {
    service_id: ServiceId,
    state_rx: watch::Receiver<SchedulerState>,
    task: JoinHandle<()>,
}

impl BeaterHandle {
    /// Spawn a scheduler for `service_id` on its own task
    pub fn spawn(service_id: ServiceId, storage: Arc<dyn StorageBackend>, pool: Arc<SessionPool>) -> Self {
        let (state_tx, state_rx) = watch::channel(SchedulerState::Idle);
        let scheduler = BeatScheduler::new(service_id, storage, pool, state_tx);

        let task = tokio::spawn(scheduler.run());

        Self {
            service_id,
            state_rx,
            task,
        }
    }

    pub fn service_id(&self) -> ServiceId {
        self.service_id
    }

    pub fn state(&self) -> SchedulerState {
        *self.state_rx.borrow()
    }

    /// Whether the loop has ended, on its own or by abort
    pub fn is_stopped(&self) -> bool {
        self.state() == SchedulerState::Stopped || self.task.is_finished()
    }

    /// Wait until the loop has observed its service is gone
    pub async fn stopped(&self) {
        self.stopped_signal().await;
    }

    /// Like [`BeaterHandle::stopped`], without borrowing the handle
    pub fn stopped_signal(&self) -> impl Future<Output = ()> + 'static {
        let mut state_rx = self.state_rx.clone();
        async move {
            // a dropped sender means the task ended without reaching Stopped
            let _ = state_rx
                .wait_for(|state| *state == SchedulerState::Stopped)
                .await;
        }
    }

    /// Cancel the loop immediately (process shutdown)
    pub fn abort(&self) {
        self.task.abort();
    }
}
