use std::sync::{Arc, Mutex};
use std::time::Duration;

use reftrack_core::{queue_backoff_millis, BackoffKind, TrackingJob};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::gate::ConnectivityGate;
use crate::strategy::{JobWorker, TaskQueue};
use crate::util::lock;

/// Task queue with its own backoff, standing in for a host job scheduler.
///
/// One job slot. The worker runs on a blocking thread; between failed runs the
/// queue sleeps `base * 2^(n-1)` (or `base * n` for linear jobs), capped.
pub struct InProcessTaskQueue {
    handle: Handle,
    gate: Arc<dyn ConnectivityGate>,
    worker: Arc<dyn JobWorker>,
    cap_ms: u64,
    poll_interval: Duration,
    max_runs: u32,
    slot: Mutex<Option<(TrackingJob, JoinHandle<()>)>>,
}

impl InProcessTaskQueue {
    pub fn new(
        handle: Handle,
        gate: Arc<dyn ConnectivityGate>,
        worker: Arc<dyn JobWorker>,
        cap_ms: u64,
        poll_interval: Duration,
        max_runs: u32,
    ) -> Self {
        Self {
            handle,
            gate,
            worker,
            cap_ms,
            poll_interval,
            max_runs,
            slot: Mutex::new(None),
        }
    }
}

pub(crate) fn next_delay_ms(job: &TrackingJob, failures: u32, cap_ms: u64) -> u64 {
    match job.backoff {
        BackoffKind::Exponential => queue_backoff_millis(job.base_interval_ms, failures, cap_ms),
        BackoffKind::Linear => job.base_interval_ms.saturating_mul(failures as u64).min(cap_ms),
    }
}

async fn drive(
    job: TrackingJob,
    gate: Arc<dyn ConnectivityGate>,
    worker: Arc<dyn JobWorker>,
    cap_ms: u64,
    poll: Duration,
    max_runs: u32,
) {
    let mut failures = 0u32;
    loop {
        if job.network_required {
            while !gate.is_reachable(false) {
                tokio::time::sleep(poll).await;
            }
        }

        let (w, j) = (worker.clone(), job.clone());
        let needs_reschedule = match tokio::task::spawn_blocking(move || w.run_job(&j)).await {
            Ok(needs) => needs,
            Err(e) => {
                tracing::warn!("tracking job panicked: {e}");
                true
            }
        };
        if !needs_reschedule {
            tracing::debug!("tracking job done");
            return;
        }

        failures += 1;
        if max_runs != 0 && failures >= max_runs {
            tracing::warn!(runs = failures, "task queue giving up on tracking job");
            return;
        }
        let delay = next_delay_ms(&job, failures, cap_ms);
        tracing::info!(failures, delay_ms = delay, "task queue rescheduling tracking job");
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
}

impl TaskQueue for InProcessTaskQueue {
    fn schedule(&self, job: TrackingJob) -> bool {
        let mut slot = lock(&self.slot);
        if let Some((old, h)) = slot.take() {
            if !h.is_finished() {
                h.abort();
                let reschedule = self.worker.on_stop(&old);
                tracing::debug!(reschedule, "replaced queued tracking job");
            }
        }

        let task = self.handle.spawn(drive(
            job.clone(),
            self.gate.clone(),
            self.worker.clone(),
            self.cap_ms,
            self.poll_interval,
            self.max_runs,
        ));
        *slot = Some((job, task));
        true
    }

    fn is_pending(&self) -> bool {
        lock(&self.slot).as_ref().is_some_and(|(_, h)| !h.is_finished())
    }
}
