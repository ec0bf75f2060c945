use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use reftrack_core::{backoff_millis, BackoffKind, Outcome, ResultCode, TrackingJob};
use reftrack_tracker::TrackerClient;

use crate::coordinator::AttemptCoordinator;
use crate::util::lock;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StrategyKind {
    Delegated,
    SelfManaged,
}

/// Hosts at or above `min_delegated` have a task queue with its own backoff.
pub fn select_strategy(capability: u32, min_delegated: u32) -> StrategyKind {
    if capability >= min_delegated {
        StrategyKind::Delegated
    } else {
        StrategyKind::SelfManaged
    }
}

/// Turns a tracking trigger into a scheduled coordinator run.
pub trait SchedulingStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// True iff the first attempt was handed off.
    fn schedule_tracking(&self, referrer: &str) -> bool;
}

/// Runs a unit of blocking work off the caller's thread.
pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, work: Box<dyn FnOnce() + Send>) -> bool;
}

/// Host task queue with built-in backoff, used by the delegated strategy.
pub trait TaskQueue: Send + Sync {
    /// Replaces any queued job. Returns whether the job was accepted.
    fn schedule(&self, job: TrackingJob) -> bool;
    fn is_pending(&self) -> bool;
}

/// Callback a `TaskQueue` invokes for each run of a job.
pub trait JobWorker: Send + Sync {
    /// Returns true when the job must be run again later.
    fn run_job(&self, job: &TrackingJob) -> bool;

    /// The host interrupted a running job; answer whether to reschedule it.
    fn on_stop(&self, job: &TrackingJob) -> bool;
}

/// Self-managed scheduling: persisted state plus connectivity and timer triggers.
#[derive(Clone)]
pub struct SelfManagedStrategy {
    coordinator: Arc<AttemptCoordinator>,
    dispatcher: Arc<dyn Dispatcher>,
    run_lock: Arc<Mutex<()>>,
}

impl SelfManagedStrategy {
    pub fn new(coordinator: Arc<AttemptCoordinator>, dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self {
            coordinator,
            dispatcher,
            run_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn coordinator(&self) -> &Arc<AttemptCoordinator> {
        &self.coordinator
    }

    /// First attempt of a new sequence, on the calling thread.
    pub fn start(&self, referrer: &str) -> Option<Outcome> {
        let _guard = lock(&self.run_lock);
        // A new sequence overwrites the old one; its timer must not fire into it.
        self.coordinator.timer().cancel();
        self.run(referrer, 0)
    }

    /// Connectivity came back. Disarms both triggers before resuming so only
    /// one resume token stays live.
    pub fn on_reachable(&self) -> Option<Outcome> {
        let _guard = lock(&self.run_lock);
        self.coordinator.gate().set_listening(false);
        self.coordinator.timer().cancel();

        let record = self.load()?;
        tracing::info!(attempt = record.attempt_count, "resuming after connectivity change");
        self.run(&record.referrer, record.attempt_count)
    }

    /// A retry timer fired. Tokens that no longer match the stored record are
    /// skipped and leave the live sequence's listener alone.
    pub fn on_timer(&self, referrer: &str, attempt: u32) -> Option<Outcome> {
        let _guard = lock(&self.run_lock);
        let record = self.load()?;
        if record.referrer != referrer || record.attempt_count != attempt {
            tracing::debug!(attempt, stored = record.attempt_count, "skipping stale retry timer");
            return None;
        }

        self.coordinator.gate().set_listening(false);
        tracing::info!(attempt, "resuming after retry timer");
        self.run(&record.referrer, record.attempt_count)
    }

    /// Rebuild the pending trigger from the stored record after a restart.
    /// Returns the outcome when the record could be retried right away.
    pub fn resume_pending(&self) -> Option<Outcome> {
        let record = {
            let _guard = lock(&self.run_lock);
            let record = self.load()?;
            match record.last_failure_reason {
                ResultCode::FailedServerResponse => {
                    let at = self
                        .coordinator
                        .clock()
                        .now_ms()
                        .saturating_add(backoff_millis(record.attempt_count).min(i64::MAX as u64) as i64);
                    if let Err(e) = self.coordinator.timer().schedule_at(at, &record.referrer, record.attempt_count) {
                        tracing::warn!("cannot re-arm retry timer: {e:#}");
                    }
                    return Some(Outcome::Deferred {
                        attempt: record.attempt_count,
                        reason: record.last_failure_reason,
                    });
                }
                ResultCode::FailedConnectivity => {
                    self.coordinator.gate().set_listening(true);
                    if !self.coordinator.gate().is_reachable(false) {
                        return Some(Outcome::Deferred {
                            attempt: record.attempt_count,
                            reason: record.last_failure_reason,
                        });
                    }
                    record
                }
                // Terminal codes are never persisted; treat a stray one as done.
                other => {
                    tracing::warn!(result = ?other, "stored record holds a terminal result, clearing");
                    if let Err(e) = self.coordinator.store().clear() {
                        tracing::warn!("cannot clear attempt store: {e:#}");
                    }
                    return Some(Outcome::Completed(other));
                }
            }
        };
        tracing::info!(attempt = record.attempt_count, "already reachable, resuming now");
        self.on_reachable()
    }

    fn load(&self) -> Option<reftrack_core::AttemptRecord> {
        match self.coordinator.store().load() {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("cannot load attempt record: {e:#}");
                None
            }
        }
    }

    fn run(&self, referrer: &str, attempts_before: u32) -> Option<Outcome> {
        match self.coordinator.run(referrer, attempts_before) {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                tracing::warn!("tracking run failed: {e:#}");
                None
            }
        }
    }
}

impl SchedulingStrategy for SelfManagedStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::SelfManaged
    }

    fn schedule_tracking(&self, referrer: &str) -> bool {
        let this = self.clone();
        let referrer = referrer.to_string();
        self.dispatcher.dispatch(Box::new(move || {
            this.start(&referrer);
        }))
    }
}

/// Worker for the delegated path. Reports only whether the job needs another run;
/// the host queue owns the backoff.
pub struct TrackingJobWorker {
    tracker: Arc<dyn TrackerClient>,
    needs_reschedule: AtomicBool,
}

impl TrackingJobWorker {
    pub fn new(tracker: Arc<dyn TrackerClient>) -> Self {
        Self {
            tracker,
            needs_reschedule: AtomicBool::new(true),
        }
    }

    pub fn process_job(&self, referrer: &str) -> bool {
        if referrer.is_empty() {
            tracing::warn!("tracking job without referrer, dropping");
            return false;
        }
        let rc = self.tracker.attempt(referrer);
        let needs = !rc.is_terminal();
        self.needs_reschedule.store(needs, Ordering::SeqCst);
        tracing::info!(result = ?rc, needs_reschedule = needs, "tracking job finished");
        needs
    }

    /// Last known answer; true until a run has said otherwise.
    pub fn on_stop(&self) -> bool {
        self.needs_reschedule.load(Ordering::SeqCst)
    }
}

impl JobWorker for TrackingJobWorker {
    fn run_job(&self, job: &TrackingJob) -> bool {
        self.process_job(&job.referrer)
    }

    fn on_stop(&self, _job: &TrackingJob) -> bool {
        TrackingJobWorker::on_stop(self)
    }
}

pub struct DelegatedStrategy {
    queue: Arc<dyn TaskQueue>,
    base_interval_ms: u64,
}

impl DelegatedStrategy {
    pub fn new(queue: Arc<dyn TaskQueue>, base_interval_ms: u64) -> Self {
        Self { queue, base_interval_ms }
    }

    pub fn job_for(&self, referrer: &str) -> TrackingJob {
        TrackingJob {
            referrer: referrer.to_string(),
            network_required: true,
            backoff: BackoffKind::Exponential,
            base_interval_ms: self.base_interval_ms,
        }
    }
}

impl SchedulingStrategy for DelegatedStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Delegated
    }

    fn schedule_tracking(&self, referrer: &str) -> bool {
        let accepted = self.queue.schedule(self.job_for(referrer));
        if !accepted {
            tracing::warn!("task queue refused tracking job");
        }
        accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::ScriptedTracker;

    #[test]
    fn selection_by_capability() {
        assert_eq!(select_strategy(21, 21), StrategyKind::Delegated);
        assert_eq!(select_strategy(30, 21), StrategyKind::Delegated);
        assert_eq!(select_strategy(20, 21), StrategyKind::SelfManaged);
        assert_eq!(select_strategy(0, 0), StrategyKind::Delegated);
    }

    #[test]
    fn job_worker_reschedules_only_retryable_results() {
        let cases = [
            (ResultCode::Success, false),
            (ResultCode::FailedUnrecoverable, false),
            (ResultCode::FailedServerResponse, true),
            (ResultCode::FailedConnectivity, true),
        ];
        for (rc, expected) in cases {
            let worker = TrackingJobWorker::new(Arc::new(ScriptedTracker::new(vec![rc])));
            assert!(worker.on_stop());
            assert_eq!(worker.process_job("utm_source=xing"), expected);
            assert_eq!(worker.on_stop(), expected);
        }
    }

    #[test]
    fn empty_referrer_is_dropped_without_a_call() {
        let tracker = Arc::new(ScriptedTracker::new(vec![ResultCode::Success]));
        let worker = TrackingJobWorker::new(tracker.clone());
        assert!(!worker.process_job(""));
        // the cached answer is untouched by a dropped job
        assert!(worker.on_stop());
        assert_eq!(tracker.calls(), 0);
    }

    #[test]
    fn blank_referrer_is_still_sent() {
        let tracker = Arc::new(ScriptedTracker::new(vec![ResultCode::FailedServerResponse, ResultCode::Success]));
        let worker = TrackingJobWorker::new(tracker.clone());
        assert!(worker.process_job("  "));
        assert!(!worker.process_job("utm_source=xing"));
        assert!(!worker.process_job(""));
        assert!(!worker.on_stop());
        assert_eq!(tracker.calls(), 2);
    }

    #[test]
    fn delegated_job_carries_network_constraint_and_backoff() {
        struct Refusing;
        impl TaskQueue for Refusing {
            fn schedule(&self, _job: TrackingJob) -> bool {
                false
            }
            fn is_pending(&self) -> bool {
                false
            }
        }
        let s = DelegatedStrategy::new(Arc::new(Refusing), 1000);
        let job = s.job_for("r");
        assert!(job.network_required);
        assert_eq!(job.backoff, BackoffKind::Exponential);
        assert_eq!(job.base_interval_ms, 1000);
        assert!(!s.schedule_tracking("r"));
        assert_eq!(s.kind(), StrategyKind::Delegated);
    }
}
