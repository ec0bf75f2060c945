use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use reftrack_core::{AttemptRecord, Outcome};
use reftrack_storage::AttemptStore;
use reftrack_storage_sqlite::SqliteAttemptStore;
use reftrack_tracker::{InstallTracker, ReqwestTransport, TrackerClient, VersionInfo};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

use crate::coordinator::AttemptCoordinator;
use crate::gate::{ConnectivityGate, SysfsConnectivityGate};
use crate::queue::InProcessTaskQueue;
use crate::receiver::{LoggingHandler, ReferrerReceiver};
use crate::strategy::{DelegatedStrategy, Dispatcher, SelfManagedStrategy, TaskQueue, TrackingJobWorker};
use crate::timer::{RetryTimer, TokioRetryTimer};
use crate::util::{Clock, SystemClock};
use crate::Config;

/// Resume triggers delivered by the connectivity listener and the retry timer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostEvent {
    Reachable,
    TimerFired { referrer: String, attempt: u32 },
}

/// Dispatches work onto tokio's blocking pool and counts runs still executing.
pub struct TokioDispatcher {
    handle: Handle,
    in_flight: Arc<AtomicUsize>,
}

impl TokioDispatcher {
    pub fn new(handle: Handle, in_flight: Arc<AtomicUsize>) -> Self {
        Self { handle, in_flight }
    }
}

struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Dispatcher for TokioDispatcher {
    fn dispatch(&self, work: Box<dyn FnOnce() + Send>) -> bool {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let guard = InFlight(self.in_flight.clone());
        self.handle.spawn_blocking(move || {
            let _guard = guard;
            work();
        });
        true
    }
}

/// Real collaborators wired together: SQLite store, sysfs gate, tokio timer and
/// task queue, reqwest transport.
///
/// Build it outside of an async context; the blocking HTTP client must not be
/// created or dropped on a runtime thread.
pub struct HostRuntime {
    events: UnboundedReceiver<HostEvent>,
    store: Arc<dyn AttemptStore>,
    gate: Arc<SysfsConnectivityGate>,
    timer: Arc<TokioRetryTimer>,
    queue: Arc<InProcessTaskQueue>,
    self_managed: SelfManagedStrategy,
    receiver: ReferrerReceiver,
    in_flight: Arc<AtomicUsize>,
    idle_tick: Duration,
}

impl HostRuntime {
    pub fn build(cfg: &Config, root: &Path, handle: Handle) -> Result<Self> {
        let (tx, events) = unbounded_channel();
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let store: Arc<dyn AttemptStore> = Arc::new(SqliteAttemptStore::open(&cfg.db_path(root))?);
        let gate = Arc::new(SysfsConnectivityGate::new(
            PathBuf::from(&cfg.connectivity.sysfs_root),
            cfg.poll_interval(),
            tx.clone(),
            handle.clone(),
        ));
        let timer = Arc::new(TokioRetryTimer::new(clock.clone(), tx, handle.clone()));

        let transport = Arc::new(ReqwestTransport::new(cfg.request_timeout()));
        let version: Arc<dyn VersionInfo> = Arc::new(cfg.version_info());
        let tracker: Arc<dyn TrackerClient> =
            Arc::new(InstallTracker::new(cfg.tracker_settings(), version.clone(), transport));

        let coordinator = Arc::new(AttemptCoordinator::new(
            tracker.clone(),
            store.clone(),
            gate.clone(),
            timer.clone(),
            clock,
            cfg.retry.max_attempts,
        ));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let dispatcher = Arc::new(TokioDispatcher::new(handle.clone(), in_flight.clone()));
        let self_managed = SelfManagedStrategy::new(coordinator, dispatcher);

        let queue = Arc::new(InProcessTaskQueue::new(
            handle,
            gate.clone(),
            Arc::new(TrackingJobWorker::new(tracker)),
            cfg.retry.delegated_max_backoff_secs.saturating_mul(1000),
            cfg.poll_interval(),
            cfg.retry.delegated_max_runs,
        ));
        let delegated = Arc::new(DelegatedStrategy::new(queue.clone(), cfg.retry.delegated_base_interval_ms));

        let mut receiver = ReferrerReceiver::new(
            cfg.referrer.source_param.clone(),
            cfg.referrer.source_value.clone(),
            version.platform_capability(),
            cfg.scheduling.delegated_min_capability,
            delegated,
            Arc::new(self_managed.clone()),
        );
        for name in &cfg.referrer.forward_handlers {
            receiver = receiver.forward_to(Arc::new(LoggingHandler::new(name.clone())));
        }

        Ok(Self {
            events,
            store,
            gate,
            timer,
            queue,
            self_managed,
            receiver,
            in_flight,
            idle_tick: cfg.poll_interval(),
        })
    }

    pub fn receiver(&self) -> &ReferrerReceiver {
        &self.receiver
    }

    /// Mutable access, e.g. to override the platform capability.
    pub fn receiver_mut(&mut self) -> &mut ReferrerReceiver {
        &mut self.receiver
    }

    pub fn self_managed(&self) -> &SelfManagedStrategy {
        &self.self_managed
    }

    pub fn pending_record(&self) -> Result<Option<AttemptRecord>> {
        self.store.load()
    }

    /// Rebuild pending triggers after a restart. Runs on the calling thread.
    pub fn resume_pending(&self) -> Option<Outcome> {
        self.self_managed.resume_pending()
    }

    /// Nothing left that could resume a tracking sequence.
    pub fn is_idle(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) == 0
            && self.events.is_empty()
            && !self.gate.is_listening()
            && !self.timer.is_pending()
            && !self.queue.is_pending()
    }

    /// Serve resume events until the runtime is idle or the process is interrupted.
    pub async fn run_until_idle(&mut self) -> Result<()> {
        let mut tick = tokio::time::interval(self.idle_tick);
        loop {
            tokio::select! {
                biased;
                ev = self.events.recv() => match ev {
                    Some(ev) => self.handle_event(ev).await,
                    None => break,
                },
                _ = tick.tick() => {
                    if self.is_idle() {
                        break;
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("interrupted, pending state stays stored");
                    break;
                }
            }
        }
        if let Ok(Some(record)) = self.store.load() {
            tracing::info!(attempt = record.attempt_count, "attempt record left for the next start");
        }
        Ok(())
    }

    async fn handle_event(&self, ev: HostEvent) {
        tracing::debug!(event = ?ev, "host event");
        let strategy = self.self_managed.clone();
        let res = tokio::task::spawn_blocking(move || match ev {
            HostEvent::Reachable => strategy.on_reachable(),
            HostEvent::TimerFired { referrer, attempt } => strategy.on_timer(&referrer, attempt),
        })
        .await;
        match res {
            Ok(Some(outcome)) if outcome.is_final() => tracing::info!(?outcome, "tracking sequence settled"),
            Ok(_) => {}
            Err(e) => tracing::warn!("resume run panicked: {e}"),
        }
    }
}
