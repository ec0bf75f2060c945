//! Scripted collaborators for tests and the scenario harness.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;

use reftrack_core::ResultCode;
use reftrack_tracker::TrackerClient;

use crate::gate::ConnectivityGate;
use crate::strategy::Dispatcher;
use crate::timer::RetryTimer;
use crate::util::{lock, Clock, EpochMs};

/// Pops one scripted value per call; the last value repeats forever.
struct Script<T: Copy> {
    queue: Mutex<VecDeque<T>>,
    last: T,
}

impl<T: Copy> Script<T> {
    fn new(values: Vec<T>, fallback: T) -> Self {
        let last = values.last().copied().unwrap_or(fallback);
        Self {
            queue: Mutex::new(values.into()),
            last,
        }
    }

    fn next(&self) -> T {
        lock(&self.queue).pop_front().unwrap_or(self.last)
    }
}

pub struct FakeGate {
    reachable: Script<bool>,
    listening: Mutex<bool>,
    probes: AtomicUsize,
}

impl FakeGate {
    pub fn new(reachable: Vec<bool>) -> Self {
        Self {
            reachable: Script::new(reachable, true),
            listening: Mutex::new(false),
            probes: AtomicUsize::new(0),
        }
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

impl ConnectivityGate for FakeGate {
    fn is_reachable(&self, _accept_connecting: bool) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.reachable.next()
    }

    fn set_listening(&self, enabled: bool) {
        *lock(&self.listening) = enabled;
    }

    fn is_listening(&self) -> bool {
        *lock(&self.listening)
    }
}

/// Records every schedule call; keeps the one pending token like a real timer.
#[derive(Default)]
pub struct RecordingTimer {
    scheduled: Mutex<Vec<(EpochMs, String, u32)>>,
    pending: Mutex<Option<(EpochMs, String, u32)>>,
}

impl RecordingTimer {
    pub fn scheduled(&self) -> Vec<(EpochMs, String, u32)> {
        lock(&self.scheduled).clone()
    }

    /// Take the pending token as if it fired.
    pub fn fire(&self) -> Option<(EpochMs, String, u32)> {
        lock(&self.pending).take()
    }
}

impl RetryTimer for RecordingTimer {
    fn schedule_at(&self, at_ms: EpochMs, referrer: &str, attempt: u32) -> anyhow::Result<()> {
        let entry = (at_ms, referrer.to_string(), attempt);
        lock(&self.scheduled).push(entry.clone());
        *lock(&self.pending) = Some(entry);
        Ok(())
    }

    fn cancel(&self) {
        lock(&self.pending).take();
    }

    fn is_pending(&self) -> bool {
        lock(&self.pending).is_some()
    }
}

pub struct ScriptedTracker {
    results: Script<ResultCode>,
    calls: AtomicUsize,
    referrers: Mutex<Vec<String>>,
}

impl ScriptedTracker {
    pub fn new(results: Vec<ResultCode>) -> Self {
        Self {
            results: Script::new(results, ResultCode::Success),
            calls: AtomicUsize::new(0),
            referrers: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn referrers(&self) -> Vec<String> {
        lock(&self.referrers).clone()
    }
}

impl TrackerClient for ScriptedTracker {
    fn attempt(&self, referrer: &str) -> ResultCode {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.referrers).push(referrer.to_string());
        self.results.next()
    }
}

pub struct ManualClock(AtomicI64);

impl ManualClock {
    pub fn new(start: EpochMs) -> Self {
        Self(AtomicI64::new(start))
    }

    pub fn set(&self, now: EpochMs) {
        self.0.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, ms: i64) {
        self.0.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> EpochMs {
        self.0.load(Ordering::SeqCst)
    }
}

/// Runs dispatched work on the calling thread.
#[derive(Default)]
pub struct InlineDispatcher;

impl Dispatcher for InlineDispatcher {
    fn dispatch(&self, work: Box<dyn FnOnce() + Send>) -> bool {
        work();
        true
    }
}
