use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use crate::host::HostEvent;
use crate::util::{lock, Clock, EpochMs};

/// Fire-once timer that re-enters the coordinator with `(referrer, attempt)`.
///
/// Holds at most one pending retry: scheduling replaces whatever was pending.
pub trait RetryTimer: Send + Sync {
    fn schedule_at(&self, at_ms: EpochMs, referrer: &str, attempt: u32) -> anyhow::Result<()>;
    fn cancel(&self);
    fn is_pending(&self) -> bool;
}

pub struct TokioRetryTimer {
    clock: Arc<dyn Clock>,
    events: UnboundedSender<HostEvent>,
    handle: Handle,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl TokioRetryTimer {
    pub fn new(clock: Arc<dyn Clock>, events: UnboundedSender<HostEvent>, handle: Handle) -> Self {
        Self {
            clock,
            events,
            handle,
            pending: Mutex::new(None),
        }
    }
}

impl RetryTimer for TokioRetryTimer {
    fn schedule_at(&self, at_ms: EpochMs, referrer: &str, attempt: u32) -> anyhow::Result<()> {
        let wait = Duration::from_millis(at_ms.saturating_sub(self.clock.now_ms()).max(0) as u64);
        tracing::info!(attempt, wait_ms = wait.as_millis() as u64, "retry timer set");

        let events = self.events.clone();
        let referrer = referrer.to_string();
        let task = self.handle.spawn(async move {
            tokio::time::sleep(wait).await;
            let _ = events.send(HostEvent::TimerFired { referrer, attempt });
        });

        if let Some(old) = lock(&self.pending).replace(task) {
            old.abort();
        }
        Ok(())
    }

    fn cancel(&self) {
        if let Some(h) = lock(&self.pending).take() {
            h.abort();
        }
    }

    fn is_pending(&self) -> bool {
        lock(&self.pending).as_ref().is_some_and(|h| !h.is_finished())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::SystemClock;

    fn timer() -> (TokioRetryTimer, tokio::sync::mpsc::UnboundedReceiver<HostEvent>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (TokioRetryTimer::new(Arc::new(SystemClock), tx, Handle::current()), rx)
    }

    #[tokio::test]
    async fn fires_once_with_referrer_and_attempt() {
        let (t, mut rx) = timer();
        t.schedule_at(crate::util::now_ms() + 20, "r", 3).unwrap();
        assert!(t.is_pending());

        let ev = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap();
        assert_eq!(ev, Some(HostEvent::TimerFired { referrer: "r".into(), attempt: 3 }));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!t.is_pending());
    }

    #[tokio::test]
    async fn rescheduling_replaces_pending_timer() {
        let (t, mut rx) = timer();
        t.schedule_at(crate::util::now_ms() + 30, "r", 1).unwrap();
        t.schedule_at(crate::util::now_ms() + 30, "r", 2).unwrap();

        let ev = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap();
        assert_eq!(ev, Some(HostEvent::TimerFired { referrer: "r".into(), attempt: 2 }));
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn cancel_prevents_firing() {
        let (t, mut rx) = timer();
        t.schedule_at(crate::util::now_ms() + 20, "r", 1).unwrap();
        t.cancel();
        assert!(!t.is_pending());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn past_deadline_fires_immediately() {
        let (t, mut rx) = timer();
        t.schedule_at(0, "r", 5).unwrap();
        let ev = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert_eq!(ev, Some(HostEvent::TimerFired { referrer: "r".into(), attempt: 5 }));
    }
}
