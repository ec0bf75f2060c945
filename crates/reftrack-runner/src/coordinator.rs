use std::sync::Arc;

use anyhow::Result;
use reftrack_core::{after_call, after_connectivity_check, plan_deferral, plan_finish, Command, Outcome, Plan, Step};
use reftrack_storage::AttemptStore;
use reftrack_tracker::TrackerClient;

use crate::gate::ConnectivityGate;
use crate::timer::RetryTimer;
use crate::util::Clock;

/// Drives one tracking attempt from connectivity check to the next resume
/// point, applying the planned store, listener and timer commands.
pub struct AttemptCoordinator {
    tracker: Arc<dyn TrackerClient>,
    store: Arc<dyn AttemptStore>,
    gate: Arc<dyn ConnectivityGate>,
    timer: Arc<dyn RetryTimer>,
    clock: Arc<dyn Clock>,
    max_attempts: u32,
}

impl AttemptCoordinator {
    pub fn new(
        tracker: Arc<dyn TrackerClient>,
        store: Arc<dyn AttemptStore>,
        gate: Arc<dyn ConnectivityGate>,
        timer: Arc<dyn RetryTimer>,
        clock: Arc<dyn Clock>,
        max_attempts: u32,
    ) -> Self {
        Self {
            tracker,
            store,
            gate,
            timer,
            clock,
            max_attempts,
        }
    }

    pub fn store(&self) -> &Arc<dyn AttemptStore> {
        &self.store
    }

    pub fn gate(&self) -> &Arc<dyn ConnectivityGate> {
        &self.gate
    }

    pub fn timer(&self) -> &Arc<dyn RetryTimer> {
        &self.timer
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Run one attempt. `attempts_before` is 0 for a fresh referrer and the
    /// stored count when resuming.
    ///
    /// Errors come only from the store or timer; the tracker never fails.
    pub fn run(&self, referrer: &str, attempts_before: u32) -> Result<Outcome> {
        let mut step = Step::Start;
        loop {
            step = match step {
                Step::Start => {
                    tracing::debug!(attempts_before, "tracking attempt started");
                    Step::CheckConnectivity
                }
                Step::CheckConnectivity => {
                    let reachable = self.gate.is_reachable(true);
                    if !reachable {
                        tracing::info!("no connectivity, deferring");
                    }
                    after_connectivity_check(reachable)
                }
                Step::CallEndpoint => {
                    let rc = self.tracker.attempt(referrer);
                    match after_call(rc) {
                        Step::Done(_) => self.apply(referrer, plan_finish(rc))?,
                        next => next,
                    }
                }
                Step::Defer(reason) => {
                    self.apply(referrer, plan_deferral(referrer, attempts_before, reason, self.max_attempts))?
                }
                Step::Done(outcome) => {
                    log_outcome(&outcome);
                    return Ok(outcome);
                }
            };
        }
    }

    fn apply(&self, referrer: &str, plan: Plan) -> Result<Step> {
        for cmd in plan.commands {
            match cmd {
                Command::ClearRecord => self.store.clear()?,
                Command::SaveRecord(record) => self.store.save(&record)?,
                Command::SetListening(enabled) => self.gate.set_listening(enabled),
                Command::ScheduleRetry { attempt, delay_ms, .. } => {
                    let at = self.clock.now_ms().saturating_add(delay_ms.min(i64::MAX as u64) as i64);
                    self.timer.schedule_at(at, referrer, attempt)?;
                }
            }
        }
        Ok(Step::Done(plan.outcome))
    }
}

fn log_outcome(outcome: &Outcome) {
    match outcome {
        Outcome::Completed(rc) => tracing::info!(result = ?rc, "tracking finished"),
        Outcome::Exhausted { reason } => tracing::info!(last = ?reason, "retries exhausted, giving up"),
        Outcome::Deferred { attempt, reason } => tracing::info!(attempt, reason = ?reason, "tracking deferred"),
    }
}
