use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use reftrack_core::{AttemptRecord, Outcome, ResultCode, MAX_ATTEMPTS};
use reftrack_storage::{AttemptStore, InMemoryAttemptStore};
use serde::Deserialize;

use crate::coordinator::AttemptCoordinator;
use crate::fakes::{FakeGate, InlineDispatcher, ManualClock, RecordingTimer, ScriptedTracker};
use crate::gate::ConnectivityGate;
use crate::strategy::SelfManagedStrategy;
use crate::timer::RetryTimer;
use crate::util::Clock;

/// Upper bound on resume events driven per scenario.
const MAX_STEPS: usize = 64;

#[derive(Debug, Deserialize)]
pub struct Scenario {
    pub scenario_id: String,
    pub referrer: String,
    /// One value per reachability probe; the last one repeats.
    pub reachability: Vec<bool>,
    /// One result per tracker call; the last one repeats.
    pub responses: Vec<ResultCode>,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    pub expected: ScenarioExpected,
}

#[derive(Debug, Deserialize)]
pub struct ScenarioExpected {
    /// `done`, `exhausted` or `pending`.
    pub final_state: String,
    pub calls: usize,
    #[serde(default)]
    pub timer_delays_secs: Vec<u64>,
    #[serde(default)]
    pub reconnects: usize,
}

fn default_max_attempts() -> u32 {
    MAX_ATTEMPTS
}

#[derive(Debug)]
pub struct ScenarioResult {
    pub last_outcome: Option<Outcome>,
    pub calls: usize,
    /// Delay of every retry timer, in scheduling order.
    pub timer_delays_ms: Vec<u64>,
    pub reconnects: usize,
    pub listening: bool,
    pub timer_pending: bool,
    pub record: Option<AttemptRecord>,
}

impl ScenarioResult {
    pub fn final_state(&self) -> &'static str {
        match &self.last_outcome {
            Some(Outcome::Completed(_)) => "done",
            Some(Outcome::Exhausted { .. }) => "exhausted",
            _ => "pending",
        }
    }
}

pub fn load_scenario(dir: &Path) -> Result<Scenario> {
    let p = dir.join("scenario.yaml");
    let s = std::fs::read_to_string(&p).with_context(|| format!("read scenario.yaml: {}", p.display()))?;
    let scenario: Scenario = serde_yaml::from_str(&s).with_context(|| "parse scenario.yaml")?;
    Ok(scenario)
}

/// Run the self-managed strategy against scripted fakes.
///
/// Timers fire immediately (the manual clock jumps to their deadline) and an
/// armed connectivity listener is notified right away; reachability itself
/// comes from the script.
pub fn simulate(dir: &Path) -> Result<ScenarioResult> {
    let scenario = load_scenario(dir)?;

    let tracker = Arc::new(ScriptedTracker::new(scenario.responses.clone()));
    let store = Arc::new(InMemoryAttemptStore::new());
    let gate = Arc::new(FakeGate::new(scenario.reachability.clone()));
    let timer = Arc::new(RecordingTimer::default());
    let clock = Arc::new(ManualClock::new(0));
    let coordinator = Arc::new(AttemptCoordinator::new(
        tracker.clone(),
        store.clone(),
        gate.clone(),
        timer.clone(),
        clock.clone(),
        scenario.max_attempts,
    ));
    let strategy = SelfManagedStrategy::new(coordinator, Arc::new(InlineDispatcher));

    let mut last_outcome = strategy.start(&scenario.referrer);
    if last_outcome.is_none() {
        return Err(anyhow!("{}: first attempt did not run", scenario.scenario_id));
    }

    let mut timer_delays_ms = Vec::new();
    let mut reconnects = 0;
    for _ in 0..MAX_STEPS {
        let outcome = if let Some((at, referrer, attempt)) = timer.fire() {
            timer_delays_ms.push(at.saturating_sub(clock.now_ms()).max(0) as u64);
            clock.set(at);
            strategy.on_timer(&referrer, attempt)
        } else if gate.is_listening() {
            reconnects += 1;
            strategy.on_reachable()
        } else {
            break;
        };
        let settled = outcome.as_ref().is_some_and(Outcome::is_final);
        if outcome.is_some() {
            last_outcome = outcome;
        }
        if settled {
            break;
        }
    }

    Ok(ScenarioResult {
        last_outcome,
        calls: tracker.calls(),
        timer_delays_ms,
        reconnects,
        listening: gate.is_listening(),
        timer_pending: timer.is_pending(),
        record: store.load()?,
    })
}
