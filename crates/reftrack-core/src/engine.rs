use crate::{backoff_millis, AttemptRecord, Command, FailureClass, Outcome, ResultCode};

/// States of one coordinator run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Step {
    Start,
    CheckConnectivity,
    CallEndpoint,
    Defer(ResultCode),
    Done(Outcome),
}

/// Output of the planner: where the run ends and what the shell must apply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Plan {
    pub outcome: Outcome,
    pub commands: Vec<Command>,
}

/// No reachability means the endpoint is not called at all.
pub fn after_connectivity_check(reachable: bool) -> Step {
    if reachable {
        Step::CallEndpoint
    } else {
        Step::Defer(ResultCode::FailedConnectivity)
    }
}

pub fn after_call(result: ResultCode) -> Step {
    if result.is_terminal() {
        Step::Done(Outcome::Completed(result))
    } else {
        Step::Defer(result)
    }
}

/// Terminal cleanup: drop the record and stop listening for connectivity.
pub fn plan_finish(result: ResultCode) -> Plan {
    Plan {
        outcome: Outcome::Completed(result),
        commands: vec![Command::ClearRecord, Command::SetListening(false)],
    }
}

/// Plan the deferral of a retryable failure.
///
/// `attempts_before` counts attempts made before this one. Passing the ceiling
/// clears all state without any further signal.
pub fn plan_deferral(referrer: &str, attempts_before: u32, reason: ResultCode, max_attempts: u32) -> Plan {
    let class = match reason.failure_class() {
        Some(class @ (FailureClass::TransientNetwork | FailureClass::TransientServer)) => class,
        None | Some(FailureClass::Permanent) => return plan_finish(reason),
    };

    let attempt = attempts_before.saturating_add(1);
    if attempt > max_attempts {
        return Plan {
            outcome: Outcome::Exhausted { reason },
            commands: vec![Command::ClearRecord, Command::SetListening(false)],
        };
    }

    let mut commands = vec![Command::SaveRecord(AttemptRecord {
        referrer: referrer.to_string(),
        attempt_count: attempt,
        last_failure_reason: reason,
    })];

    match class {
        FailureClass::TransientNetwork => commands.push(Command::SetListening(true)),
        _ => commands.push(Command::ScheduleRetry {
            referrer: referrer.to_string(),
            attempt,
            delay_ms: backoff_millis(attempt),
        }),
    }

    Plan {
        outcome: Outcome::Deferred { attempt, reason },
        commands,
    }
}
