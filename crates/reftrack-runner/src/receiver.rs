use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use reftrack_core::Referrer;

use crate::strategy::{select_strategy, SchedulingStrategy, StrategyKind};

/// Install broadcast as delivered to a receiver.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReferrerBroadcast {
    pub referrer: Option<String>,
    /// Only the primary receiver forwards to other handlers.
    pub forwarding_allowed: bool,
}

/// Other receivers interested in the same broadcast, registered up front.
pub trait ReferrerHandler: Send + Sync {
    fn name(&self) -> &str;
    fn on_referrer(&self, broadcast: &ReferrerBroadcast) -> anyhow::Result<()>;
}

/// Filters install broadcasts, starts tracking and forwards to other handlers.
pub struct ReferrerReceiver {
    source_param: String,
    source_value: String,
    capability: u32,
    min_delegated: u32,
    delegated: Arc<dyn SchedulingStrategy>,
    self_managed: Arc<dyn SchedulingStrategy>,
    handlers: Vec<Arc<dyn ReferrerHandler>>,
}

impl ReferrerReceiver {
    pub fn new(
        source_param: impl Into<String>,
        source_value: impl Into<String>,
        capability: u32,
        min_delegated: u32,
        delegated: Arc<dyn SchedulingStrategy>,
        self_managed: Arc<dyn SchedulingStrategy>,
    ) -> Self {
        Self {
            source_param: source_param.into(),
            source_value: source_value.into(),
            capability,
            min_delegated,
            delegated,
            self_managed,
            handlers: Vec::new(),
        }
    }

    /// Handlers run in registration order.
    pub fn forward_to(mut self, handler: Arc<dyn ReferrerHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn set_capability(&mut self, capability: u32) {
        self.capability = capability;
    }

    pub fn strategy_kind(&self) -> StrategyKind {
        select_strategy(self.capability, self.min_delegated)
    }

    /// Returns `Some(accepted)` when tracking was started, `None` when the
    /// broadcast was ignored.
    pub fn on_receive(&self, broadcast: &ReferrerBroadcast) -> Option<bool> {
        let started = self.start_tracking(broadcast);
        if broadcast.forwarding_allowed {
            self.forward(broadcast);
        }
        started
    }

    /// Entry point for a receiver that is not the primary one: never forwards.
    pub fn handle_broadcast(&self, broadcast: &ReferrerBroadcast) -> Option<bool> {
        let secondary = ReferrerBroadcast {
            referrer: broadcast.referrer.clone(),
            forwarding_allowed: false,
        };
        self.on_receive(&secondary)
    }

    fn start_tracking(&self, broadcast: &ReferrerBroadcast) -> Option<bool> {
        let referrer = Referrer::new(broadcast.referrer.clone().unwrap_or_default());
        if referrer.is_empty() {
            tracing::debug!("broadcast without referrer, ignoring");
            return None;
        }
        if !referrer.has_param_value(&self.source_param, &self.source_value) {
            tracing::debug!("referrer from another source, ignoring");
            return None;
        }

        let strategy = match self.strategy_kind() {
            StrategyKind::Delegated => &self.delegated,
            StrategyKind::SelfManaged => &self.self_managed,
        };
        tracing::info!(strategy = ?strategy.kind(), "starting install tracking");
        Some(strategy.schedule_tracking(referrer.as_str()))
    }

    fn forward(&self, broadcast: &ReferrerBroadcast) {
        for handler in &self.handlers {
            tracing::debug!(handler = handler.name(), "forwarding referrer");
            match catch_unwind(AssertUnwindSafe(|| handler.on_referrer(broadcast))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(handler = handler.name(), "referrer handler failed: {e:#}"),
                Err(_) => tracing::warn!(handler = handler.name(), "referrer handler panicked"),
            }
        }
    }
}

/// Handler that only logs what it receives.
pub struct LoggingHandler {
    name: String,
}

impl LoggingHandler {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl ReferrerHandler for LoggingHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_referrer(&self, broadcast: &ReferrerBroadcast) -> anyhow::Result<()> {
        tracing::info!(handler = %self.name, referrer = ?broadcast.referrer, "referrer forwarded");
        Ok(())
    }
}
