use std::sync::{Arc, Mutex};

use reftrack_runner::{ReferrerBroadcast, ReferrerHandler, ReferrerReceiver, SchedulingStrategy, StrategyKind};

struct CountingStrategy {
    kind: StrategyKind,
    referrers: Mutex<Vec<String>>,
}

impl CountingStrategy {
    fn new(kind: StrategyKind) -> Arc<Self> {
        Arc::new(Self { kind, referrers: Mutex::new(vec![]) })
    }

    fn seen(&self) -> Vec<String> {
        self.referrers.lock().unwrap().clone()
    }
}

impl SchedulingStrategy for CountingStrategy {
    fn kind(&self) -> StrategyKind {
        self.kind
    }

    fn schedule_tracking(&self, referrer: &str) -> bool {
        self.referrers.lock().unwrap().push(referrer.to_string());
        true
    }
}

struct Handler {
    name: String,
    log: Arc<Mutex<Vec<String>>>,
    behaviour: fn() -> anyhow::Result<()>,
}

impl ReferrerHandler for Handler {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_referrer(&self, _broadcast: &ReferrerBroadcast) -> anyhow::Result<()> {
        self.log.lock().unwrap().push(self.name.clone());
        (self.behaviour)()
    }
}

fn ok() -> anyhow::Result<()> {
    Ok(())
}

fn fail() -> anyhow::Result<()> {
    Err(anyhow::anyhow!("handler refused"))
}

fn boom() -> anyhow::Result<()> {
    panic!("handler bug")
}

struct Setup {
    delegated: Arc<CountingStrategy>,
    self_managed: Arc<CountingStrategy>,
    log: Arc<Mutex<Vec<String>>>,
    receiver: ReferrerReceiver,
}

fn setup(capability: u32) -> Setup {
    let delegated = CountingStrategy::new(StrategyKind::Delegated);
    let self_managed = CountingStrategy::new(StrategyKind::SelfManaged);
    let log = Arc::new(Mutex::new(vec![]));
    let handler = |name: &str, behaviour: fn() -> anyhow::Result<()>| {
        Arc::new(Handler { name: name.to_string(), log: log.clone(), behaviour })
    };
    let receiver = ReferrerReceiver::new("utm_source", "xing", capability, 21, delegated.clone(), self_managed.clone())
        .forward_to(handler("first", ok))
        .forward_to(handler("failing", fail))
        .forward_to(handler("panicking", boom))
        .forward_to(handler("last", ok));
    Setup { delegated, self_managed, log, receiver }
}

fn broadcast(referrer: Option<&str>, forwarding_allowed: bool) -> ReferrerBroadcast {
    ReferrerBroadcast { referrer: referrer.map(str::to_string), forwarding_allowed }
}

const OURS: &str = "utm_source=xing&xing_conversion_id=abc";

#[test]
fn picks_strategy_by_capability() {
    let s = setup(21);
    assert_eq!(s.receiver.on_receive(&broadcast(Some(OURS), false)), Some(true));
    assert_eq!(s.delegated.seen(), vec![OURS.to_string()]);
    assert!(s.self_managed.seen().is_empty());

    let s = setup(19);
    assert_eq!(s.receiver.strategy_kind(), StrategyKind::SelfManaged);
    s.receiver.on_receive(&broadcast(Some(OURS), false));
    assert_eq!(s.self_managed.seen(), vec![OURS.to_string()]);
    assert!(s.delegated.seen().is_empty());
}

#[test]
fn capability_override() {
    let mut s = setup(19);
    s.receiver.set_capability(30);
    assert_eq!(s.receiver.strategy_kind(), StrategyKind::Delegated);
}

#[test]
fn ignores_missing_empty_and_foreign_referrers() {
    let s = setup(21);
    assert_eq!(s.receiver.on_receive(&broadcast(None, false)), None);
    assert_eq!(s.receiver.on_receive(&broadcast(Some("  "), false)), None);
    assert_eq!(s.receiver.on_receive(&broadcast(Some("utm_source=google&x=1"), false)), None);
    assert_eq!(s.receiver.on_receive(&broadcast(Some("xing_conversion_id=abc"), false)), None);
    assert!(s.delegated.seen().is_empty());
    assert!(s.self_managed.seen().is_empty());
}

#[test]
fn forwards_in_order_even_when_handlers_fail() {
    let s = setup(21);
    s.receiver.on_receive(&broadcast(Some(OURS), true));
    assert_eq!(*s.log.lock().unwrap(), vec!["first", "failing", "panicking", "last"]);
}

#[test]
fn forwards_foreign_referrers_too() {
    let s = setup(21);
    assert_eq!(s.receiver.on_receive(&broadcast(Some("utm_source=google"), true)), None);
    assert_eq!(s.log.lock().unwrap().len(), 4);
}

#[test]
fn secondary_entry_point_never_forwards() {
    let s = setup(21);
    assert_eq!(s.receiver.handle_broadcast(&broadcast(Some(OURS), true)), Some(true));
    assert!(s.log.lock().unwrap().is_empty());
    assert_eq!(s.delegated.seen().len(), 1);
}
