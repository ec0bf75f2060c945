use std::path::Path;
use std::time::Duration;

use reftrack_core::{AttemptRecord, Outcome, ResultCode};
use reftrack_runner::{Config, HostRuntime, ReferrerBroadcast, StrategyKind};
use reftrack_storage::AttemptStore;
use reftrack_storage_sqlite::SqliteAttemptStore;
use tempfile::{tempdir, TempDir};
use tokio::runtime::Runtime;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const REFERRER: &str = "utm_source=xing&xing_conversion_id=abc";

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread().enable_all().build().unwrap()
}

fn set_link(root: &Path, state: &str) {
    let dir = root.join("sys").join("eth0");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("operstate"), format!("{state}\n")).unwrap();
}

fn config(dir: &TempDir, server: &MockServer, capability: u32) -> Config {
    let mut cfg = Config::default_for_app("com.example.app");
    cfg.app.app_version = "1.2.0".into();
    cfg.app.device = "generic".into();
    cfg.app.os_release = "6.1".into();
    cfg.app.platform_capability = capability;
    cfg.endpoint.url = format!("{}/rest/xas/ads/install", server.uri());
    cfg.endpoint.timeout_secs = 2;
    cfg.connectivity.sysfs_root = dir.path().join("sys").to_string_lossy().into_owned();
    cfg.connectivity.poll_interval_ms = 20;
    cfg.retry.delegated_base_interval_ms = 50;
    cfg
}

fn start_server(rt: &Runtime) -> MockServer {
    rt.block_on(async {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/xas/ads/install"))
            .and(query_param("googleadid", "abc"))
            .and(query_param("appid", "com.example.app"))
            .and(header("User-Agent", "XING-TRACK-ANDROID/1.2.0 Device/generic OS Version/6.1"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        server
    })
}

fn run_until_idle(rt: &Runtime, host: &mut HostRuntime) {
    rt.block_on(async { tokio::time::timeout(Duration::from_secs(15), host.run_until_idle()).await })
        .expect("host never went idle")
        .unwrap();
}

fn requests(rt: &Runtime, server: &MockServer) -> usize {
    rt.block_on(server.received_requests()).map(|r| r.len()).unwrap_or(0)
}

fn primary(referrer: &str) -> ReferrerBroadcast {
    ReferrerBroadcast { referrer: Some(referrer.to_string()), forwarding_allowed: true }
}

#[test]
fn self_managed_host_tracks_once_and_goes_idle() {
    let rt = runtime();
    let dir = tempdir().unwrap();
    set_link(dir.path(), "up");
    let server = start_server(&rt);

    let mut host = HostRuntime::build(&config(&dir, &server, 19), dir.path(), rt.handle().clone()).unwrap();
    assert_eq!(host.receiver().strategy_kind(), StrategyKind::SelfManaged);
    assert_eq!(host.receiver().on_receive(&primary(REFERRER)), Some(true));
    run_until_idle(&rt, &mut host);

    assert_eq!(host.pending_record().unwrap(), None);
    assert!(host.is_idle());
    assert_eq!(requests(&rt, &server), 1);
    drop(host);
}

#[test]
fn delegated_host_tracks_through_task_queue() {
    let rt = runtime();
    let dir = tempdir().unwrap();
    set_link(dir.path(), "up");
    let server = start_server(&rt);

    let mut host = HostRuntime::build(&config(&dir, &server, 30), dir.path(), rt.handle().clone()).unwrap();
    assert_eq!(host.receiver().strategy_kind(), StrategyKind::Delegated);
    assert_eq!(host.receiver().on_receive(&primary(REFERRER)), Some(true));
    run_until_idle(&rt, &mut host);

    assert_eq!(requests(&rt, &server), 1);
    // the delegated path never writes the attempt store
    assert_eq!(host.pending_record().unwrap(), None);
    drop(host);
}

#[test]
fn waits_offline_then_tracks_when_link_comes_up() {
    let rt = runtime();
    let dir = tempdir().unwrap();
    set_link(dir.path(), "down");
    let server = start_server(&rt);

    let mut host = HostRuntime::build(&config(&dir, &server, 19), dir.path(), rt.handle().clone()).unwrap();
    host.receiver().on_receive(&primary(REFERRER));

    let root = dir.path().to_path_buf();
    rt.spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        set_link(&root, "up");
    });
    run_until_idle(&rt, &mut host);

    assert_eq!(requests(&rt, &server), 1);
    assert_eq!(host.pending_record().unwrap(), None);
    drop(host);
}

#[test]
fn server_error_retries_on_timer() {
    let rt = runtime();
    let dir = tempdir().unwrap();
    set_link(dir.path(), "up");
    let server = rt.block_on(async {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET")).respond_with(ResponseTemplate::new(200)).mount(&server).await;
        server
    });

    let mut host = HostRuntime::build(&config(&dir, &server, 19), dir.path(), rt.handle().clone()).unwrap();
    host.receiver().on_receive(&primary(REFERRER));
    run_until_idle(&rt, &mut host);

    assert_eq!(requests(&rt, &server), 2);
    assert_eq!(host.pending_record().unwrap(), None);
    drop(host);
}

#[test]
fn restart_resumes_stored_connectivity_failure() {
    let rt = runtime();
    let dir = tempdir().unwrap();
    set_link(dir.path(), "up");
    let server = start_server(&rt);
    let cfg = config(&dir, &server, 19);

    SqliteAttemptStore::open(&cfg.db_path(dir.path()))
        .unwrap()
        .save(&AttemptRecord {
            referrer: REFERRER.to_string(),
            attempt_count: 3,
            last_failure_reason: ResultCode::FailedConnectivity,
        })
        .unwrap();

    let host = HostRuntime::build(&cfg, dir.path(), rt.handle().clone()).unwrap();
    assert_eq!(host.resume_pending(), Some(Outcome::Completed(ResultCode::Success)));
    assert_eq!(host.pending_record().unwrap(), None);
    assert_eq!(requests(&rt, &server), 1);
    drop(host);
}
