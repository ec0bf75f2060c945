use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use crate::host::HostEvent;
use crate::util::lock;

/// Network reachability, queried fresh on every call.
pub trait ConnectivityGate: Send + Sync {
    /// With `accept_connecting`, a link that is still coming up counts as reachable.
    fn is_reachable(&self, accept_connecting: bool) -> bool;

    /// Arm or disarm the reconnect subscription. Idempotent both ways; an
    /// armed subscription fires once and then disarms itself.
    fn set_listening(&self, enabled: bool);

    fn is_listening(&self) -> bool;
}

/// Reads link state from a sysfs-style tree (`<root>/<iface>/operstate`).
/// Loopback is ignored. `up` is connected, `dormant` is connecting.
pub fn probe_sysfs(root: &Path, accept_connecting: bool) -> bool {
    let Ok(entries) = std::fs::read_dir(root) else {
        return false;
    };
    entries.flatten().any(|entry| {
        if entry.file_name() == "lo" {
            return false;
        }
        let state = std::fs::read_to_string(entry.path().join("operstate")).unwrap_or_default();
        match state.trim() {
            "up" => true,
            "dormant" => accept_connecting,
            _ => false,
        }
    })
}

pub struct SysfsConnectivityGate {
    root: PathBuf,
    poll_interval: Duration,
    events: UnboundedSender<HostEvent>,
    handle: Handle,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl SysfsConnectivityGate {
    pub fn new(root: PathBuf, poll_interval: Duration, events: UnboundedSender<HostEvent>, handle: Handle) -> Self {
        Self {
            root,
            poll_interval,
            events,
            handle,
            listener: Mutex::new(None),
        }
    }
}

impl ConnectivityGate for SysfsConnectivityGate {
    fn is_reachable(&self, accept_connecting: bool) -> bool {
        probe_sysfs(&self.root, accept_connecting)
    }

    fn set_listening(&self, enabled: bool) {
        let mut slot = lock(&self.listener);
        if !enabled {
            if let Some(h) = slot.take() {
                tracing::debug!("disabling connectivity listener");
                h.abort();
            }
            return;
        }
        if slot.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }

        tracing::debug!("enabling connectivity listener");
        let root = self.root.clone();
        let events = self.events.clone();
        let poll = self.poll_interval;
        *slot = Some(self.handle.spawn(async move {
            loop {
                tokio::time::sleep(poll).await;
                if probe_sysfs(&root, false) {
                    tracing::info!("connectivity is back");
                    let _ = events.send(HostEvent::Reachable);
                    break;
                }
            }
        }));
    }

    fn is_listening(&self) -> bool {
        lock(&self.listener).as_ref().is_some_and(|h| !h.is_finished())
    }
}
