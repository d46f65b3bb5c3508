//! Network reachability.
//!
//! [`NetworkMonitor`] watches the host's interfaces with `netwatcher` and
//! republishes the result as a [`ConnectivityStatus`] on a `tokio::sync::watch`
//! channel. The executor only depends on the [`Connectivity`] trait, so tests
//! and embedders can drive the status by hand with [`ManualConnectivity`].
//!
//! # Example
//!
//! ```ignore
//! use tidecast_net::connectivity::{Connectivity, NetworkMonitor};
//!
//! let monitor = NetworkMonitor::new();
//! monitor.start()?;
//!
//! let mut changes = monitor.subscribe();
//! while changes.changed().await.is_ok() {
//!     println!("now {:?}", *changes.borrow());
//! }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::error::{NetworkError, Result};
use crate::logger::targets;

/// Kind of link carrying traffic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConnectionKind {
    /// Wireless LAN.
    Wifi,
    /// Mobile data.
    Cellular,
    /// Ethernet or similar.
    Wired,
    /// Anything else (VPN, bridge, unknown naming).
    Other,
}

/// Last observed reachability.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ConnectivityStatus {
    /// Nothing observed yet.
    #[default]
    Unknown,
    /// A usable path exists.
    Connected(ConnectionKind),
    /// No usable path.
    Disconnected,
}

impl ConnectivityStatus {
    /// Whether a request should be attempted.
    ///
    /// `Unknown` counts as reachable: before the first observation the
    /// transport is the better judge.
    pub fn is_reachable(self) -> bool {
        !matches!(self, Self::Disconnected)
    }
}

/// A source of reachability information.
#[async_trait]
pub trait Connectivity: Send + Sync {
    /// Point-in-time check reflecting the last observed status.
    async fn is_connected(&self) -> bool {
        self.status().is_reachable()
    }

    /// Last observed status.
    fn status(&self) -> ConnectivityStatus;

    /// Stream of status transitions.
    fn subscribe(&self) -> watch::Receiver<ConnectivityStatus>;
}

/// Reachability driven by the caller.
#[derive(Debug)]
pub struct ManualConnectivity {
    status: watch::Sender<ConnectivityStatus>,
}

impl ManualConnectivity {
    /// Start with the given status.
    pub fn new(status: ConnectivityStatus) -> Self {
        let (status, _) = watch::channel(status);
        Self { status }
    }

    /// Start connected over an unspecified link.
    pub fn connected() -> Self {
        Self::new(ConnectivityStatus::Connected(ConnectionKind::Other))
    }

    /// Start disconnected.
    pub fn disconnected() -> Self {
        Self::new(ConnectivityStatus::Disconnected)
    }

    /// Publish a new status. Subscribers are only woken on an actual change.
    pub fn set_status(&self, status: ConnectivityStatus) {
        publish(&self.status, status);
    }
}

impl Default for ManualConnectivity {
    fn default() -> Self {
        Self::new(ConnectivityStatus::Unknown)
    }
}

#[async_trait]
impl Connectivity for ManualConnectivity {
    fn status(&self) -> ConnectivityStatus {
        *self.status.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<ConnectivityStatus> {
        self.status.subscribe()
    }
}

/// Monitors the host's network interfaces.
///
/// The status stays `Unknown` until [`start`](Self::start) is called. Stopping
/// (or dropping) the monitor releases the platform watcher; the last observed
/// status is kept.
pub struct NetworkMonitor {
    status: Arc<watch::Sender<ConnectivityStatus>>,
    inner: Mutex<MonitorInner>,
}

struct MonitorInner {
    /// Dropping the handle stops the watcher.
    watcher: Option<netwatcher::WatchHandle>,
}

impl NetworkMonitor {
    /// Create a stopped monitor.
    pub fn new() -> Self {
        let (status, _) = watch::channel(ConnectivityStatus::Unknown);
        Self {
            status: Arc::new(status),
            inner: Mutex::new(MonitorInner { watcher: None }),
        }
    }

    /// Begin observing interface changes. Idempotent.
    pub fn start(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.watcher.is_some() {
            return Ok(());
        }

        publish(&self.status, probe_interfaces());

        let status = Arc::clone(&self.status);
        let handle = netwatcher::watch_interfaces(move |update| {
            tracing::trace!(
                target: targets::CONNECTIVITY,
                added = update.diff.added.len(),
                removed = update.diff.removed.len(),
                "interface update"
            );
            publish(&status, probe_interfaces());
        })
        .map_err(|e| NetworkError::Unknown(format!("failed to watch interfaces: {e}")))?;

        inner.watcher = Some(handle);
        tracing::debug!(target: targets::CONNECTIVITY, "network monitor started");
        Ok(())
    }

    /// Stop observing. Idempotent.
    pub fn stop(&self) {
        if self.inner.lock().watcher.take().is_some() {
            tracing::debug!(target: targets::CONNECTIVITY, "network monitor stopped");
        }
    }

    /// Check if the monitor is currently running.
    pub fn is_running(&self) -> bool {
        self.inner.lock().watcher.is_some()
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for NetworkMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for NetworkMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkMonitor")
            .field("status", &*self.status.borrow())
            .field("running", &self.is_running())
            .finish()
    }
}

#[async_trait]
impl Connectivity for NetworkMonitor {
    fn status(&self) -> ConnectivityStatus {
        *self.status.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<ConnectivityStatus> {
        self.status.subscribe()
    }
}

fn publish(sender: &watch::Sender<ConnectivityStatus>, next: ConnectivityStatus) {
    let changed = sender.send_if_modified(|current| {
        if *current == next {
            return false;
        }
        *current = next;
        true
    });
    if changed {
        tracing::info!(target: targets::CONNECTIVITY, status = ?next, "connectivity changed");
    }
}

/// The parts of an interface that matter for reachability.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct InterfaceSnapshot {
    pub name: String,
    pub is_up: bool,
    pub is_loopback: bool,
    pub has_addresses: bool,
}

impl InterfaceSnapshot {
    fn is_usable(&self) -> bool {
        self.is_up && !self.is_loopback && self.has_addresses
    }
}

fn probe_interfaces() -> ConnectivityStatus {
    let default_name = netdev::get_default_interface().ok().map(|iface| iface.name);
    let snapshots: Vec<InterfaceSnapshot> = netdev::get_interfaces()
        .into_iter()
        .map(|iface| InterfaceSnapshot {
            is_up: iface.is_up(),
            is_loopback: iface.is_loopback(),
            has_addresses: !iface.ipv4.is_empty() || !iface.ipv6.is_empty(),
            name: iface.name,
        })
        .collect();
    status_from(&snapshots, default_name.as_deref())
}

/// Derive a status, preferring the default route's interface for the kind.
pub(crate) fn status_from(
    interfaces: &[InterfaceSnapshot],
    default_name: Option<&str>,
) -> ConnectivityStatus {
    let preferred = default_name
        .and_then(|name| interfaces.iter().find(|i| i.name == name && i.is_usable()));
    match preferred.or_else(|| interfaces.iter().find(|i| i.is_usable())) {
        Some(iface) => ConnectivityStatus::Connected(classify(&iface.name)),
        None => ConnectivityStatus::Disconnected,
    }
}

/// Guess the link kind from conventional interface names.
///
/// Names do not reliably tell Wi-Fi from Ethernet: on Apple platforms `en0`
/// is usually the Wi-Fi interface but is reported as `Wired` here.
pub(crate) fn classify(name: &str) -> ConnectionKind {
    let name = name.to_ascii_lowercase();
    const WIFI: &[&str] = &["wl", "wifi", "ath", "ra"];
    const CELLULAR: &[&str] = &["rmnet", "wwan", "pdp_ip", "ccmni", "usb"];
    const WIRED: &[&str] = &["eth", "en", "em", "eno", "ens", "enp"];

    let has_prefix = |prefixes: &[&str]| prefixes.iter().any(|p| name.starts_with(p));
    if has_prefix(WIFI) {
        ConnectionKind::Wifi
    } else if has_prefix(CELLULAR) {
        ConnectionKind::Cellular
    } else if has_prefix(WIRED) {
        ConnectionKind::Wired
    } else {
        ConnectionKind::Other
    }
}
