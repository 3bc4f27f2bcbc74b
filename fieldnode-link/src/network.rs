//! Network link collaborators and the link supervisor
//!
//! The node does not own its network stack. It drives it through
//! [`NetworkControl`] and arms firmware updates through [`UpdateTransport`];
//! the firmware binary provides the implementations.
//!
//! ## Link Supervisor
//!
//! ```text
//! every 30 s:
//!   link up?            → nothing to do
//!   no stored ssid?     → warn
//!   otherwise           → join with stored credentials (bounded 10 s)
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{info, warn};

use fieldnode_core::constants::{
    KEY_PASSWORD, KEY_SSID, LINK_SUPERVISOR_INTERVAL_MS, NETWORK_JOIN_TIMEOUT_MS,
};
use fieldnode_core::KeyValueStore;

use crate::error::LinkError;

/// Coarse state of the network link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkStatus {
    Idle,
    Connected { ssid: String, rssi: i32 },
    Disconnected,
    ConnectionFailed,
    Unknown,
}

impl LinkStatus {
    /// Status string reported by the `wifi.status` resource
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkStatus::Idle => "idle",
            LinkStatus::Connected { .. } => "connected",
            LinkStatus::Disconnected => "disconnected",
            LinkStatus::ConnectionFailed => "connection_failed",
            LinkStatus::Unknown => "unknown",
        }
    }

    pub fn is_up(&self) -> bool {
        matches!(self, LinkStatus::Connected { .. })
    }
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One network found by a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEntry {
    pub ssid: String,
    pub rssi: i32,
}

/// Established link after a successful join
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkInfo {
    pub ssid: String,
    pub rssi: i32,
}

/// Network stack operations
#[async_trait]
pub trait NetworkControl: Send + Sync {
    async fn scan(&self) -> Result<Vec<ScanEntry>, LinkError>;

    /// Join a network. Callers bound the wait; see [`join_network`].
    async fn connect(&self, ssid: &str, password: &str) -> Result<LinkInfo, LinkError>;

    async fn disconnect(&self) -> Result<(), LinkError>;

    fn status(&self) -> LinkStatus;

    fn is_link_up(&self) -> bool {
        self.status().is_up()
    }
}

/// Firmware-update transport
pub trait UpdateTransport: Send + Sync {
    /// Make the transport ready to accept an update
    fn arm(&self) -> Result<(), LinkError>;

    fn is_armed(&self) -> bool;
}

/// Join `ssid` within the standard bound. On success the credentials are
/// persisted and the update transport is armed.
pub async fn join_network(
    network: &dyn NetworkControl,
    store: &dyn KeyValueStore,
    updates: &dyn UpdateTransport,
    ssid: &str,
    password: &str,
) -> Result<LinkInfo, LinkError> {
    info!("joining network {}", ssid);
    let bound = Duration::from_millis(NETWORK_JOIN_TIMEOUT_MS);
    let link = match tokio::time::timeout(bound, network.connect(ssid, password)).await {
        Ok(result) => result?,
        Err(_) => {
            warn!("join of {} timed out", ssid);
            return Err(LinkError::JoinTimeout(NETWORK_JOIN_TIMEOUT_MS));
        }
    };

    if let Err(e) = store.put_string(KEY_SSID, ssid) {
        warn!("could not persist ssid: {}", e);
    }
    if let Err(e) = store.put_string(KEY_PASSWORD, password) {
        warn!("could not persist password: {}", e);
    }
    if let Err(e) = updates.arm() {
        warn!("{}", e);
    }

    info!("joined {} (rssi {})", link.ssid, link.rssi);
    Ok(link)
}

/// Result of one supervisor pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorAction {
    LinkUp,
    NoCredentials,
    Reconnected(LinkInfo),
    ReconnectFailed,
}

/// Periodic reconnect with stored credentials
pub struct LinkSupervisor {
    network: Arc<dyn NetworkControl>,
    store: Arc<dyn KeyValueStore>,
    updates: Arc<dyn UpdateTransport>,
    interval: Duration,
}

impl LinkSupervisor {
    pub fn new(
        network: Arc<dyn NetworkControl>,
        store: Arc<dyn KeyValueStore>,
        updates: Arc<dyn UpdateTransport>,
    ) -> Self {
        Self {
            network,
            store,
            updates,
            interval: Duration::from_millis(LINK_SUPERVISOR_INTERVAL_MS),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub async fn check_once(&self) -> SupervisorAction {
        if self.network.is_link_up() {
            return SupervisorAction::LinkUp;
        }

        let ssid = match self.store.get_string(KEY_SSID) {
            Ok(Some(ssid)) if !ssid.is_empty() => ssid,
            Ok(_) => {
                warn!("link down and no stored network credentials");
                return SupervisorAction::NoCredentials;
            }
            Err(e) => {
                warn!("could not read stored ssid: {}", e);
                return SupervisorAction::NoCredentials;
            }
        };
        let password = self.store.get_string(KEY_PASSWORD).ok().flatten().unwrap_or_default();

        match join_network(
            self.network.as_ref(),
            self.store.as_ref(),
            self.updates.as_ref(),
            &ssid,
            &password,
        )
        .await
        {
            Ok(link) => SupervisorAction::Reconnected(link),
            Err(e) => {
                warn!("reconnect to {} failed: {}", ssid, e);
                SupervisorAction::ReconnectFailed
            }
        }
    }

    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            ticker.tick().await;
            self.check_once().await;
        }
    }
}
