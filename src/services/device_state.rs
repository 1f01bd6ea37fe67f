use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use tokio::sync::watch;

use crate::devices::{DiagFlagViews, SlaveData};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Disconnected => write!(f, "Disconnected"),
            ConnectionStatus::Connecting => write!(f, "Connecting"),
            ConnectionStatus::Connected => write!(f, "Connected"),
        }
    }
}

/// Everything a consumer may observe about the slave.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceSnapshot {
    /// Address the next connect will use.
    pub ip_address: String,
    /// Address captured by the most recent connect attempt.
    pub target_address: Option<String>,
    pub status: ConnectionStatus,
    pub connect_busy: bool,
    pub last_connect_failed: bool,
    pub data: SlaveData,
    pub updated_at: Option<DateTime<Utc>>,
    pub poll_count: u64,
}

impl DeviceSnapshot {
    fn new(ip_address: String) -> Self {
        Self {
            ip_address,
            target_address: None,
            status: ConnectionStatus::Disconnected,
            connect_busy: false,
            last_connect_failed: false,
            data: SlaveData::default(),
            updated_at: None,
            poll_count: 0,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    pub fn diag_views(&self) -> DiagFlagViews {
        self.data.diag_views()
    }

    /// Text of the dismissible notice shown while the failure latch is set.
    pub fn connect_failure_notice(&self) -> Option<String> {
        if !self.last_connect_failed {
            return None;
        }
        let address = self.target_address.as_deref().unwrap_or(&self.ip_address);
        Some(format!(
            "Could not connect to slave with IP address {}",
            address
        ))
    }
}

/// Connection fields of a snapshot, written by the session.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ConnectionInfo {
    pub ip_address: String,
    pub target_address: Option<String>,
    pub status: ConnectionStatus,
    pub last_connect_failed: bool,
}

/// Published device state. Only the session and the poller write to it;
/// consumers read snapshots or subscribe to changes.
pub struct DeviceState {
    tx: watch::Sender<DeviceSnapshot>,
}

impl DeviceState {
    pub fn new(ip_address: impl Into<String>) -> Self {
        let (tx, _rx) = watch::channel(DeviceSnapshot::new(ip_address.into()));
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<DeviceSnapshot> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> DeviceSnapshot {
        self.tx.borrow().clone()
    }

    pub(crate) fn set_connection(&self, info: ConnectionInfo) {
        self.tx.send_if_modified(|snapshot| {
            let connect_busy = info.status == ConnectionStatus::Connecting;
            let changed = snapshot.ip_address != info.ip_address
                || snapshot.target_address != info.target_address
                || snapshot.status != info.status
                || snapshot.connect_busy != connect_busy
                || snapshot.last_connect_failed != info.last_connect_failed;

            snapshot.ip_address = info.ip_address;
            snapshot.target_address = info.target_address;
            snapshot.status = info.status;
            snapshot.connect_busy = connect_busy;
            snapshot.last_connect_failed = info.last_connect_failed;
            changed
        });
    }

    /// Replaces all decoded quantities in one update.
    pub(crate) fn apply_readings(&self, data: SlaveData) {
        self.tx.send_modify(|snapshot| {
            snapshot.data = data;
            snapshot.updated_at = Some(Utc::now());
            snapshot.poll_count += 1;
        });
    }
}
