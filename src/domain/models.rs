use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Connection lifecycle of the LED panel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    /// Reconnection gave up or a manual connect failed. Only a new
    /// manual `connect()` leaves this state.
    Failed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only view of the supervisor's connection bookkeeping
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionStats {
    pub state: ConnectionState,
    pub device_address: Option<String>,
    pub connection_count: u32,
    pub reconnection_count: u32,
    pub last_connected: Option<DateTime<Utc>>,
    pub last_disconnected: Option<DateTime<Utc>>,
    /// Time since the current connection was established; `None` unless connected
    pub uptime: Option<Duration>,
    pub monitoring: bool,
}

/// A device reported by a transport scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    pub name: Option<String>,
    pub address: String,
}

impl DiscoveredDevice {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            address: address.into(),
        }
    }

    pub fn unnamed(address: impl Into<String>) -> Self {
        Self {
            name: None,
            address: address.into(),
        }
    }
}

/// Notifications emitted by the connection supervisor, in transition order
#[derive(Debug, Clone, PartialEq)]
pub enum SupervisorEvent {
    StateChanged {
        from: ConnectionState,
        to: ConnectionState,
    },
    ReconnectAttempt {
        attempt: u32,
        max_attempts: u32,
        delay: Duration,
    },
}

/// Notifications emitted by the playlist scheduler
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    Started,
    Dispatched { index: usize, preset_name: String },
    /// The item's preset reference did not resolve against the catalog
    Skipped { index: usize, preset_name: String },
    Paused { index: usize },
    Resumed { index: usize },
    Stopped,
    /// Every reference in the playlist is stale; a retry is scheduled
    Stalled { retry_after: Duration },
    ExecutionFailed { index: usize, error: String },
}

/// Snapshot of the scheduler for status displays
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlaybackStatus {
    pub running: bool,
    pub paused: bool,
    pub current_index: Option<usize>,
    pub len: usize,
    pub current_preset: Option<String>,
}
