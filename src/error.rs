//! Error types for the controller core

use thiserror::Error;

/// Failures at the Bluetooth transport boundary.
///
/// These are surfaced to whoever initiated the scan, connect or disconnect,
/// since the user has to be told about them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The underlying Bluetooth capability is missing (no adapter, no driver)
    #[error("Bluetooth transport unavailable: {0}")]
    Unavailable(String),

    /// The scan did not finish, e.g. the transport overran its timeout
    #[error("Device scan failed: {0}")]
    Scan(String),

    #[error("Connection to {address} failed: {reason}")]
    Connect { address: String, reason: String },

    #[error("Disconnection failed: {0}")]
    Disconnect(String),

    /// The liveness query itself failed
    #[error("Liveness query failed: {0}")]
    Liveness(String),
}

/// Errors returned by the connection supervisor
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SupervisorError {
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Errors returned when playback or a one-off execution cannot begin
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("Playlist is empty")]
    EmptyPlaylist,

    #[error("Not connected to a device")]
    NotConnected,

    #[error("Preset '{0}' not found")]
    UnknownPreset(String),
}

/// Errors while reading or writing persisted playlists and presets
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid format in {0}")]
    InvalidFormat(String),

    #[error("Name must not be empty")]
    EmptyName,

    #[error("Not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, SupervisorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_error_wraps_transparently() {
        let err: SupervisorError = TransportError::Connect {
            address: "AA:BB".to_string(),
            reason: "timeout".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "Connection to AA:BB failed: timeout");
    }
}
