//! Runtime core of the iPixel LED panel controller.
//!
//! Two cooperating components:
//!
//! - [`ConnectionSupervisor`] tracks the Bluetooth connection, polls its
//!   health and reconnects with exponential backoff.
//! - [`PlaylistScheduler`] loops a playlist of preset references on the
//!   panel with per-item durations, pause, resume and stop.
//!
//! The Bluetooth stack and the renderer are collaborators behind the
//! [`Transport`] and [`ExecutionSink`] traits. [`ControllerSession`] wires
//! everything to persisted settings, presets and playlists.

pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod session;

#[cfg(test)]
mod testing;

pub use domain::models::{
    ConnectionState, ConnectionStats, DiscoveredDevice, PlaybackEvent, PlaybackStatus,
    SupervisorEvent,
};
pub use domain::playlist::{Playlist, PlaylistItem, PlaylistStore};
pub use domain::presets::{Preset, PresetCatalog, PresetKind, PresetLibrary};
pub use domain::settings::{Settings, SettingsService};
pub use error::{PlaybackError, StoreError, SupervisorError, TransportError};
pub use infrastructure::connection::{ConnectionSupervisor, SupervisorConfig};
pub use infrastructure::logging::{init_logger, LoggingGuard};
pub use infrastructure::scheduler::{ConnectionGate, PlaylistScheduler};
pub use infrastructure::sink::{ExecutionOutcome, ExecutionSink, ResolvedItem};
pub use infrastructure::transport::Transport;
pub use session::ControllerSession;
