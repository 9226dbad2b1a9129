//! Controller session: what the desktop front-end talks to.
//!
//! Owns the supervisor, the scheduler, the preset library and the
//! settings, and wires them together: playback is gated on the connection,
//! successful connects and preset executions are remembered so the next
//! launch can reconnect and restore the panel.

use crate::domain::playlist::{Playlist, PlaylistStore};
use crate::domain::presets::{PresetCatalog, PresetLibrary};
use crate::domain::settings::SettingsService;
use crate::error::PlaybackError;
use crate::infrastructure::connection::{ConnectionSupervisor, SupervisorConfig};
use crate::infrastructure::scheduler::PlaylistScheduler;
use crate::infrastructure::sink::{ExecutionOutcome, ExecutionSink, ResolvedItem};
use crate::infrastructure::transport::Transport;
use parking_lot::{Mutex, RwLock};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

pub struct ControllerSession<T: Transport> {
    supervisor: ConnectionSupervisor<T>,
    scheduler: PlaylistScheduler,
    catalog: Arc<RwLock<PresetLibrary>>,
    sink: Arc<dyn ExecutionSink>,
    settings: Arc<Mutex<SettingsService>>,
    playlists: PlaylistStore,
}

/// Relative directories are taken relative to the settings file
fn resolve_dir(settings_path: &Path, dir: &str) -> PathBuf {
    let dir = Path::new(dir);
    if dir.is_absolute() {
        return dir.to_path_buf();
    }
    match settings_path.parent() {
        Some(parent) => parent.join(dir),
        None => dir.to_path_buf(),
    }
}

impl<T: Transport> ControllerSession<T> {
    pub fn new(
        transport: T,
        settings: SettingsService,
        presets: PresetLibrary,
        sink: Arc<dyn ExecutionSink>,
    ) -> anyhow::Result<Self> {
        let (config, playlists_dir, min_duration) = {
            let s = settings.get();
            (
                SupervisorConfig::from(&s.connection),
                resolve_dir(settings.path(), &s.playlist.playlists_dir),
                s.playlist.min_item_duration_secs,
            )
        };

        let supervisor = ConnectionSupervisor::new(transport, config);
        let catalog = Arc::new(RwLock::new(presets));
        let scheduler = PlaylistScheduler::with_playlist(
            catalog.clone(),
            Arc::clone(&sink),
            Playlist::with_min_duration(min_duration),
        );
        scheduler.set_gate(Arc::new(supervisor.clone()));

        Ok(Self {
            supervisor,
            scheduler,
            catalog,
            sink,
            settings: Arc::new(Mutex::new(settings)),
            playlists: PlaylistStore::new(playlists_dir)?,
        })
    }

    pub fn supervisor(&self) -> &ConnectionSupervisor<T> {
        &self.supervisor
    }

    pub fn scheduler(&self) -> &PlaylistScheduler {
        &self.scheduler
    }

    pub fn presets(&self) -> &Arc<RwLock<PresetLibrary>> {
        &self.catalog
    }

    pub fn settings(&self) -> &Arc<Mutex<SettingsService>> {
        &self.settings
    }

    pub fn playlists(&self) -> &PlaylistStore {
        &self.playlists
    }

    /// Connect and remember the device for the next launch
    pub async fn connect(&self, address: &str) -> anyhow::Result<()> {
        self.supervisor.connect(address).await?;
        self.settings.lock().remember_device(address)?;
        Ok(())
    }

    /// Stop playback and disconnect
    pub async fn disconnect(&self) -> anyhow::Result<()> {
        self.scheduler.stop();
        self.supervisor.disconnect().await?;
        Ok(())
    }

    /// Reconnect to the remembered device if it shows up in a scan.
    ///
    /// Returns whether a connection was made.
    pub async fn auto_connect_to_last_device(&self) -> anyhow::Result<bool> {
        let last_device = {
            let settings = self.settings.lock();
            let s = settings.get();
            if !s.auto_connect {
                return Ok(false);
            }
            s.last_device.clone()
        };
        let Some(last_device) = last_device else {
            return Ok(false);
        };
        if self.supervisor.is_connected() {
            return Ok(false);
        }

        info!("Auto-connecting to last device {}", last_device);
        let devices = self.supervisor.scan_default().await?;
        if !devices.values().any(|address| *address == last_device) {
            warn!("Last device not found. Please connect manually.");
            return Ok(false);
        }

        self.connect(&last_device).await?;
        Ok(true)
    }

    /// Show the last executed preset again, if connected and enabled
    pub async fn restore_last_state(&self) -> anyhow::Result<Option<ExecutionOutcome>> {
        let last_preset = {
            let settings = self.settings.lock();
            let s = settings.get();
            if !s.restore_last_state {
                return Ok(None);
            }
            s.last_preset.clone()
        };
        let Some(name) = last_preset else {
            return Ok(None);
        };
        if !self.supervisor.is_connected() {
            return Ok(None);
        }
        if self.catalog.resolve(&name).is_none() {
            warn!("Last preset '{}' no longer exists", name);
            return Ok(None);
        }

        info!("Restoring last preset '{}'", name);
        self.execute_preset(&name).await.map(Some)
    }

    /// Auto-connect, then restore the last preset
    pub async fn startup(&self) -> anyhow::Result<()> {
        if let Err(e) = self.auto_connect_to_last_device().await {
            warn!("Auto-connect failed: {:#}", e);
        }
        self.restore_last_state().await?;
        Ok(())
    }

    /// Run one preset on the panel and remember it as the last shown
    pub async fn execute_preset(&self, name: &str) -> anyhow::Result<ExecutionOutcome> {
        if !self.supervisor.is_connected() {
            return Err(PlaybackError::NotConnected.into());
        }
        let preset = self
            .catalog
            .resolve(name)
            .ok_or_else(|| PlaybackError::UnknownPreset(name.to_string()))?;

        self.settings.lock().remember_preset(name)?;

        let outcome = self.sink.execute(ResolvedItem::standalone(preset)).await;
        if let Some(error) = &outcome.error {
            warn!("Preset '{}' failed: {}", name, error);
        }
        Ok(outcome)
    }

    pub fn start_playlist(&self) -> Result<(), PlaybackError> {
        self.scheduler.start()
    }

    /// Replace the scheduler's playlist with a stored one, stopping playback
    pub fn load_playlist(&self, name: &str) -> anyhow::Result<()> {
        let min_duration = self.settings.lock().get().playlist.min_item_duration_secs;
        let playlist = self.playlists.load(name, min_duration)?;
        self.scheduler.stop();
        self.scheduler.set_playlist(playlist.items().to_vec());
        Ok(())
    }

    pub fn save_playlist(&self, name: &str) -> anyhow::Result<PathBuf> {
        Ok(self.playlists.save(name, &self.scheduler.playlist())?)
    }

    pub fn list_playlists(&self) -> anyhow::Result<Vec<String>> {
        Ok(self.playlists.list()?)
    }
}
