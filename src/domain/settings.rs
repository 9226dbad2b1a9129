use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_true")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_true")]
    pub show_file_line: bool,
    #[serde(default = "default_false")]
    pub show_thread_ids: bool,
    #[serde(default = "default_true")]
    pub show_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_true(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_file_line: default_true(),
            show_thread_ids: default_false(),
            show_target: default_true(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
        }
    }
}

/// Health monitoring, reconnection and scan tuning
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionSettings {
    #[serde(default = "default_health_check_interval")]
    pub health_check_interval_secs: f64,
    #[serde(default = "default_true")]
    pub auto_reconnect_enabled: bool,
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_backoff_base")]
    pub backoff_base_secs: u64,
    #[serde(default = "default_backoff_cap")]
    pub backoff_cap_secs: u64,
    #[serde(default = "default_true")]
    pub monitor_on_connect: bool,
    /// Treat a transport without a liveness query as healthy.
    /// Turning this off makes such transports fail every health check.
    #[serde(default = "default_true")]
    pub assume_healthy_without_liveness: bool,
    #[serde(default = "default_scan_timeout")]
    pub scan_timeout_secs: f64,
    #[serde(default = "default_scan_name_filters")]
    pub scan_name_filters: Vec<String>,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            health_check_interval_secs: default_health_check_interval(),
            auto_reconnect_enabled: default_true(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            backoff_base_secs: default_backoff_base(),
            backoff_cap_secs: default_backoff_cap(),
            monitor_on_connect: default_true(),
            assume_healthy_without_liveness: default_true(),
            scan_timeout_secs: default_scan_timeout(),
            scan_name_filters: default_scan_name_filters(),
        }
    }
}

impl ConnectionSettings {
    pub fn health_check_interval(&self) -> Duration {
        secs_or(self.health_check_interval_secs, default_health_check_interval())
    }

    pub fn scan_timeout(&self) -> Duration {
        secs_or(self.scan_timeout_secs, default_scan_timeout())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaylistSettings {
    #[serde(default = "default_min_item_duration")]
    pub min_item_duration_secs: f64,
    #[serde(default = "default_playlists_dir")]
    pub playlists_dir: String,
}

impl Default for PlaylistSettings {
    fn default() -> Self {
        Self {
            min_item_duration_secs: default_min_item_duration(),
            playlists_dir: default_playlists_dir(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "ipixel_controller".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}
fn default_health_check_interval() -> f64 {
    5.0
}
fn default_max_reconnect_attempts() -> u32 {
    5
}
fn default_backoff_base() -> u64 {
    2
}
fn default_backoff_cap() -> u64 {
    32
}
fn default_scan_timeout() -> f64 {
    5.0
}
fn default_scan_name_filters() -> Vec<String> {
    vec!["LED".to_string(), "BLE".to_string(), "iPixel".to_string()]
}
fn default_min_item_duration() -> f64 {
    0.1
}
fn default_playlists_dir() -> String {
    "playlists".to_string()
}

fn secs_or(secs: f64, fallback: f64) -> Duration {
    if secs.is_finite() && secs > 0.0 {
        Duration::from_secs_f64(secs)
    } else {
        Duration::from_secs_f64(fallback)
    }
}

/// Application settings, persisted as flat JSON.
///
/// The four session keys sit at the top level; everything else has a
/// default so older or hand-written files still load.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub last_device: Option<String>,
    #[serde(default = "default_true")]
    pub auto_connect: bool,
    #[serde(default = "default_true")]
    pub restore_last_state: bool,
    #[serde(default)]
    pub last_preset: Option<String>,

    #[serde(default)]
    pub log_settings: LogSettings,
    #[serde(default)]
    pub connection: ConnectionSettings,
    #[serde(default)]
    pub playlist: PlaylistSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            last_device: None,
            auto_connect: true,
            restore_last_state: true,
            last_preset: None,
            log_settings: LogSettings::default(),
            connection: ConnectionSettings::default(),
            playlist: PlaylistSettings::default(),
        }
    }
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        Ok(Self::with_path(settings_path))
    }

    /// Use an explicit settings file. A missing or unreadable file yields defaults.
    pub fn with_path(settings_path: impl Into<PathBuf>) -> Self {
        let settings_path = settings_path.into();
        let settings = match Self::load_from_file(&settings_path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::debug!(path = %settings_path.display(), "Using default settings: {}", e);
                Settings::default()
            }
        };

        Self {
            settings,
            settings_path,
        }
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("iPixelController");
        fs::create_dir_all(&path)?;
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.settings_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.settings_path
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn remember_device(&mut self, address: &str) -> anyhow::Result<()> {
        if self.settings.last_device.as_deref() != Some(address) {
            self.settings.last_device = Some(address.to_string());
            self.save()?;
        }
        Ok(())
    }

    pub fn remember_preset(&mut self, name: &str) -> anyhow::Result<()> {
        if self.settings.last_preset.as_deref() != Some(name) {
            self.settings.last_preset = Some(name.to_string());
            self.save()?;
        }
        Ok(())
    }
}
