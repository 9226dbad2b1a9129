//! Pure state and data: no I/O beyond persisted JSON files

pub mod backoff;
pub mod models;
pub mod playback;
pub mod playlist;
pub mod presets;
pub mod settings;
