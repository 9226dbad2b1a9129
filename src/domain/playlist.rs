//! Playlist items, ordering and persistence

use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Shortest display time an item may be stored with, in seconds
pub const MIN_ITEM_DURATION: f64 = 0.1;

/// Clamp user-entered durations so nothing non-positive is ever stored
pub fn clamp_duration(duration: f64, min: f64) -> f64 {
    let min = if min.is_finite() && min > 0.0 {
        min
    } else {
        MIN_ITEM_DURATION
    };
    if duration.is_finite() && duration >= min {
        duration
    } else {
        min
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistItem {
    /// Name of the preset in the catalog
    #[serde(rename = "preset_name")]
    pub preset_reference: String,
    /// Display time in seconds
    pub duration: f64,
    /// Prefer the duration the preset reports when executed
    #[serde(rename = "use_anim_duration", default)]
    pub use_dynamic_duration: bool,
}

impl PlaylistItem {
    pub fn new(preset_reference: impl Into<String>, duration: f64, use_dynamic_duration: bool) -> Self {
        Self {
            preset_reference: preset_reference.into(),
            duration: clamp_duration(duration, MIN_ITEM_DURATION),
            use_dynamic_duration,
        }
    }

    pub fn display_time(&self) -> Duration {
        Duration::from_secs_f64(clamp_duration(self.duration, MIN_ITEM_DURATION))
    }
}

/// Ordered sequence of items; order is playback order
#[derive(Debug, Clone, PartialEq)]
pub struct Playlist {
    items: Vec<PlaylistItem>,
    min_duration: f64,
}

impl Default for Playlist {
    fn default() -> Self {
        Self::with_min_duration(MIN_ITEM_DURATION)
    }
}

impl Playlist {
    pub fn new(items: Vec<PlaylistItem>) -> Self {
        let mut playlist = Self::default();
        playlist.replace(items);
        playlist
    }

    pub fn with_min_duration(min_duration: f64) -> Self {
        Self {
            items: Vec::new(),
            min_duration: clamp_duration(min_duration, MIN_ITEM_DURATION),
        }
    }

    pub fn items(&self) -> &[PlaylistItem] {
        &self.items
    }

    pub fn get(&self, index: usize) -> Option<&PlaylistItem> {
        self.items.get(index)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn replace(&mut self, items: Vec<PlaylistItem>) {
        let min = self.min_duration;
        self.items = items
            .into_iter()
            .map(|mut item| {
                item.duration = clamp_duration(item.duration, min);
                item
            })
            .collect();
    }

    pub fn add_item(&mut self, preset_reference: impl Into<String>, duration: f64, use_dynamic_duration: bool) {
        let preset_reference = preset_reference.into();
        let duration = clamp_duration(duration, self.min_duration);
        tracing::debug!("Added to playlist: {} ({}s)", preset_reference, duration);
        self.items.push(PlaylistItem {
            preset_reference,
            duration,
            use_dynamic_duration,
        });
    }

    pub fn remove_item(&mut self, index: usize) -> bool {
        if index < self.items.len() {
            let item = self.items.remove(index);
            tracing::debug!("Removed from playlist: {}", item.preset_reference);
            true
        } else {
            false
        }
    }

    /// Swap the item at `index` with its neighbour; `direction` is -1 (up) or +1 (down)
    pub fn move_item(&mut self, index: usize, direction: i32) -> bool {
        if direction != -1 && direction != 1 {
            return false;
        }
        let Some(target) = index.checked_add_signed(direction as isize) else {
            return false;
        };
        if index < self.items.len() && target < self.items.len() {
            self.items.swap(index, target);
            true
        } else {
            false
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

/// On-disk playlist document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistFile {
    pub name: String,
    pub items: Vec<PlaylistItem>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredPlaylist {
    Wrapped { items: Vec<PlaylistItem> },
    Bare(Vec<PlaylistItem>),
}

/// Directory of saved playlists, one `<name>.json` per playlist
#[derive(Debug, Clone)]
pub struct PlaylistStore {
    dir: PathBuf,
}

impl PlaylistStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        tracing::info!(dir = %dir.display(), "Playlist store ready");
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_path(&self, name: &str) -> Result<PathBuf, StoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::EmptyName);
        }
        let file_name = if name.ends_with(".json") {
            name.to_string()
        } else {
            format!("{name}.json")
        };
        Ok(self.dir.join(file_name))
    }

    pub fn save(&self, name: &str, playlist: &Playlist) -> Result<PathBuf, StoreError> {
        let path = self.file_path(name)?;
        let document = PlaylistFile {
            name: name.trim().trim_end_matches(".json").to_string(),
            items: playlist.items().to_vec(),
        };
        fs::write(&path, serde_json::to_string_pretty(&document)?)?;
        tracing::info!(path = %path.display(), "Playlist saved");
        Ok(path)
    }

    /// Load a playlist, accepting both the wrapped document and a bare item array
    pub fn load(&self, name: &str, min_duration: f64) -> Result<Playlist, StoreError> {
        let path = self.file_path(name)?;
        if !path.exists() {
            tracing::warn!(path = %path.display(), "Playlist file not found");
            return Err(StoreError::NotFound(path.display().to_string()));
        }

        let contents = fs::read_to_string(&path)?;
        let items = match serde_json::from_str::<StoredPlaylist>(&contents) {
            Ok(StoredPlaylist::Wrapped { items }) | Ok(StoredPlaylist::Bare(items)) => items,
            Err(e) => {
                tracing::error!("Invalid playlist format in {}: {}", path.display(), e);
                return Err(StoreError::InvalidFormat(path.display().to_string()));
            }
        };

        let mut playlist = Playlist::with_min_duration(min_duration);
        playlist.replace(items);
        tracing::info!("Loaded playlist {} with {} items", name, playlist.len());
        Ok(playlist)
    }

    /// Names of stored playlists, sorted
    pub fn list(&self) -> Result<Vec<String>, StoreError> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn abc() -> Playlist {
        let mut playlist = Playlist::default();
        playlist.add_item("A", 5.0, false);
        playlist.add_item("B", 10.0, false);
        playlist.add_item("C", 1.0, true);
        playlist
    }

    fn refs(playlist: &Playlist) -> Vec<&str> {
        playlist
            .items()
            .iter()
            .map(|i| i.preset_reference.as_str())
            .collect()
    }

    #[test]
    fn test_non_positive_durations_are_clamped() {
        let mut playlist = Playlist::default();
        playlist.add_item("zero", 0.0, false);
        playlist.add_item("negative", -5.0, false);
        playlist.add_item("nan", f64::NAN, false);

        for item in playlist.items() {
            assert!(item.duration > 0.0);
            assert_eq!(item.duration, MIN_ITEM_DURATION);
        }
        assert_eq!(PlaylistItem::new("x", -1.0, false).duration, MIN_ITEM_DURATION);
    }

    #[test]
    fn test_custom_minimum() {
        let mut playlist = Playlist::with_min_duration(1.0);
        playlist.add_item("short", 0.5, false);
        assert_eq!(playlist.items()[0].duration, 1.0);
    }

    #[test]
    fn test_remove_out_of_range_is_noop() {
        let mut playlist = abc();
        assert!(!playlist.remove_item(3));
        assert_eq!(playlist.len(), 3);
        assert!(playlist.remove_item(1));
        assert_eq!(refs(&playlist), ["A", "C"]);
    }

    #[test]
    fn test_move_item() {
        let mut playlist = abc();
        assert!(playlist.move_item(0, 1));
        assert_eq!(refs(&playlist), ["B", "A", "C"]);
        assert!(playlist.move_item(2, -1));
        assert_eq!(refs(&playlist), ["B", "C", "A"]);

        assert!(!playlist.move_item(0, -1));
        assert!(!playlist.move_item(2, 1));
        assert!(!playlist.move_item(7, -1));
        assert!(!playlist.move_item(1, 2));
        assert_eq!(refs(&playlist), ["B", "C", "A"]);
    }

    #[test]
    fn test_item_json_schema() {
        let value = serde_json::to_value(PlaylistItem::new("Fire", 12.5, true)).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"preset_name": "Fire", "duration": 12.5, "use_anim_duration": true})
        );

        let legacy: PlaylistItem =
            serde_json::from_str(r#"{"preset_name": "Clock", "duration": 10}"#).unwrap();
        assert!(!legacy.use_dynamic_duration);
    }

    #[test]
    fn test_store_save_load_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = PlaylistStore::new(dir.path().join("playlists")).unwrap();

        store.save("evening", &abc()).unwrap();
        store.save("morning.json", &Playlist::default()).unwrap();

        let saved: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.dir().join("evening.json")).unwrap())
                .unwrap();
        assert_eq!(saved["name"], "evening");
        assert_eq!(saved["items"].as_array().unwrap().len(), 3);

        assert_eq!(store.list().unwrap(), ["evening", "morning"]);
        assert_eq!(store.load("evening", MIN_ITEM_DURATION).unwrap(), abc());
    }

    #[test]
    fn test_store_loads_bare_array_and_clamps() {
        let dir = tempfile::tempdir().unwrap();
        let store = PlaylistStore::new(dir.path()).unwrap();
        fs::write(
            dir.path().join("legacy.json"),
            r#"[{"preset_name": "A", "duration": 0}]"#,
        )
        .unwrap();

        let playlist = store.load("legacy", MIN_ITEM_DURATION).unwrap();
        assert_eq!(playlist.items()[0].duration, MIN_ITEM_DURATION);
    }

    #[test]
    fn test_store_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = PlaylistStore::new(dir.path()).unwrap();
        fs::write(dir.path().join("broken.json"), r#"{"items": 3}"#).unwrap();

        assert!(matches!(store.save("  ", &abc()), Err(StoreError::EmptyName)));
        assert!(matches!(
            store.load("missing", MIN_ITEM_DURATION),
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.load("broken", MIN_ITEM_DURATION),
            Err(StoreError::InvalidFormat(_))
        ));
    }
}
