//! Preset catalog.
//!
//! Presets are the reusable display configurations a playlist refers to by
//! name. The scheduler only ever reads them through [`PresetCatalog`].

use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

/// Kind of content a preset renders
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PresetKind {
    Text,
    Image,
    Clock,
    Animation,
    Stock,
    Weather,
    Youtube,
    Other(String),
}

impl PresetKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Clock => "clock",
            Self::Animation => "animation",
            Self::Stock => "stock",
            Self::Weather => "weather",
            Self::Youtube => "youtube",
            Self::Other(kind) => kind,
        }
    }
}

impl From<String> for PresetKind {
    fn from(kind: String) -> Self {
        match kind.as_str() {
            "text" => Self::Text,
            "image" => Self::Image,
            "clock" => Self::Clock,
            "animation" => Self::Animation,
            "stock" => Self::Stock,
            "weather" => Self::Weather,
            "youtube" => Self::Youtube,
            _ => Self::Other(kind),
        }
    }
}

impl From<PresetKind> for String {
    fn from(kind: PresetKind) -> Self {
        kind.as_str().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: PresetKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Kind-specific fields (text, colours, ticker, ...) kept verbatim
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl Preset {
    pub fn new(name: impl Into<String>, kind: PresetKind) -> Self {
        Self {
            name: name.into(),
            kind,
            description: None,
            fields: serde_json::Map::new(),
        }
    }

    /// Whether executing this preset reports how long it will run
    pub fn reports_own_duration(&self) -> bool {
        self.kind == PresetKind::Animation
    }
}

/// Read-only lookup of presets by name
pub trait PresetCatalog: Send + Sync {
    fn resolve(&self, reference: &str) -> Option<Preset>;
}

/// JSON-file backed preset collection
#[derive(Debug, Default)]
pub struct PresetLibrary {
    presets: Vec<Preset>,
    path: Option<PathBuf>,
}

impl PresetLibrary {
    pub fn new(presets: Vec<Preset>) -> Self {
        Self {
            presets,
            path: None,
        }
    }

    /// Load presets from a JSON array file. A missing file gives an empty library.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let presets = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            serde_json::from_str(&contents)?
        } else {
            Vec::new()
        };
        tracing::info!(path = %path.display(), "Loaded {} presets", presets.len());

        Ok(Self {
            presets,
            path: Some(path),
        })
    }

    pub fn save(&self) -> Result<(), StoreError> {
        if let Some(path) = &self.path {
            let json = serde_json::to_string_pretty(&self.presets)?;
            fs::write(path, json)?;
        }
        Ok(())
    }

    pub fn presets(&self) -> &[Preset] {
        &self.presets
    }

    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }

    pub fn add(&mut self, preset: Preset) -> Result<usize, StoreError> {
        self.presets.push(preset);
        self.save()?;
        Ok(self.presets.len() - 1)
    }

    pub fn update(&mut self, index: usize, preset: Preset) -> Result<bool, StoreError> {
        match self.presets.get_mut(index) {
            Some(slot) => {
                *slot = preset;
                self.save()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn delete(&mut self, index: usize) -> Result<bool, StoreError> {
        if index < self.presets.len() {
            self.presets.remove(index);
            self.save()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Presets matching `category` ("all" for any) whose name or description
    /// contains `query`, case-insensitively
    pub fn filter(&self, query: &str, category: &str) -> Vec<&Preset> {
        let query = query.trim().to_lowercase();
        self.presets
            .iter()
            .filter(|p| category == "all" || p.kind.as_str() == category)
            .filter(|p| {
                query.is_empty()
                    || p.name.to_lowercase().contains(&query)
                    || p
                        .description
                        .as_deref()
                        .is_some_and(|d| d.to_lowercase().contains(&query))
            })
            .collect()
    }

    /// "all" followed by every preset type in use, sorted
    pub fn categories(&self) -> Vec<String> {
        let kinds: BTreeSet<&str> = self.presets.iter().map(|p| p.kind.as_str()).collect();
        std::iter::once("all")
            .chain(kinds)
            .map(str::to_string)
            .collect()
    }
}

impl PresetCatalog for PresetLibrary {
    fn resolve(&self, reference: &str) -> Option<Preset> {
        self.presets.iter().find(|p| p.name == reference).cloned()
    }
}

impl<C: PresetCatalog + ?Sized> PresetCatalog for parking_lot::RwLock<C> {
    fn resolve(&self, reference: &str) -> Option<Preset> {
        self.read().resolve(reference)
    }
}
