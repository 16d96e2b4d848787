//! Configuration file management
//!
//! Loads TOML configuration and provides gallery, preference, export and
//! storage settings. Every section and field has a default, so a partial
//! file (or none at all) is valid.
//!
//! Lookup order: `FONT_GALLERY_CONFIG`, then
//! `<config dir>/font-gallery/config.toml`, then built-in defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ConfigError;
use crate::prefs::{FilePreferenceStorage, SizeTier};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "FONT_GALLERY_CONFIG";

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub gallery: GalleryConfig,
    pub prefs: PrefsConfig,
    pub export: ExportConfig,
    pub storage: StorageConfig,
}

/// Preview grid settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GalleryConfig {
    /// Text rendered on every card
    pub sample_text: String,
    /// Default size tier: "sm" | "md" | "lg" | "xl"
    pub tier: SizeTier,
    /// Grid columns
    pub columns: u32,
    /// Card width in px
    pub card_width: u32,
}

impl Default for GalleryConfig {
    fn default() -> Self {
        Self {
            sample_text: "The quick brown fox".to_string(),
            tier: SizeTier::Medium,
            columns: 4,
            card_width: 280,
        }
    }
}

/// Size preference persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefsConfig {
    /// Storage directory (platform data dir if unset)
    pub dir: Option<PathBuf>,
    /// Debounce delay before a change is written
    pub debounce_ms: u64,
}

impl Default for PrefsConfig {
    fn default() -> Self {
        Self {
            dir: None,
            debounce_ms: 200,
        }
    }
}

impl PrefsConfig {
    pub fn dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(FilePreferenceStorage::default_dir)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Export pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Settle countdown shown before capture is offered
    pub countdown_secs: u32,
    /// Per-font forced-load timeout
    pub font_timeout_ms: u64,
    /// Timeout for the fonts-ready wait after forced loads
    pub ready_timeout_ms: u64,
    /// Device pixel ratio of the target display
    pub device_pixel_ratio: f32,
    /// Upper bound on the capture scale
    pub max_scale: f32,
    /// Largest raster width or height in px
    pub max_dimension: u32,
    /// Smallest capture scale kept for legibility
    pub min_scale: f32,
    /// Size at which fonts are force-loaded
    pub probe_px: u32,
    /// Glyphs used when the composition has no text
    pub sample_glyphs: String,
    /// Background color (RRGGBB)
    pub background: String,
    /// Fixed name of the downloaded file
    pub filename: String,
    /// Download directory (platform download dir if unset)
    pub download_dir: Option<PathBuf>,
    /// Load system fonts as fallback for labels
    pub system_fonts: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            countdown_secs: 10,
            font_timeout_ms: 6000,
            ready_timeout_ms: 6000,
            device_pixel_ratio: 1.0,
            max_scale: 2.0,
            max_dimension: 16384,
            min_scale: 0.75,
            probe_px: 64,
            sample_glyphs: "あกขabc123".to_string(),
            background: "ffffff".to_string(),
            filename: "font-gallery.png".to_string(),
            download_dir: None,
            system_fonts: true,
        }
    }
}

impl ExportConfig {
    pub fn font_timeout(&self) -> Duration {
        Duration::from_millis(self.font_timeout_ms)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    pub fn download_dir(&self) -> PathBuf {
        self.download_dir
            .clone()
            .or_else(dirs::download_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Background as RGB, white when the setting does not parse.
    pub fn background_rgb(&self) -> (u8, u8, u8) {
        parse_hex_color(&self.background).unwrap_or((0xff, 0xff, 0xff))
    }
}

/// Metadata and blob storage locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON document holding font records
    pub store_path: PathBuf,
    /// Directory holding uploaded binaries
    pub blob_root: PathBuf,
    /// Public URL under which blobs are served
    pub public_base_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let base = FilePreferenceStorage::default_dir();
        Self {
            store_path: base.join("fonts.json"),
            blob_root: base.join("blobs"),
            public_base_url: "https://blob.local".to_string(),
        }
    }
}

impl Config {
    /// Returns the config file path, if one exists.
    pub fn config_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            let p = Path::new(&path);
            if p.exists() {
                return Some(p.to_path_buf());
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let config_path = config_dir.join("font-gallery").join("config.toml");
            if config_path.exists() {
                return Some(config_path);
            }
        }

        None
    }

    /// Loads the config file, falling back to defaults on any error.
    pub fn load() -> Self {
        if let Some(path) = Self::config_path() {
            match Self::load_from_file(&path) {
                Ok(config) => {
                    info!("Loaded config: {}", path.display());
                    return config;
                }
                Err(e) => {
                    warn!("{e}");
                }
            }
        }
        info!("Using built-in default config");
        Self::default()
    }

    /// Loads settings from the given path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

/// Parses `RRGGBB` with an optional leading `#`.
fn parse_hex_color(value: &str) -> Option<(u8, u8, u8)> {
    let hex = value.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some((r, g, b))
}
