//! Per-family display sizes, persisted across sessions.
//!
//! The whole map lives under one storage key as a JSON object of
//! `family -> px`. It is read once when the session starts and written
//! back through a [`Debouncer`] on every change.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::debounce::Debouncer;
use crate::error::PrefsError;

/// Storage key holding the size map.
pub const STORAGE_KEY: &str = "perSizePx.v1";

/// Smallest size a card can be set to.
pub const MIN_PX: u32 = 12;

/// Largest size a card can be set to.
pub const MAX_PX: u32 = 96;

/// Default delay before a change is persisted.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(200);

// ============================================================================
// SizeTier
// ============================================================================

/// Globally selected text size, giving the default for un-customized cards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SizeTier {
    #[serde(rename = "sm")]
    Small,
    #[default]
    #[serde(rename = "md")]
    Medium,
    #[serde(rename = "lg")]
    Large,
    #[serde(rename = "xl")]
    ExtraLarge,
}

impl SizeTier {
    pub fn base_px(&self) -> u32 {
        match self {
            Self::Small => 18,
            Self::Medium => 24,
            Self::Large => 30,
            Self::ExtraLarge => 36,
        }
    }
}

impl FromStr for SizeTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sm" | "small" => Ok(Self::Small),
            "md" | "medium" => Ok(Self::Medium),
            "lg" | "large" => Ok(Self::Large),
            "xl" | "extra-large" => Ok(Self::ExtraLarge),
            other => Err(format!("unknown size tier `{other}` (expected sm, md, lg or xl)")),
        }
    }
}

// ============================================================================
// Storage
// ============================================================================

/// Durable key-value storage surviving across sessions.
pub trait PreferenceStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, PrefsError>;
    fn set(&self, key: &str, value: &str) -> Result<(), PrefsError>;
}

/// One file per key under a directory.
#[derive(Debug, Clone)]
pub struct FilePreferenceStorage {
    dir: PathBuf,
}

impl FilePreferenceStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `<data dir>/font-gallery`, or the working directory if the platform
    /// has no data directory.
    pub fn default_dir() -> PathBuf {
        dirs::data_dir()
            .map(|d| d.join("font-gallery"))
            .unwrap_or_else(|| PathBuf::from(".font-gallery"))
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{name}.json"))
    }
}

impl PreferenceStorage for FilePreferenceStorage {
    fn get(&self, key: &str) -> Result<Option<String>, PrefsError> {
        let path = self.path_for(key);
        match std::fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(PrefsError::Io { path, source }),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PrefsError> {
        let path = self.path_for(key);
        let io_err = |source| PrefsError::Io {
            path: path.clone(),
            source,
        };
        std::fs::create_dir_all(&self.dir).map_err(io_err)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value).map_err(io_err)?;
        std::fs::rename(&tmp, &path).map_err(io_err)?;
        Ok(())
    }
}

/// In-process storage, for sessions that should not touch the disk.
#[derive(Debug, Default)]
pub struct MemoryPreferenceStorage {
    values: Mutex<BTreeMap<String, String>>,
    writes: Mutex<usize>,
}

impl MemoryPreferenceStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `set` calls so far.
    pub fn writes(&self) -> usize {
        *self.writes.lock()
    }
}

impl PreferenceStorage for MemoryPreferenceStorage {
    fn get(&self, key: &str) -> Result<Option<String>, PrefsError> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PrefsError> {
        self.values.lock().insert(key.to_string(), value.to_string());
        *self.writes.lock() += 1;
        Ok(())
    }
}

// ============================================================================
// SizePreferences
// ============================================================================

/// The per-family size map with debounced write-through.
pub struct SizePreferences {
    tier: SizeTier,
    sizes: BTreeMap<String, u32>,
    storage: Arc<dyn PreferenceStorage>,
    debouncer: Debouncer,
}

impl SizePreferences {
    /// Loads the stored map. Missing or unreadable data starts empty.
    pub fn load(storage: Arc<dyn PreferenceStorage>, tier: SizeTier, debounce: Duration) -> Self {
        let sizes = match storage.get(STORAGE_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<BTreeMap<String, u32>>(&raw) {
                Ok(map) => map
                    .into_iter()
                    .map(|(family, px)| (family, px.clamp(MIN_PX, MAX_PX)))
                    .collect(),
                Err(e) => {
                    warn!("ignoring malformed size preferences: {e}");
                    BTreeMap::new()
                }
            },
            Ok(None) => BTreeMap::new(),
            Err(e) => {
                warn!("failed to read size preferences: {e}");
                BTreeMap::new()
            }
        };
        debug!(entries = sizes.len(), "loaded size preferences");
        Self {
            tier,
            sizes,
            storage,
            debouncer: Debouncer::new(debounce),
        }
    }

    pub fn tier(&self) -> SizeTier {
        self.tier
    }

    pub fn set_tier(&mut self, tier: SizeTier) {
        self.tier = tier;
    }

    /// The explicit size for `family`, or the tier default.
    pub fn get_size(&self, family: &str) -> u32 {
        self.sizes
            .get(family)
            .copied()
            .unwrap_or_else(|| self.tier.base_px())
    }

    /// Returns `true` when `family` has an explicit size.
    pub fn is_customized(&self, family: &str) -> bool {
        self.sizes.contains_key(family)
    }

    /// Sets the size for `family`, clamped to `[MIN_PX, MAX_PX]`.
    ///
    /// Returns the stored value. Persistence is debounced, so this must be
    /// called from within a tokio runtime.
    pub fn set_size(&mut self, family: &str, px: u32) -> u32 {
        let px = px.clamp(MIN_PX, MAX_PX);
        self.sizes.insert(family.to_string(), px);
        self.schedule_write();
        px
    }

    /// Drops entries for families not in `active`.
    ///
    /// Does nothing while either side is empty, so a gallery that has not
    /// loaded yet cannot wipe stored sizes.
    pub fn prune_to<S: AsRef<str>>(&mut self, active: &[S]) -> usize {
        if active.is_empty() || self.sizes.is_empty() {
            return 0;
        }
        let allowed: HashSet<&str> = active.iter().map(|s| s.as_ref()).collect();
        let before = self.sizes.len();
        self.sizes.retain(|family, _| allowed.contains(family.as_str()));
        let removed = before - self.sizes.len();
        if removed > 0 {
            debug!(removed, "pruned stale size preferences");
            self.schedule_write();
        }
        removed
    }

    /// Read-only view of the explicit sizes.
    pub fn entries(&self) -> &BTreeMap<String, u32> {
        &self.sizes
    }

    /// Writes immediately, replacing any pending debounced write.
    pub fn flush(&self) -> Result<(), PrefsError> {
        self.debouncer.cancel();
        let json = serde_json::to_string(&self.sizes)?;
        self.storage.set(STORAGE_KEY, &json)
    }

    fn schedule_write(&self) {
        let json = match serde_json::to_string(&self.sizes) {
            Ok(json) => json,
            Err(e) => {
                warn!("failed to encode size preferences: {e}");
                return;
            }
        };
        let storage = Arc::clone(&self.storage);
        self.debouncer.schedule(move || {
            if let Err(e) = storage.set(STORAGE_KEY, &json) {
                warn!("failed to persist size preferences: {e}");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefs(storage: &Arc<MemoryPreferenceStorage>) -> SizePreferences {
        SizePreferences::load(storage.clone(), SizeTier::Medium, DEFAULT_DEBOUNCE)
    }

    #[test]
    fn tier_defaults() {
        let storage = Arc::new(MemoryPreferenceStorage::new());
        let mut p = prefs(&storage);
        assert_eq!(p.get_size("Font-1"), 24);
        p.set_tier(SizeTier::ExtraLarge);
        assert_eq!(p.get_size("Font-1"), 36);
        assert_eq!("lg".parse::<SizeTier>().unwrap(), SizeTier::Large);
        assert!("huge".parse::<SizeTier>().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn set_size_clamps() {
        let storage = Arc::new(MemoryPreferenceStorage::new());
        let mut p = prefs(&storage);
        assert_eq!(p.set_size("a", 4), MIN_PX);
        assert_eq!(p.set_size("b", 400), MAX_PX);
        assert_eq!(p.set_size("c", 42), 42);
        assert_eq!(p.get_size("a"), 12);
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_changes_coalesce_into_one_write() {
        let storage = Arc::new(MemoryPreferenceStorage::new());
        let mut p = prefs(&storage);
        for px in 20..30 {
            p.set_size("Font-1", px);
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(storage.writes(), 0);

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(storage.writes(), 1);
        assert_eq!(
            storage.get(STORAGE_KEY).unwrap().as_deref(),
            Some(r#"{"Font-1":29}"#)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn size_survives_reload() {
        let storage = Arc::new(MemoryPreferenceStorage::new());
        let mut p = prefs(&storage);
        p.set_size("Font-1", 42);
        tokio::time::sleep(Duration::from_millis(300)).await;
        drop(p);

        let reloaded = prefs(&storage);
        assert_eq!(reloaded.get_size("Font-1"), 42);
        assert_eq!(reloaded.get_size("Font-2"), 24);
    }

    #[tokio::test(start_paused = true)]
    async fn prune_drops_missing_families() {
        let storage = Arc::new(MemoryPreferenceStorage::new());
        let mut p = prefs(&storage);
        p.set_size("Font-1", 40);
        p.set_size("Font-2", 50);

        assert_eq!(p.prune_to::<&str>(&[]), 0);
        assert_eq!(p.prune_to(&["Font-1"]), 1);
        assert!(!p.is_customized("Font-2"));
        assert_eq!(p.get_size("Font-1"), 40);

        p.flush().unwrap();
        let reloaded = prefs(&storage);
        assert_eq!(reloaded.entries().len(), 1);
    }

    #[test]
    fn malformed_storage_starts_empty() {
        let storage = Arc::new(MemoryPreferenceStorage::new());
        storage.set(STORAGE_KEY, "[1,2,3]").unwrap();
        let p = prefs(&storage);
        assert!(p.entries().is_empty());
    }

    #[test]
    fn file_storage_roundtrips_values() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FilePreferenceStorage::new(dir.path().join("prefs"));
        assert_eq!(storage.get(STORAGE_KEY).unwrap(), None);
        storage.set(STORAGE_KEY, r#"{"a":20}"#).unwrap();
        assert_eq!(storage.get(STORAGE_KEY).unwrap().as_deref(), Some(r#"{"a":20}"#));
        assert!(dir.path().join("prefs/perSizePx.v1.json").exists());
    }
}
