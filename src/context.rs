//! The font rendering context and the registration service on top of it.
//!
//! A [`FontContext`] owns a `fontdb` database: the set of faces the
//! rasterizer can resolve by family name. Registering a binary under a
//! logical family rewrites the parsed faces so they answer to that family
//! with the requested weight and style, whatever names the file carries.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use resvg::usvg::fontdb::{self, Database, Language, Source};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::RegisterError;
use crate::fetch::ResourceFetcher;
use crate::font::{FaceDescriptor, FaceKey, FontStyle};

// ============================================================================
// FontRegistrar
// ============================================================================

/// Registers binary font resources with a rendering context.
///
/// Failures are reported as `false` and never raised: one bad upload must
/// not block the rest of a gallery.
#[async_trait]
pub trait FontRegistrar: Send + Sync {
    async fn register(&self, family: &str, source_url: &str, descriptor: FaceDescriptor) -> bool;
}

/// A face successfully bound to `(family, weight, style)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedFace {
    pub key: FaceKey,
    pub ids: Vec<fontdb::ID>,
}

// ============================================================================
// FontContext
// ============================================================================

/// Shared set of faces available for rendering.
pub struct FontContext {
    db: RwLock<Database>,
    fetcher: Arc<dyn ResourceFetcher>,
    loaded: Mutex<HashMap<FaceKey, Vec<fontdb::ID>>>,
    pending: watch::Sender<usize>,
}

impl FontContext {
    /// Creates an empty context.
    pub fn new(fetcher: Arc<dyn ResourceFetcher>) -> Self {
        Self::with_database(Database::new(), fetcher)
    }

    /// Creates a context preloaded with the system fonts, used as fallback
    /// for text that does not name a registered family.
    pub fn with_system_fonts(fetcher: Arc<dyn ResourceFetcher>) -> Self {
        let mut db = Database::new();
        db.load_system_fonts();
        debug!(faces = db.len(), "loaded system fonts");
        Self::with_database(db, fetcher)
    }

    pub fn with_database(db: Database, fetcher: Arc<dyn ResourceFetcher>) -> Self {
        let (pending, _) = watch::channel(0);
        Self {
            db: RwLock::new(db),
            fetcher,
            loaded: Mutex::new(HashMap::new()),
            pending,
        }
    }

    /// Fetches `source_url` and binds its faces to `family`.
    ///
    /// A key that is already loaded returns the existing handle without
    /// fetching again.
    pub async fn add_face(
        &self,
        family: &str,
        source_url: &str,
        descriptor: FaceDescriptor,
    ) -> Result<LoadedFace, RegisterError> {
        let key = FaceKey::new(family, descriptor);
        if let Some(ids) = self.loaded.lock().get(&key) {
            debug!(family, "face already loaded");
            return Ok(LoadedFace { key, ids: ids.clone() });
        }

        let _pending = PendingLoad::start(&self.pending);
        let bytes = self.fetcher.fetch(source_url).await?;
        self.install(key, source_url, bytes)
    }

    fn install(&self, key: FaceKey, source_url: &str, bytes: Vec<u8>) -> Result<LoadedFace, RegisterError> {
        let mut scratch = Database::new();
        let parsed = scratch.load_font_source(Source::Binary(Arc::new(bytes)));
        if parsed.is_empty() {
            return Err(RegisterError::NoFaces(source_url.to_string()));
        }

        let mut loaded = self.loaded.lock();
        if let Some(ids) = loaded.get(&key) {
            return Ok(LoadedFace { key, ids: ids.clone() });
        }

        let mut db = self.db.write();
        let mut ids = Vec::with_capacity(parsed.len());
        for id in parsed.iter() {
            let Some(mut info) = scratch.face(*id).cloned() else {
                continue;
            };
            info.families = vec![(key.family.clone(), Language::English_UnitedStates)];
            info.weight = fontdb::Weight(key.weight);
            info.style = match key.style {
                FontStyle::Normal => fontdb::Style::Normal,
                FontStyle::Italic => fontdb::Style::Italic,
            };
            ids.push(db.push_face_info(info));
        }
        if ids.is_empty() {
            return Err(RegisterError::NoFaces(source_url.to_string()));
        }

        debug!(family = %key.family, weight = key.weight, faces = ids.len(), "registered face");
        loaded.insert(key.clone(), ids.clone());
        Ok(LoadedFace { key, ids })
    }

    pub fn is_loaded(&self, key: &FaceKey) -> bool {
        self.loaded.lock().contains_key(key)
    }

    /// Returns `true` when any variant of `family` is loaded.
    pub fn has_family(&self, family: &str) -> bool {
        self.loaded.lock().keys().any(|k| k.family == family)
    }

    /// Keys of every loaded face, sorted.
    pub fn loaded_keys(&self) -> Vec<FaceKey> {
        let mut keys: Vec<_> = self.loaded.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of loads currently in flight.
    pub fn pending(&self) -> usize {
        *self.pending.borrow()
    }

    /// Resolves once no load is in flight.
    pub async fn ready(&self) {
        let mut rx = self.pending.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// Snapshot of the face database for handing to the rasterizer.
    pub fn database(&self) -> Arc<Database> {
        Arc::new(self.db.read().clone())
    }
}

#[async_trait]
impl FontRegistrar for FontContext {
    async fn register(&self, family: &str, source_url: &str, descriptor: FaceDescriptor) -> bool {
        match self.add_face(family, source_url, descriptor).await {
            Ok(_) => true,
            Err(e) => {
                warn!(family, url = source_url, "failed to load font: {e}");
                false
            }
        }
    }
}

/// Counts a load as in flight for as long as it lives.
struct PendingLoad<'a> {
    counter: &'a watch::Sender<usize>,
}

impl<'a> PendingLoad<'a> {
    fn start(counter: &'a watch::Sender<usize>) -> Self {
        counter.send_modify(|n| *n += 1);
        Self { counter }
    }
}

impl Drop for PendingLoad<'_> {
    fn drop(&mut self) {
        self.counter.send_modify(|n| *n = n.saturating_sub(1));
    }
}
