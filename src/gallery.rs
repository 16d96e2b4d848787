//! Loading the published gallery into a rendering context.
//!
//! A load pass fetches every public record, registers the first record of
//! each family, and returns the families that loaded in display order. The
//! display order comes from the number embedded in the family name, so
//! uploaders can order the gallery by naming fonts `Font-1`, `Font-2`, ...

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::context::FontRegistrar;
use crate::font::FontMetadata;
use crate::registry::FontRegistry;
use crate::store::FontStore;

// ============================================================================
// Gallery
// ============================================================================

/// Result of one load pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Gallery {
    /// Families ready to render, in display order.
    pub families: Vec<String>,
    /// One entry per distinct `(family, weight, style)` of the ready
    /// families, in fetch order. Used to re-embed faces on export.
    pub metas: Vec<FontMetadata>,
    /// Set when the store could not be read. The gallery is empty then.
    pub error: Option<String>,
}

impl Gallery {
    fn failed(message: String) -> Self {
        Self {
            error: Some(message),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }

    /// Export is offered only when there is something to draw.
    pub fn can_export(&self) -> bool {
        !self.is_empty()
    }

    /// Message shown in place of the grid when nothing is published.
    pub fn empty_state_message(&self) -> Option<&'static str> {
        if self.is_empty() {
            Some("No published fonts yet. Add a font to get started.")
        } else {
            None
        }
    }

    /// Stored variants of `family`.
    pub fn metas_for<'a>(&'a self, family: &'a str) -> impl Iterator<Item = &'a FontMetadata> + 'a {
        self.metas.iter().filter(move |m| m.family == family)
    }
}

// ============================================================================
// Ordering
// ============================================================================

/// The first run of ASCII digits in `family`, or 0 when there is none.
pub fn numeric_key(family: &str) -> u64 {
    let digits: String = family
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if digits.is_empty() {
        0
    } else {
        digits.parse().unwrap_or(u64::MAX)
    }
}

/// Sorts by [`numeric_key`] ascending. Stable, so ties keep their order.
pub fn sort_families(families: &mut [String]) {
    families.sort_by_key(|f| numeric_key(f));
}

// ============================================================================
// GalleryLoader
// ============================================================================

/// Fetches published records and registers them.
pub struct GalleryLoader {
    store: Arc<dyn FontStore>,
    registrar: Arc<dyn FontRegistrar>,
    registry: Mutex<FontRegistry>,
}

impl GalleryLoader {
    pub fn new(store: Arc<dyn FontStore>, registrar: Arc<dyn FontRegistrar>) -> Self {
        Self {
            store,
            registrar,
            registry: Mutex::new(FontRegistry::new()),
        }
    }

    /// Runs one load pass.
    ///
    /// Never fails: a store error yields an empty gallery with
    /// [`Gallery::error`] set, and fonts that fail to load are left out.
    pub async fn load(&self) -> Gallery {
        let records = match self.store.published().await {
            Ok(records) => records,
            Err(e) => {
                error!("failed to fetch published fonts: {e}");
                return Gallery::failed(e.to_string());
            }
        };

        let mut candidates = Vec::new();
        let mut seen = Vec::with_capacity(records.len());
        {
            let mut registry = self.registry.lock();
            registry.begin_pass();
            for stored in &records {
                let Some(meta) = stored.record.to_metadata() else {
                    warn!(id = %stored.id, "skipping font record without family or url");
                    continue;
                };
                if registry.record_attempt(&meta.family) {
                    candidates.push(meta.clone());
                } else {
                    debug!(family = %meta.family, "family already registered in this pass");
                }
                seen.push(meta);
            }
        }

        let outcomes = join_all(candidates.iter().map(|meta| {
            self.registrar
                .register(&meta.family, &meta.source_url, meta.descriptor())
        }))
        .await;

        let mut families = Vec::with_capacity(candidates.len());
        {
            let mut registry = self.registry.lock();
            for (meta, ok) in candidates.iter().zip(outcomes) {
                if ok {
                    registry.record_loaded(&meta.family, meta.descriptor());
                    families.push(meta.family.clone());
                }
            }
        }
        sort_families(&mut families);

        let ready: HashSet<&str> = families.iter().map(String::as_str).collect();
        let mut keys = HashSet::new();
        let metas = seen
            .into_iter()
            .filter(|m| ready.contains(m.family.as_str()))
            .filter(|m| keys.insert(m.key()))
            .collect();

        info!(
            records = records.len(),
            families = families.len(),
            "loaded gallery"
        );
        Gallery {
            families,
            metas,
            error: None,
        }
    }

    /// Runs a load pass unless `token` is cancelled first.
    pub async fn load_until(&self, token: &CancellationToken) -> Option<Gallery> {
        tokio::select! {
            _ = token.cancelled() => {
                debug!("gallery load abandoned");
                None
            }
            gallery = self.load() => Some(gallery),
        }
    }

    /// Starts a background load pass bound to a new token.
    ///
    /// `on_loaded` runs only if the pass completes before [`Self::stop`]
    /// is called on the returned token.
    pub fn start<F>(self: &Arc<Self>, on_loaded: F) -> CancellationToken
    where
        F: FnOnce(Gallery) + Send + 'static,
    {
        let token = CancellationToken::new();
        let loader = Arc::clone(self);
        let task_token = token.clone();
        tokio::spawn(async move {
            if let Some(gallery) = loader.load_until(&task_token).await {
                if !task_token.is_cancelled() {
                    on_loaded(gallery);
                }
            }
        });
        token
    }

    /// Abandons the pass bound to `token`. Safe to call more than once.
    pub fn stop(token: &CancellationToken) {
        token.cancel();
    }

    /// Loaded variants tracked across passes.
    pub fn variants(&self, family: &str) -> Vec<crate::font::FaceDescriptor> {
        self.registry.lock().variants(family).to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::font::{FaceDescriptor, FontRecord};
    use crate::store::StoredRecord;
    use async_trait::async_trait;
    use std::time::Duration;

    #[derive(Default)]
    struct MemoryStore {
        records: Vec<StoredRecord>,
        fail: bool,
    }

    impl MemoryStore {
        fn with(records: &[(&str, &str, u16)]) -> Self {
            let records = records
                .iter()
                .enumerate()
                .map(|(i, (family, url, weight))| StoredRecord {
                    id: i.to_string(),
                    record: FontRecord {
                        family: Some(family.to_string()),
                        url: Some(url.to_string()),
                        weight: Some(*weight),
                        is_public: true,
                        ..Default::default()
                    },
                })
                .collect();
            Self { records, fail: false }
        }
    }

    #[async_trait]
    impl FontStore for MemoryStore {
        async fn published(&self) -> Result<Vec<StoredRecord>, StoreError> {
            if self.fail {
                return Err(StoreError::Io {
                    path: "memory".into(),
                    source: std::io::Error::other("store unreachable"),
                });
            }
            Ok(self.records.clone())
        }

        async fn create(&self, _record: FontRecord) -> Result<String, StoreError> {
            unimplemented!()
        }

        async fn delete_by_family(&self, _family: &str) -> Result<usize, StoreError> {
            unimplemented!()
        }
    }

    /// Records every call; fails families listed in `broken`; delays
    /// each family by the number in its name, in reverse.
    #[derive(Default)]
    struct RecordingRegistrar {
        calls: Mutex<Vec<(String, FaceDescriptor)>>,
        broken: Vec<&'static str>,
        staggered: bool,
    }

    #[async_trait]
    impl FontRegistrar for RecordingRegistrar {
        async fn register(&self, family: &str, _url: &str, descriptor: FaceDescriptor) -> bool {
            self.calls.lock().push((family.to_string(), descriptor));
            if self.staggered {
                let delay = 100u64.saturating_sub(numeric_key(family));
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            !self.broken.contains(&family)
        }
    }

    fn loader(store: MemoryStore, registrar: Arc<RecordingRegistrar>) -> GalleryLoader {
        GalleryLoader::new(Arc::new(store), registrar)
    }

    #[tokio::test]
    async fn sorts_numerically_not_lexicographically() {
        let store = MemoryStore::with(&[
            ("Font-2", "2.ttf", 400),
            ("Font-10", "10.ttf", 400),
            ("Font-1", "1.ttf", 400),
        ]);
        let gallery = loader(store, Arc::default()).load().await;
        assert_eq!(gallery.families, vec!["Font-1", "Font-2", "Font-10"]);
    }

    #[test]
    fn names_without_digits_sort_first_in_fetch_order() {
        let mut families = vec!["Zeta".to_string(), "Font-3".into(), "Alpha".into()];
        sort_families(&mut families);
        assert_eq!(families, vec!["Zeta", "Alpha", "Font-3"]);
        assert_eq!(numeric_key("v2-Font-7"), 2);
    }

    #[tokio::test]
    async fn registers_each_family_once() {
        let store = MemoryStore::with(&[
            ("Font-1", "regular.ttf", 400),
            ("Font-1", "bold.ttf", 700),
            ("Font-2", "2.ttf", 400),
        ]);
        let registrar = Arc::new(RecordingRegistrar::default());
        let gallery = loader(store, registrar.clone()).load().await;

        let calls = registrar.calls.lock().clone();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0, "Font-1");
        assert_eq!(calls[0].1.weight, 400);
        assert_eq!(gallery.families, vec!["Font-1", "Font-2"]);
        // The bold record is kept for re-embedding on export.
        assert_eq!(gallery.metas_for("Font-1").count(), 2);
    }

    #[tokio::test]
    async fn failed_fonts_are_left_out() {
        let store = MemoryStore::with(&[
            ("Font-1", "1.ttf", 400),
            ("Font-2", "broken.ttf", 400),
            ("Font-3", "3.ttf", 400),
        ]);
        let registrar = Arc::new(RecordingRegistrar {
            broken: vec!["Font-2"],
            ..Default::default()
        });
        let gallery = loader(store, registrar).load().await;
        assert_eq!(gallery.families, vec!["Font-1", "Font-3"]);
        assert!(gallery.metas.iter().all(|m| m.family != "Font-2"));
        assert!(gallery.error.is_none());
    }

    #[tokio::test]
    async fn records_missing_fields_are_skipped() {
        let mut store = MemoryStore::with(&[("Font-1", "1.ttf", 400)]);
        store.records.push(StoredRecord {
            id: "nourl".into(),
            record: FontRecord {
                family: Some("Font-9".into()),
                is_public: true,
                ..Default::default()
            },
        });
        let gallery = loader(store, Arc::default()).load().await;
        assert_eq!(gallery.families, vec!["Font-1"]);
    }

    #[tokio::test]
    async fn store_failure_is_an_empty_gallery() {
        let store = MemoryStore {
            fail: true,
            ..Default::default()
        };
        let gallery = loader(store, Arc::default()).load().await;
        assert!(gallery.is_empty());
        assert!(!gallery.can_export());
        assert!(gallery.error.is_some());
        assert!(gallery.empty_state_message().is_some());
    }

    #[tokio::test]
    async fn zero_published_fonts_disables_export() {
        let gallery = loader(MemoryStore::default(), Arc::default()).load().await;
        assert!(gallery.is_empty());
        assert!(gallery.error.is_none());
        assert!(!gallery.can_export());
        assert!(gallery.empty_state_message().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn order_does_not_depend_on_completion_order() {
        let store = MemoryStore::with(&[
            ("Font-3", "3.ttf", 400),
            ("Font-1", "1.ttf", 400),
            ("Font-2", "2.ttf", 400),
        ]);
        let registrar = Arc::new(RecordingRegistrar {
            staggered: true,
            ..Default::default()
        });
        let gallery = loader(store, registrar).load().await;
        assert_eq!(gallery.families, vec!["Font-1", "Font-2", "Font-3"]);
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_session_never_delivers() {
        let store = MemoryStore::with(&[("Font-1", "1.ttf", 400)]);
        let registrar = Arc::new(RecordingRegistrar {
            staggered: true,
            ..Default::default()
        });
        let loader = Arc::new(loader(store, registrar));
        let delivered = Arc::new(Mutex::new(None));

        let sink = delivered.clone();
        let token = loader.start(move |g| *sink.lock() = Some(g));
        tokio::task::yield_now().await;
        GalleryLoader::stop(&token);
        GalleryLoader::stop(&token);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(delivered.lock().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn started_session_delivers() {
        let store = MemoryStore::with(&[("Font-1", "1.ttf", 400)]);
        let loader = Arc::new(loader(store, Arc::default()));
        let delivered = Arc::new(Mutex::new(None));

        let sink = delivered.clone();
        let _token = loader.start(move |g| *sink.lock() = Some(g));
        tokio::time::sleep(Duration::from_millis(10)).await;
        let gallery = delivered.lock().take().expect("gallery delivered");
        assert_eq!(gallery.families, vec!["Font-1"]);
        assert_eq!(loader.variants("Font-1"), vec![FaceDescriptor::default()]);
    }
}
