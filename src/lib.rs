//! font-gallery: font preview gallery with image export
//!
//! This crate loads published font records, registers each family with a
//! shared rendering context, keeps per-family preview sizes, and exports
//! the whole gallery as one PNG whose fonts are re-derived from the stored
//! metadata.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use font_gallery::{
//!     ExportPipeline, ExportSnapshot, FontContext, FsFetcher, GalleryLoader,
//!     JsonFontStore, MemoryPreferenceStorage, SizePreferences, SizeTier,
//! };
//!
//! # async fn run() -> Result<(), font_gallery::ExportError> {
//! let fetcher = Arc::new(FsFetcher::new());
//! let context = Arc::new(FontContext::new(fetcher.clone()));
//! let store = Arc::new(JsonFontStore::new("fonts.json"));
//!
//! // Register every published family and sort them
//! let loader = GalleryLoader::new(store, context.clone());
//! let gallery = loader.load().await;
//!
//! // Sizes persist per family
//! let storage = Arc::new(MemoryPreferenceStorage::new());
//! let mut prefs = SizePreferences::load(storage, SizeTier::Medium, font_gallery::DEFAULT_DEBOUNCE);
//! prefs.prune_to(gallery.families.as_slice());
//!
//! // Export once the countdown and fonts have settled
//! let export = ExportPipeline::with_resvg(Default::default(), context, fetcher);
//! export.open();
//! export.wait_ready().await?;
//! let snapshot = ExportSnapshot::from_gallery(&gallery, &prefs, "The quick brown fox");
//! let path = export.capture(&snapshot).await?;
//! println!("saved {}", path.display());
//! # Ok(())
//! # }
//! ```
//!
//! # Publishing
//!
//! [`Publisher`] uploads a binary through [`UploadService`] and records it
//! in the [`FontStore`]; [`PreviewSession`] binds a not-yet-published file
//! so it can be previewed first.

pub mod config;
mod context;
mod debounce;
mod error;
pub mod export;
mod fetch;
mod font;
mod gallery;
mod geometry;
mod prefs;
mod preview;
mod publish;
mod registry;
mod store;
mod upload;

pub use config::Config;
pub use context::{FontContext, FontRegistrar, LoadedFace};
pub use debounce::Debouncer;
pub use error::{
    BlobError, ConfigError, ExportError, FetchError, PrefsError, PreviewError, PublishError,
    RegisterError, StoreError, UploadError,
};
pub use export::{ExportPipeline, ExportSnapshot, ExportState, GridLayout};
pub use fetch::{FsFetcher, ResourceFetcher};
pub use font::{
    DEFAULT_WEIGHT, FaceDescriptor, FaceKey, FontFormat, FontMetadata, FontRecord, FontStyle,
    slugify,
};
pub use gallery::{Gallery, GalleryLoader, numeric_key, sort_families};
pub use geometry::{RectPx, SizePx};
pub use prefs::{
    DEFAULT_DEBOUNCE, FilePreferenceStorage, MAX_PX, MIN_PX, MemoryPreferenceStorage,
    PreferenceStorage, STORAGE_KEY, SizePreferences, SizeTier,
};
pub use preview::PreviewSession;
pub use publish::{FamilyRemoval, Identity, PROVIDER, Publisher, RemovalTarget};
pub use registry::FontRegistry;
pub use store::{FontStore, JsonFontStore, StoredRecord};
pub use upload::{
    ANONYMOUS, Blob, BlobStore, DeleteResponse, DeleteResult, FsBlobStore, UploadFile,
    UploadRequest, UploadResponse, UploadService,
};
