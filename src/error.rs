//! Error types for each concern of the gallery.
//!
//! Per-item failures (one font that will not load, one blob that will not
//! delete) are logged and folded into results. The enums here cover the
//! whole-operation failures that callers must see.

use std::path::PathBuf;

/// Failure to resolve a resource locator to bytes.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("unsupported resource locator: {0}")]
    Unsupported(String),
    #[error("failed to read {url}: {source}")]
    Io {
        url: String,
        #[source]
        source: std::io::Error,
    },
}

/// Failure to add a face to a font context.
#[derive(Debug, thiserror::Error)]
pub enum RegisterError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("no usable font faces in {0}")]
    NoFaces(String),
}

/// Failure of the metadata store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("store document is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Failure of the binary object store.
#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("blob not found: {0}")]
    NotFound(String),
    #[error("invalid blob path: {0}")]
    InvalidPath(String),
    #[error("blob I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Rejections and failures of the upload and delete endpoints.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("File is required")]
    MissingFile,
    #[error("Unsupported file type. Please upload .ttf, .otf, .woff, or .woff2 files.")]
    UnsupportedType { file_name: String },
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Blob(#[from] BlobError),
}

impl UploadError {
    /// The HTTP status an endpoint reports for this error.
    pub fn status(&self) -> u16 {
        match self {
            Self::MissingFile | Self::BadRequest(_) | Self::Blob(BlobError::InvalidPath(_)) => 400,
            Self::UnsupportedType { .. } => 415,
            Self::Blob(_) => 500,
        }
    }
}

/// Failures of the client-side publish and remove flows.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("please sign in: you must be logged in to add fonts")]
    SignInRequired,
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failures of the preview binding.
#[derive(Debug, thiserror::Error)]
pub enum PreviewError {
    #[error("no font file selected")]
    NoFile,
    #[error("font family name is empty")]
    NoFamily,
    #[error("font has not been loaded for preview")]
    NotRegistered,
    #[error("font was already published from this session")]
    Committed,
    #[error(transparent)]
    Rejected(#[from] UploadError),
    #[error("could not load font for preview")]
    LoadFailed,
    #[error("could not create preview binding: {0}")]
    Binding(#[from] std::io::Error),
    #[error(transparent)]
    Publish(#[from] PublishError),
}

/// Failure reading or writing durable preferences.
#[derive(Debug, thiserror::Error)]
pub enum PrefsError {
    #[error("preference storage I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("preference value is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Whole-export failures. Individual fonts that fail to load never
/// produce one of these.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("export is not ready")]
    NotReady,
    #[error("export was cancelled")]
    Cancelled,
    #[error("nothing to export: the gallery is empty")]
    EmptyGallery,
    #[error("failed to build export surface: {0}")]
    Surface(String),
    #[error("rasterization failed: {0}")]
    Raster(String),
    #[error("failed to encode image: {0}")]
    Encode(#[from] image::ImageError),
    #[error("failed to write {path}: {source}")]
    Download {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure loading the configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
