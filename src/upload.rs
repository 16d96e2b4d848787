//! The upload and delete endpoints of the binary object store.
//!
//! Uploads land under `{prefix/}{uid}/{slug}/{safe_name}` with a random
//! suffix before the extension, so two uploads of the same file never
//! collide. Deletes are per URL, and one failure never stops the rest.

use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use futures::future::join_all;
use rand::Rng;
use rand::distributions::Alphanumeric;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{BlobError, UploadError};
use crate::font::FontFormat;

/// Identity used when the request names none.
pub const ANONYMOUS: &str = "anonymous";

const SLUG_LEN: usize = 8;
const SUFFIX_LEN: usize = 21;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

static UNSAFE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_.\-]").expect("static pattern"));
static UID_COOKIE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|;\s*)uid=([^;]+)").expect("static pattern"));

// ============================================================================
// Request shaping
// ============================================================================

/// Checks that `file_name` carries a font extension.
pub fn validate_font_file(file_name: &str) -> Result<FontFormat, UploadError> {
    FontFormat::from_path(file_name).ok_or_else(|| UploadError::UnsupportedType {
        file_name: file_name.to_string(),
    })
}

/// The supplied content type, or one inferred from the extension when the
/// client sent nothing useful.
pub fn infer_content_type(file_name: &str, supplied: &str) -> String {
    let supplied = supplied.trim();
    if !supplied.is_empty() && supplied != "application/octet-stream" {
        return supplied.to_string();
    }
    FontFormat::from_path(file_name)
        .map(|f| f.content_type())
        .unwrap_or("application/octet-stream")
        .to_string()
}

/// Replaces everything outside `[A-Za-z0-9_.-]` with `_`.
pub fn safe_name(file_name: &str) -> String {
    UNSAFE_CHARS.replace_all(file_name, "_").into_owned()
}

/// Eight random base-36 characters.
pub fn random_slug() -> String {
    let mut rng = rand::thread_rng();
    (0..SLUG_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect()
}

/// One path segment safe to join under a storage root. Dot-only segments
/// have no safe form and come back empty.
fn safe_segment(value: &str) -> String {
    let segment = safe_name(value.trim());
    if segment.bytes().all(|b| b == b'.') {
        String::new()
    } else {
        segment
    }
}

/// `{prefix/}{uid}/{slug}/{safe_name}`.
///
/// Every component is sanitized, so the result never climbs out of the
/// directory it is joined onto.
pub fn storage_path(prefix: &str, uid: &str, slug: &str, file_name: &str) -> String {
    let mut segments: Vec<String> = prefix
        .split('/')
        .map(safe_segment)
        .filter(|seg| !seg.is_empty())
        .collect();
    let uid = match safe_segment(uid) {
        uid if uid.is_empty() => ANONYMOUS.to_string(),
        uid => uid,
    };
    segments.push(uid);
    segments.push(safe_segment(slug));
    segments.push(safe_name(file_name));
    segments.join("/")
}

/// Whether `pathname` is a plain relative path: no empty, `.` or `..`
/// segments and no leading slash.
fn is_contained(pathname: &str) -> bool {
    !pathname.is_empty()
        && pathname
            .split('/')
            .all(|seg| !seg.is_empty() && seg != "." && seg != ".." && !seg.contains('\\'))
}

/// Who is uploading: the `x-user-id` header, else the `uid` cookie, else
/// [`ANONYMOUS`].
pub fn identity_from_headers(headers: &[(String, String)]) -> String {
    let header = |name: &str| {
        headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    };

    if let Some(uid) = header("x-user-id").map(str::trim).filter(|v| !v.is_empty()) {
        return uid.to_string();
    }
    header("cookie")
        .and_then(|cookie| UID_COOKIE.captures(cookie))
        .and_then(|caps| caps.get(1))
        .map(|m| percent_decode(m.as_str()))
        .unwrap_or_else(|| ANONYMOUS.to_string())
}

/// Decodes `%XX` escapes, keeping malformed ones verbatim.
fn percent_decode(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() && bytes[i + 1..i + 3].iter().all(u8::is_ascii_hexdigit) {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(b) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(b);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Inserts `-{suffix}` before the extension of the last path segment.
fn with_suffix(pathname: &str, suffix: &str) -> String {
    let (dir, name) = match pathname.rsplit_once('/') {
        Some((dir, name)) => (Some(dir), name),
        None => (None, pathname),
    };
    let name = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem}-{suffix}.{ext}"),
        _ => format!("{name}-{suffix}"),
    };
    match dir {
        Some(dir) => format!("{dir}/{name}"),
        None => name,
    }
}

// ============================================================================
// BlobStore
// ============================================================================

/// A stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub url: String,
    pub pathname: String,
}

/// Binary object storage with public URLs.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores `bytes` near `pathname` (a random suffix is added).
    async fn put(&self, pathname: &str, bytes: &[u8], content_type: &str) -> Result<Blob, BlobError>;

    async fn delete(&self, url: &str) -> Result<(), BlobError>;
}

/// Keeps blobs as files under a root directory served at `base_url`.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
    base_url: String,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Local path behind a public URL of this store.
    fn locate(&self, url: &str) -> Result<PathBuf, BlobError> {
        let rest = url
            .strip_prefix(self.base_url.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|rest| is_contained(rest))
            .ok_or_else(|| BlobError::NotFound(url.to_string()))?;
        Ok(self.root.join(rest))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, pathname: &str, bytes: &[u8], content_type: &str) -> Result<Blob, BlobError> {
        if !is_contained(pathname) {
            return Err(BlobError::InvalidPath(pathname.to_string()));
        }
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(SUFFIX_LEN)
            .map(char::from)
            .collect();
        let pathname = with_suffix(pathname, &suffix);
        let path = self.root.join(&pathname);

        let io = |source| BlobError::Io {
            path: path.clone(),
            source,
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io)?;
        }
        tokio::fs::write(&path, bytes).await.map_err(io)?;
        debug!(%pathname, content_type, size = bytes.len(), "stored blob");

        Ok(Blob {
            url: format!("{}/{}", self.base_url, pathname),
            pathname,
        })
    }

    async fn delete(&self, url: &str) -> Result<(), BlobError> {
        let path = self.locate(url)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(BlobError::NotFound(url.to_string())),
            Err(source) => Err(BlobError::Io { path, source }),
        }
    }
}

// ============================================================================
// UploadService
// ============================================================================

/// A file part of an upload.
#[derive(Debug, Clone, Default)]
pub struct UploadFile {
    pub name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// An upload as the endpoint receives it.
#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    pub file: Option<UploadFile>,
    pub prefix: String,
    pub headers: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub ok: bool,
    pub url: String,
    pub pathname: String,
    pub size: u64,
    pub content_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteResult {
    pub url: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub ok: bool,
    pub deleted: usize,
    pub failed: usize,
    pub results: Vec<DeleteResult>,
}

/// The upload and delete endpoints.
#[derive(Clone)]
pub struct UploadService {
    blobs: Arc<dyn BlobStore>,
}

impl UploadService {
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self { blobs }
    }

    pub async fn upload(&self, request: UploadRequest) -> Result<UploadResponse, UploadError> {
        let file = request.file.ok_or(UploadError::MissingFile)?;
        validate_font_file(&file.name)?;

        let content_type = infer_content_type(&file.name, &file.content_type);
        let uid = identity_from_headers(&request.headers);
        let path = storage_path(&request.prefix, &uid, &random_slug(), &file.name);
        debug!(file = %file.name, size = file.bytes.len(), %path, %content_type, "uploading");

        let blob = self.blobs.put(&path, &file.bytes, &content_type).await?;
        info!(url = %blob.url, "upload successful");

        Ok(UploadResponse {
            ok: true,
            url: blob.url,
            pathname: blob.pathname,
            size: file.bytes.len() as u64,
            content_type,
        })
    }

    pub async fn delete(&self, urls: &[String]) -> Result<DeleteResponse, UploadError> {
        if urls.is_empty() {
            return Err(UploadError::BadRequest("URLs array is required".to_string()));
        }

        let results: Vec<DeleteResult> = join_all(urls.iter().map(|url| async move {
            match self.blobs.delete(url).await {
                Ok(()) => {
                    debug!(%url, "deleted blob");
                    DeleteResult {
                        url: url.clone(),
                        success: true,
                        error: None,
                    }
                }
                Err(e) => {
                    warn!(%url, "failed to delete blob: {e}");
                    DeleteResult {
                        url: url.clone(),
                        success: false,
                        error: Some(e.to_string()),
                    }
                }
            }
        }))
        .await;

        let deleted = results.iter().filter(|r| r.success).count();
        let failed = results.len() - deleted;
        info!(deleted, failed, "deletion complete");
        Ok(DeleteResponse {
            ok: true,
            deleted,
            failed,
            results,
        })
    }
}
