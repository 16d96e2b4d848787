//! Resolving resource locators to font bytes.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::FetchError;

/// Loads the binary behind a resource locator.
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Fetches from the local filesystem.
///
/// Understands three locator shapes:
/// - URLs under the blob store's public base, mapped into its root directory
/// - `file://` URLs
/// - bare filesystem paths
#[derive(Debug, Clone, Default)]
pub struct FsFetcher {
    public: Option<(String, PathBuf)>,
}

impl FsFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps URLs starting with `base_url` onto files under `root`.
    pub fn with_public_base(mut self, base_url: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        let base = base_url.into().trim_end_matches('/').to_string();
        self.public = Some((base, root.into()));
        self
    }

    /// Returns the local path a locator refers to.
    pub fn resolve(&self, url: &str) -> Result<PathBuf, FetchError> {
        if let Some((base, root)) = &self.public {
            let rest = url
                .strip_prefix(base.as_str())
                .filter(|rest| rest.is_empty() || rest.starts_with('/'));
            if let Some(rest) = rest {
                let rest = rest.trim_start_matches('/');
                if rest.split('/').any(|seg| seg == "..") {
                    return Err(FetchError::Unsupported(url.to_string()));
                }
                return Ok(root.join(rest));
            }
        }
        if let Some(path) = url.strip_prefix("file://") {
            return Ok(PathBuf::from(path));
        }
        if url.contains("://") {
            return Err(FetchError::Unsupported(url.to_string()));
        }
        Ok(Path::new(url).to_path_buf())
    }
}

#[async_trait]
impl ResourceFetcher for FsFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let path = self.resolve(url)?;
        tokio::fs::read(&path).await.map_err(|source| FetchError::Io {
            url: url.to_string(),
            source,
        })
    }
}
