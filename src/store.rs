//! Metadata store holding font records.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::StoreError;
use crate::font::FontRecord;

/// A record together with its document id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: String,
    #[serde(flatten)]
    pub record: FontRecord,
}

/// Document store for font records.
#[async_trait]
pub trait FontStore: Send + Sync {
    /// Every record flagged publicly visible, in store order.
    async fn published(&self) -> Result<Vec<StoredRecord>, StoreError>;

    /// Creates a record and returns its id.
    async fn create(&self, record: FontRecord) -> Result<String, StoreError>;

    /// Deletes every record whose family equals `family`. Returns the count.
    async fn delete_by_family(&self, family: &str) -> Result<usize, StoreError>;
}

// ============================================================================
// JsonFontStore
// ============================================================================

/// Keeps the whole collection as a JSON array in one file.
///
/// A missing file is an empty collection. Writes go through a temporary
/// file and a rename.
#[derive(Debug)]
pub struct JsonFontStore {
    path: PathBuf,
    lock: tokio::sync::Mutex<()>,
}

impl JsonFontStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<Vec<StoredRecord>, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Vec::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(source) => Err(StoreError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    async fn write_all(&self, records: &[StoredRecord]) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
            }
        }
        let json = serde_json::to_vec_pretty(records)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io_err)?;
        Ok(())
    }
}

#[async_trait]
impl FontStore for JsonFontStore {
    async fn published(&self) -> Result<Vec<StoredRecord>, StoreError> {
        let _guard = self.lock.lock().await;
        let records = self.read_all().await?;
        Ok(records.into_iter().filter(|r| r.record.is_public).collect())
    }

    async fn create(&self, record: FontRecord) -> Result<String, StoreError> {
        let _guard = self.lock.lock().await;
        let mut records = self.read_all().await?;
        let id = uuid::Uuid::new_v4().to_string();
        records.push(StoredRecord {
            id: id.clone(),
            record,
        });
        self.write_all(&records).await?;
        debug!(%id, "created font record");
        Ok(id)
    }

    async fn delete_by_family(&self, family: &str) -> Result<usize, StoreError> {
        let _guard = self.lock.lock().await;
        let mut records = self.read_all().await?;
        let before = records.len();
        records.retain(|r| r.record.family.as_deref() != Some(family));
        let removed = before - records.len();
        if removed > 0 {
            self.write_all(&records).await?;
        }
        debug!(family, removed, "deleted font records");
        Ok(removed)
    }
}
