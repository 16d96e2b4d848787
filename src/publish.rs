//! Publishing a font into the gallery and taking families out of it.

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use tracing::{info, warn};

use crate::error::{PublishError, UploadError};
use crate::font::{DEFAULT_WEIGHT, FontRecord, FontStyle, slugify};
use crate::store::{FontStore, StoredRecord};
use crate::upload::{UploadFile, UploadRequest, UploadService, validate_font_file};

/// Written into `provider` on every record this crate creates.
pub const PROVIDER: &str = "fs-blob";

/// A signed-in user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub uid: String,
}

impl Identity {
    pub fn new(uid: impl Into<String>) -> Self {
        Self { uid: uid.into() }
    }
}

/// A family picked for removal, with the blob URL it was shown from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovalTarget {
    pub family: String,
    pub url: String,
}

/// What happened to one family's records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FamilyRemoval {
    pub family: String,
    pub success: bool,
    pub deleted: usize,
    pub error: Option<String>,
}

/// Uploads binaries and keeps the metadata store in step.
#[derive(Clone)]
pub struct Publisher {
    uploads: UploadService,
    store: Arc<dyn FontStore>,
}

impl Publisher {
    pub fn new(uploads: UploadService, store: Arc<dyn FontStore>) -> Self {
        Self { uploads, store }
    }

    /// Uploads `bytes` under `fonts/<slug>` and records them as a public
    /// regular face of `family`.
    ///
    /// The file is checked before anything leaves the process.
    pub async fn publish_font(
        &self,
        identity: Option<&Identity>,
        family: &str,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<StoredRecord, PublishError> {
        let identity = identity.ok_or(PublishError::SignInRequired)?;
        let family = family.trim();
        if family.is_empty() {
            return Err(UploadError::BadRequest("Font name is required".to_string()).into());
        }
        let format = validate_font_file(file_name)?;
        let family_slug = slugify(family);

        let request = UploadRequest {
            file: Some(UploadFile {
                name: file_name.to_string(),
                content_type: String::new(),
                bytes,
            }),
            prefix: format!("fonts/{family_slug}"),
            headers: vec![("x-user-id".to_string(), identity.uid.clone())],
        };
        let uploaded = self.uploads.upload(request).await?;

        let record = FontRecord {
            family: Some(family.to_string()),
            family_slug: Some(family_slug),
            variant: Some("regular".to_string()),
            weight: Some(DEFAULT_WEIGHT),
            style: Some(FontStyle::Normal.as_css().to_string()),
            ext: Some(format.extension().to_string()),
            content_type: Some(uploaded.content_type),
            url: Some(uploaded.url),
            path: Some(uploaded.pathname),
            user_id: Some(identity.uid.clone()),
            is_public: true,
            created_at: Some(Utc::now()),
            provider: Some(PROVIDER.to_string()),
        };
        let id = self.store.create(record.clone()).await?;
        info!(%family, %id, "published font");
        Ok(StoredRecord { id, record })
    }

    /// Deletes the blobs behind `targets`, then every record of each family.
    ///
    /// A blob call that fails outright aborts before the store is touched.
    /// Families are then removed independently.
    pub async fn remove_fonts(&self, targets: &[RemovalTarget]) -> Result<Vec<FamilyRemoval>, PublishError> {
        let urls: Vec<String> = targets.iter().map(|t| t.url.clone()).collect();
        let blobs = self.uploads.delete(&urls).await?;
        if blobs.failed > 0 {
            warn!(failed = blobs.failed, "some blobs could not be deleted");
        }

        let outcomes = join_all(targets.iter().map(|target| async move {
            match self.store.delete_by_family(&target.family).await {
                Ok(deleted) => FamilyRemoval {
                    family: target.family.clone(),
                    success: true,
                    deleted,
                    error: None,
                },
                Err(e) => {
                    warn!(family = %target.family, "failed to delete records: {e}");
                    FamilyRemoval {
                        family: target.family.clone(),
                        success: false,
                        deleted: 0,
                        error: Some(e.to_string()),
                    }
                }
            }
        }))
        .await;

        info!(
            removed = outcomes.iter().filter(|o| o.success).count(),
            requested = targets.len(),
            "removed fonts"
        );
        Ok(outcomes)
    }
}
