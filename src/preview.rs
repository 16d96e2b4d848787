//! Previewing a font file before it is published.
//!
//! A selected file is bound to a temporary local URL so the registrar can
//! load it like any stored font. The binding lives exactly as long as the
//! session holds it.

use std::io::Write as _;

use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::context::FontRegistrar;
use crate::error::PreviewError;
use crate::font::{FaceDescriptor, FontFormat};
use crate::publish::{Identity, Publisher};
use crate::store::StoredRecord;
use crate::upload::validate_font_file;

struct SelectedFile {
    name: String,
    format: FontFormat,
    bytes: Vec<u8>,
}

/// One add-font session: a family name, a file and its preview binding.
#[derive(Default)]
pub struct PreviewSession {
    family: String,
    file: Option<SelectedFile>,
    binding: Option<NamedTempFile>,
    registered: bool,
    committed: bool,
}

impl PreviewSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    /// Renaming the family invalidates an earlier preview registration.
    pub fn set_family(&mut self, family: impl Into<String>) {
        let family = family.into();
        if family.trim() != self.family.trim() {
            self.registered = false;
        }
        self.family = family;
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file.as_ref().map(|f| f.name.as_str())
    }

    /// Selects a file. A file without a font extension is rejected and
    /// the session is left as it was.
    pub fn select_file(&mut self, name: &str, bytes: Vec<u8>) -> Result<(), PreviewError> {
        if self.committed {
            return Err(PreviewError::Committed);
        }
        let format = validate_font_file(name)?;
        self.release();
        self.file = Some(SelectedFile {
            name: name.to_string(),
            format,
            bytes,
        });
        Ok(())
    }

    pub fn can_register(&self) -> bool {
        !self.family.trim().is_empty() && self.file.is_some()
    }

    pub fn is_registered(&self) -> bool {
        self.registered
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    /// The temporary URL the selected file is bound to, if any.
    pub fn binding_url(&self) -> Option<String> {
        self.binding
            .as_ref()
            .map(|tmp| format!("file://{}", tmp.path().display()))
    }

    /// Binds the selected file and registers it under the session's family.
    pub async fn register(&mut self, registrar: &dyn FontRegistrar) -> Result<(), PreviewError> {
        let family = self.family.trim().to_string();
        if family.is_empty() {
            return Err(PreviewError::NoFamily);
        }
        let url = match self.binding_url() {
            Some(url) => url,
            None => self.bind()?,
        };

        self.registered = registrar.register(&family, &url, FaceDescriptor::default()).await;
        if !self.registered {
            return Err(PreviewError::LoadFailed);
        }
        info!(%family, "font ready for preview");
        Ok(())
    }

    fn bind(&mut self) -> Result<String, PreviewError> {
        let file = self.file.as_ref().ok_or(PreviewError::NoFile)?;
        let mut tmp = tempfile::Builder::new()
            .prefix("font-preview-")
            .suffix(&format!(".{}", file.format.extension()))
            .tempfile()?;
        tmp.write_all(&file.bytes)?;
        tmp.flush()?;
        debug!(path = %tmp.path().display(), "bound preview file");
        self.binding = Some(tmp);
        self.binding_url().ok_or(PreviewError::NoFile)
    }

    /// Publishes the previewed file and commits the session.
    pub async fn confirm(
        &mut self,
        publisher: &Publisher,
        identity: Option<&Identity>,
    ) -> Result<StoredRecord, PreviewError> {
        if self.committed {
            return Err(PreviewError::Committed);
        }
        if !self.registered {
            return Err(PreviewError::NotRegistered);
        }
        let file = self.file.as_ref().ok_or(PreviewError::NoFile)?;
        let stored = publisher
            .publish_font(identity, &self.family, &file.name, file.bytes.clone())
            .await?;
        self.committed = true;
        self.release();
        Ok(stored)
    }

    /// Deletes the temporary binding. Returns whether there was one.
    pub fn release(&mut self) -> bool {
        self.registered = false;
        match self.binding.take() {
            Some(tmp) => {
                debug!(path = %tmp.path().display(), "released preview binding");
                true
            }
            None => false,
        }
    }
}

impl Drop for PreviewSession {
    fn drop(&mut self) {
        self.release();
    }
}
