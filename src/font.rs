//! Font metadata types shared by the gallery, the store and the export.
//!
//! [`FontRecord`] is the loosely-typed document as it sits in the store.
//! [`FontMetadata`] is the validated, immutable view the rest of the crate
//! works with once a record has been fetched.

use serde::{Deserialize, Serialize};

/// Default weight for records that do not specify one.
pub const DEFAULT_WEIGHT: u16 = 400;

// ============================================================================
// FontStyle / FontFormat
// ============================================================================

/// Slant of a face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontStyle {
    #[default]
    Normal,
    Italic,
}

impl FontStyle {
    /// Parses a stored style value. Anything other than `italic` is normal.
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("italic") {
            Self::Italic
        } else {
            Self::Normal
        }
    }

    pub fn as_css(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Italic => "italic",
        }
    }
}

/// Binary font container, identified by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FontFormat {
    Ttf,
    Otf,
    Woff,
    Woff2,
}

impl FontFormat {
    /// Accepted upload extensions, lowercase with the leading dot.
    pub const EXTENSIONS: [&'static str; 4] = [".ttf", ".otf", ".woff", ".woff2"];

    /// Detects the format from the tail of a file name or URL.
    ///
    /// Matching is case-insensitive. Returns `None` for anything that is
    /// not one of the four accepted extensions.
    pub fn from_path(path: &str) -> Option<Self> {
        let lower = path.to_ascii_lowercase();
        if lower.ends_with(".woff2") {
            Some(Self::Woff2)
        } else if lower.ends_with(".woff") {
            Some(Self::Woff)
        } else if lower.ends_with(".ttf") {
            Some(Self::Ttf)
        } else if lower.ends_with(".otf") {
            Some(Self::Otf)
        } else {
            None
        }
    }

    /// The `format()` hint used in `@font-face` declarations.
    pub fn css_format(&self) -> &'static str {
        match self {
            Self::Ttf => "truetype",
            Self::Otf => "opentype",
            Self::Woff => "woff",
            Self::Woff2 => "woff2",
        }
    }

    /// The registered media type.
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Ttf => "font/ttf",
            Self::Otf => "font/otf",
            Self::Woff => "font/woff",
            Self::Woff2 => "font/woff2",
        }
    }

    /// The extension without the leading dot.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Ttf => "ttf",
            Self::Otf => "otf",
            Self::Woff => "woff",
            Self::Woff2 => "woff2",
        }
    }
}

// ============================================================================
// Face identity
// ============================================================================

/// Weight and style requested for a face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FaceDescriptor {
    pub weight: u16,
    pub style: FontStyle,
}

impl Default for FaceDescriptor {
    fn default() -> Self {
        Self {
            weight: DEFAULT_WEIGHT,
            style: FontStyle::Normal,
        }
    }
}

/// A `(family, weight, style)` triple: one variant bound to one binary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FaceKey {
    pub family: String,
    pub weight: u16,
    pub style: FontStyle,
}

impl FaceKey {
    pub fn new(family: impl Into<String>, descriptor: FaceDescriptor) -> Self {
        Self {
            family: family.into(),
            weight: descriptor.weight,
            style: descriptor.style,
        }
    }

    pub fn descriptor(&self) -> FaceDescriptor {
        FaceDescriptor {
            weight: self.weight,
            style: self.style,
        }
    }
}

// ============================================================================
// FontMetadata
// ============================================================================

/// A published font as the gallery knows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FontMetadata {
    /// Display key, unique within a session.
    pub family: String,
    /// Opaque locator of the binary.
    #[serde(rename = "url")]
    pub source_url: String,
    #[serde(default = "default_weight")]
    pub weight: u16,
    #[serde(default)]
    pub style: FontStyle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

fn default_weight() -> u16 {
    DEFAULT_WEIGHT
}

impl FontMetadata {
    pub fn new(family: impl Into<String>, source_url: impl Into<String>) -> Self {
        Self {
            family: family.into(),
            source_url: source_url.into(),
            weight: DEFAULT_WEIGHT,
            style: FontStyle::Normal,
            content_type: None,
        }
    }

    pub fn with_weight(mut self, weight: u16) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_style(mut self, style: FontStyle) -> Self {
        self.style = style;
        self
    }

    pub fn descriptor(&self) -> FaceDescriptor {
        FaceDescriptor {
            weight: self.weight,
            style: self.style,
        }
    }

    pub fn key(&self) -> FaceKey {
        FaceKey::new(self.family.clone(), self.descriptor())
    }

    /// Format implied by the source URL, falling back to WOFF2.
    pub fn format(&self) -> FontFormat {
        FontFormat::from_path(&self.source_url).unwrap_or(FontFormat::Woff2)
    }
}

// ============================================================================
// FontRecord
// ============================================================================

/// A font document as stored in the metadata store.
///
/// Every field is optional on read; [`FontRecord::to_metadata`] decides
/// whether the record is usable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FontRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

impl FontRecord {
    /// Converts to metadata, or `None` when `family` or `url` is missing.
    pub fn to_metadata(&self) -> Option<FontMetadata> {
        let family = self.family.as_deref().filter(|f| !f.trim().is_empty())?;
        let url = self.url.as_deref().filter(|u| !u.trim().is_empty())?;
        Some(FontMetadata {
            family: family.to_string(),
            source_url: url.to_string(),
            weight: self.weight.unwrap_or(DEFAULT_WEIGHT),
            style: self
                .style
                .as_deref()
                .map(FontStyle::parse)
                .unwrap_or_default(),
            content_type: self.content_type.clone(),
        })
    }
}

/// Lowercases and reduces a family name to `[a-z0-9-]`, spaces as dashes.
pub fn slugify(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-')
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_detection_is_case_insensitive() {
        assert_eq!(FontFormat::from_path("Sample.TTF"), Some(FontFormat::Ttf));
        assert_eq!(FontFormat::from_path("a.otf"), Some(FontFormat::Otf));
        assert_eq!(FontFormat::from_path("a.woff"), Some(FontFormat::Woff));
        assert_eq!(FontFormat::from_path("a.Woff2"), Some(FontFormat::Woff2));
        assert_eq!(FontFormat::from_path("a.png"), None);
        assert_eq!(FontFormat::from_path("ttf"), None);
    }

    #[test]
    fn css_format_falls_back_to_woff2() {
        let meta = FontMetadata::new("A", "https://cdn/x/font");
        assert_eq!(meta.format().css_format(), "woff2");
        let meta = FontMetadata::new("A", "https://cdn/x/font.otf");
        assert_eq!(meta.format().css_format(), "opentype");
    }

    #[test]
    fn record_without_family_or_url_is_skipped() {
        let record = FontRecord {
            family: Some("Font-1".into()),
            ..Default::default()
        };
        assert!(record.to_metadata().is_none());

        let record = FontRecord {
            family: Some("  ".into()),
            url: Some("u.ttf".into()),
            ..Default::default()
        };
        assert!(record.to_metadata().is_none());
    }

    #[test]
    fn record_defaults_weight_and_style() {
        let record = FontRecord {
            family: Some("Font-1".into()),
            url: Some("https://cdn/f.ttf".into()),
            style: Some("Italic".into()),
            ..Default::default()
        };
        let meta = record.to_metadata().unwrap();
        assert_eq!(meta.weight, 400);
        assert_eq!(meta.style, FontStyle::Italic);
    }

    #[test]
    fn record_json_uses_camel_case() {
        let json = r#"{"family":"A","url":"a.ttf","isPublic":true,"contentType":"font/ttf"}"#;
        let record: FontRecord = serde_json::from_str(json).unwrap();
        assert!(record.is_public);
        assert_eq!(record.content_type.as_deref(), Some("font/ttf"));
    }

    #[test]
    fn slugify_names() {
        assert_eq!(slugify("  My Font 2 "), "my-font-2");
        assert_eq!(slugify("Neko_Font!"), "nekofont");
    }
}
