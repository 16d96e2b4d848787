//! `@font-face` declarations re-derived from stored metadata.
//!
//! The rasterizer does not see faces registered with the session's
//! context, so the export carries its own declarations: one rule per
//! stored variant of every family drawn in the composition.

use std::collections::HashSet;

use crate::font::{FaceDescriptor, FontMetadata};

/// One `@font-face` rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FontFaceRule {
    pub family: String,
    pub url: String,
    pub format: &'static str,
    pub descriptor: FaceDescriptor,
}

impl FontFaceRule {
    pub fn from_meta(meta: &FontMetadata) -> Self {
        Self {
            family: meta.family.clone(),
            url: meta.source_url.clone(),
            format: meta.format().css_format(),
            descriptor: meta.descriptor(),
        }
    }

    pub fn to_css(&self) -> String {
        format!(
            "@font-face{{\n  font-family:'{}';\n  src:url('{}') format('{}');\n  font-weight:{};\n  font-style:{};\n  font-display:swap;\n}}",
            css_escape(&self.family),
            css_escape(&self.url),
            self.format,
            self.descriptor.weight,
            self.descriptor.style.as_css(),
        )
    }
}

/// Rules for every meta whose family is in `families`, one per variant.
pub fn rules_for<'a, I>(metas: &[FontMetadata], families: I) -> Vec<FontFaceRule>
where
    I: IntoIterator<Item = &'a str>,
{
    let wanted: HashSet<&str> = families.into_iter().collect();
    let mut seen = HashSet::new();
    metas
        .iter()
        .filter(|m| wanted.contains(m.family.as_str()))
        .filter(|m| seen.insert(m.key()))
        .map(FontFaceRule::from_meta)
        .collect()
}

/// Joins rules into one style sheet.
pub fn build_font_face_css(rules: &[FontFaceRule]) -> String {
    rules.iter().map(FontFaceRule::to_css).collect::<Vec<_>>().join("\n")
}

/// Escapes a value for a single-quoted CSS string.
fn css_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\'' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            '\n' | '\r' => out.push(' '),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::font::FontStyle;

    #[test]
    fn rule_css_names_format_weight_and_style() {
        let meta = FontMetadata::new("Font-1", "https://blob.local/a/font.woff")
            .with_weight(700)
            .with_style(FontStyle::Italic);
        let css = FontFaceRule::from_meta(&meta).to_css();
        assert!(css.contains("font-family:'Font-1';"));
        assert!(css.contains("src:url('https://blob.local/a/font.woff') format('woff');"));
        assert!(css.contains("font-weight:700;"));
        assert!(css.contains("font-style:italic;"));
        assert!(css.contains("font-display:swap;"));
    }

    #[test]
    fn rules_cover_only_drawn_families_once_per_variant() {
        let metas = vec![
            FontMetadata::new("Font-1", "1.ttf"),
            FontMetadata::new("Font-1", "1b.ttf").with_weight(700),
            FontMetadata::new("Font-1", "dup.ttf"),
            FontMetadata::new("Font-2", "2.otf"),
        ];
        let rules = rules_for(&metas, ["Font-1"]);
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].url, "1.ttf");
        assert_eq!(rules[1].descriptor.weight, 700);
        assert_eq!(rules[0].format, "truetype");
    }

    #[test]
    fn quotes_are_escaped() {
        let meta = FontMetadata::new("O'Font", "x.ttf");
        let css = build_font_face_css(&[FontFaceRule::from_meta(&meta)]);
        assert!(css.contains(r"font-family:'O\'Font';"));
    }
}
