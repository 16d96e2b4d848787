//! Per-session de-duplication of font registrations.

use std::collections::{BTreeMap, HashSet};

use crate::font::FaceDescriptor;

/// Tracks which families have been attempted in the current load pass and
/// which variants ended up loaded.
///
/// The de-duplication key is the family name alone: when several records
/// share a family, only the first one seen is registered.
#[derive(Debug, Default)]
pub struct FontRegistry {
    attempted: HashSet<String>,
    variants: BTreeMap<String, Vec<FaceDescriptor>>,
}

impl FontRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new load pass. Loaded variants are kept; attempts are not.
    pub fn begin_pass(&mut self) {
        self.attempted.clear();
    }

    /// Returns `true` if `family` was already attempted in this pass.
    pub fn has(&self, family: &str) -> bool {
        self.attempted.contains(family)
    }

    /// Marks `family` as attempted. Returns `false` if it already was.
    pub fn record_attempt(&mut self, family: &str) -> bool {
        self.attempted.insert(family.to_string())
    }

    /// Records a variant of `family` as loaded. Duplicates are ignored.
    pub fn record_loaded(&mut self, family: &str, descriptor: FaceDescriptor) {
        let variants = self.variants.entry(family.to_string()).or_default();
        if !variants.contains(&descriptor) {
            variants.push(descriptor);
        }
    }

    /// Loaded variants of `family`, in load order.
    pub fn variants(&self, family: &str) -> &[FaceDescriptor] {
        self.variants.get(family).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Families with at least one loaded variant.
    pub fn loaded_families(&self) -> impl Iterator<Item = &str> {
        self.variants.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::font::FontStyle;

    #[test]
    fn attempts_are_recorded_once_per_pass() {
        let mut registry = FontRegistry::new();
        assert!(!registry.has("Font-1"));
        assert!(registry.record_attempt("Font-1"));
        assert!(registry.has("Font-1"));
        assert!(!registry.record_attempt("Font-1"));

        registry.begin_pass();
        assert!(!registry.has("Font-1"));
    }

    #[test]
    fn variants_survive_new_passes() {
        let mut registry = FontRegistry::new();
        let bold = FaceDescriptor { weight: 700, style: FontStyle::Normal };
        registry.record_loaded("Font-1", FaceDescriptor::default());
        registry.record_loaded("Font-1", bold);
        registry.record_loaded("Font-1", bold);
        registry.begin_pass();

        assert_eq!(registry.variants("Font-1"), &[FaceDescriptor::default(), bold]);
        assert!(registry.variants("Font-2").is_empty());
        assert_eq!(registry.loaded_families().collect::<Vec<_>>(), vec!["Font-1"]);
    }
}
