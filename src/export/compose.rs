//! The export composition: the whole gallery laid out as one SVG.
//!
//! Cards sit in a fixed-width grid. Each card shows the family name in the
//! fallback face and the sample text in the card's own family at its
//! chosen size. Text is wrapped by an estimated advance, so the layout box
//! is an estimate; the exporter unites it with the measured bounds of the
//! rendered tree before choosing the raster size.

use std::fmt::Write as _;

use crate::font::FontMetadata;
use crate::gallery::Gallery;
use crate::geometry::{RectPx, SizePx};
use crate::prefs::SizePreferences;

/// Fallback stack appended to every card's family.
const FALLBACK_STACK: &str = "ui-sans-serif, system-ui, sans-serif";

// ============================================================================
// Snapshot
// ============================================================================

/// One card of the composition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Card {
    pub family: String,
    pub sample: String,
    pub px: u32,
}

/// Everything needed to reproduce the gallery for one export.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSnapshot {
    pub cards: Vec<Card>,
    pub metas: Vec<FontMetadata>,
}

impl ExportSnapshot {
    pub fn new(cards: Vec<Card>, metas: Vec<FontMetadata>) -> Self {
        Self { cards, metas }
    }

    /// Cards for every gallery family, sized from the preferences.
    pub fn from_gallery(gallery: &Gallery, prefs: &SizePreferences, sample: &str) -> Self {
        let cards = gallery
            .families
            .iter()
            .map(|family| Card {
                family: family.clone(),
                sample: sample.to_string(),
                px: prefs.get_size(family),
            })
            .collect();
        Self::new(cards, gallery.metas.clone())
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn families(&self) -> impl Iterator<Item = &str> {
        self.cards.iter().map(|c| c.family.as_str())
    }

    /// The first `max_chars` characters of the composition's text.
    pub fn text_sample(&self, max_chars: usize) -> String {
        self.cards
            .iter()
            .flat_map(|c| c.family.chars().chain(c.sample.chars()))
            .take(max_chars)
            .collect()
    }
}

// ============================================================================
// Layout
// ============================================================================

/// Grid metrics in px.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridLayout {
    pub columns: u32,
    pub card_width: u32,
    pub gap: u32,
    pub padding: u32,
    pub card_padding: u32,
    pub label_px: u32,
}

impl Default for GridLayout {
    fn default() -> Self {
        Self {
            columns: 4,
            card_width: 280,
            gap: 16,
            padding: 24,
            card_padding: 16,
            label_px: 14,
        }
    }
}

impl GridLayout {
    fn line_height(px: u32) -> u32 {
        (px as f32 * 1.375).ceil() as u32
    }

    fn label_block(&self) -> u32 {
        (self.label_px as f32 * 1.5).ceil() as u32 + 8
    }

    fn chars_per_line(&self, px: u32) -> usize {
        let inner = self.card_width.saturating_sub(self.card_padding * 2) as f32;
        let advance = (px as f32 * 0.55).max(1.0);
        ((inner / advance).floor() as usize).max(1)
    }
}

/// A card with its position and wrapped lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedCard {
    pub card: Card,
    pub rect: RectPx,
    pub lines: Vec<String>,
}

/// Greedy word wrap by character count; long words are split.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut line = String::new();
    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > width {
            if !line.is_empty() {
                lines.push(std::mem::take(&mut line));
            }
            let rest = word.split_off(width);
            lines.push(word.into_iter().collect());
            word = rest;
        }
        let len = line.chars().count();
        if !line.is_empty() && len + 1 + word.len() > width {
            lines.push(std::mem::take(&mut line));
        }
        if !line.is_empty() {
            line.push(' ');
        }
        line.extend(word);
    }
    if !line.is_empty() || lines.is_empty() {
        lines.push(line);
    }
    lines
}

/// Places every card and returns the placements with the layout box.
pub fn layout(cards: &[Card], grid: GridLayout) -> (Vec<PlacedCard>, SizePx) {
    let columns = grid.columns.max(1).min(cards.len().max(1) as u32);
    let width = grid.padding * 2 + columns * grid.card_width + (columns - 1) * grid.gap;

    let mut placed = Vec::with_capacity(cards.len());
    let mut y = grid.padding;
    for (row, chunk) in cards.chunks(columns as usize).enumerate() {
        if row > 0 {
            y += grid.gap;
        }
        let mut row_height = 0;
        for (col, card) in chunk.iter().enumerate() {
            let lines = wrap(&card.sample, grid.chars_per_line(card.px));
            let height = grid.card_padding * 2
                + grid.label_block()
                + lines.len() as u32 * GridLayout::line_height(card.px);
            let x = grid.padding + col as u32 * (grid.card_width + grid.gap);
            row_height = row_height.max(height);
            placed.push(PlacedCard {
                card: card.clone(),
                rect: RectPx::new(x, y, grid.card_width, height),
                lines,
            });
        }
        y += row_height;
    }
    let height = if cards.is_empty() { grid.padding * 2 } else { y + grid.padding };
    (placed, SizePx::new(width, height))
}

// ============================================================================
// ExportSurface
// ============================================================================

/// Marker attribute on the injected style block.
pub const EXPORT_STYLE_ATTR: &str = "data-export-fonts";

/// The render subtree an export captures.
#[derive(Debug, Clone)]
pub struct ExportSurface {
    grid: GridLayout,
    placed: Vec<PlacedCard>,
    layout_size: SizePx,
    background: (u8, u8, u8),
    injected: Option<String>,
}

impl ExportSurface {
    pub fn new(snapshot: &ExportSnapshot, grid: GridLayout, background: (u8, u8, u8)) -> Self {
        let (placed, layout_size) = layout(&snapshot.cards, grid);
        Self {
            grid,
            placed,
            layout_size,
            background,
            injected: None,
        }
    }

    /// Prepends a style block holding `css`, replacing any earlier one.
    pub fn inject_style(&mut self, css: String) {
        self.injected = Some(css);
    }

    /// Removes the injected style block. Returns whether there was one.
    pub fn remove_injected_style(&mut self) -> bool {
        self.injected.take().is_some()
    }

    pub fn has_injected_style(&self) -> bool {
        self.injected.is_some()
    }

    pub fn layout_size(&self) -> SizePx {
        self.layout_size
    }

    pub fn cards(&self) -> &[PlacedCard] {
        &self.placed
    }

    /// Serializes the surface as an SVG document of the given size.
    pub fn to_svg(&self, size: SizePx) -> String {
        let (r, g, b) = self.background;
        let mut svg = String::new();
        let _ = write!(
            svg,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
            w = size.width.max(1),
            h = size.height.max(1),
        );
        if let Some(css) = &self.injected {
            let _ = write!(
                svg,
                r#"<style {EXPORT_STYLE_ATTR}="true"><![CDATA[{}]]></style>"#,
                css.replace("]]>", "]] >")
            );
        }
        let _ = write!(
            svg,
            r##"<rect x="0" y="0" width="{}" height="{}" fill="#{r:02x}{g:02x}{b:02x}"/>"##,
            size.width.max(1),
            size.height.max(1),
        );

        for placed in &self.placed {
            let rect = placed.rect;
            let _ = write!(
                svg,
                r##"<rect x="{}" y="{}" width="{}" height="{}" rx="8" fill="#ffffff" stroke="#e5e7eb"/>"##,
                rect.x, rect.y, rect.width, rect.height,
            );
            let inner = rect.inset(self.grid.card_padding);
            let _ = write!(
                svg,
                r##"<text x="{}" y="{}" font-family="{FALLBACK_STACK}" font-size="{}" fill="#6b7280">{}</text>"##,
                inner.x,
                inner.y + self.grid.label_px,
                self.grid.label_px,
                xml_escape(&placed.card.family),
            );

            let px = placed.card.px;
            let family = format!("{}, {FALLBACK_STACK}", quote_family(&placed.card.family));
            let top = inner.y + self.grid.label_block();
            for (i, line) in placed.lines.iter().enumerate() {
                let _ = write!(
                    svg,
                    r##"<text x="{}" y="{}" font-family="{}" font-size="{px}" fill="#111827" xml:space="preserve">{}</text>"##,
                    inner.x,
                    top + i as u32 * GridLayout::line_height(px) + px,
                    xml_escape(&family),
                    xml_escape(line),
                );
            }
        }
        svg.push_str("</svg>");
        svg
    }
}

/// Quotes a family name for a `font-family` list. The SVG parser keeps
/// backslashes inside quoted names, so the quote is picked to avoid the
/// name's own quote character instead of escaping it.
fn quote_family(family: &str) -> String {
    if !family.contains('\'') {
        format!("'{family}'")
    } else if !family.contains('"') {
        format!("\"{family}\"")
    } else {
        // No quoting can carry both characters through.
        format!("\"{}\"", family.replace('"', ""))
    }
}

fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(family: &str, sample: &str, px: u32) -> Card {
        Card {
            family: family.into(),
            sample: sample.into(),
            px,
        }
    }

    #[test]
    fn wrap_breaks_on_words_and_splits_long_ones() {
        assert_eq!(wrap("aa bb cc", 5), vec!["aa bb", "cc"]);
        assert_eq!(wrap("abcdefgh", 3), vec!["abc", "def", "gh"]);
        assert_eq!(wrap("", 10), vec![""]);
    }

    #[test]
    fn layout_covers_every_row() {
        let grid = GridLayout::default();
        let cards: Vec<_> = (1..=6).map(|i| card(&format!("Font-{i}"), "Hello", 24)).collect();
        let (placed, size) = layout(&cards, grid);

        assert_eq!(placed.len(), 6);
        assert_eq!(size.width, 24 * 2 + 4 * 280 + 3 * 16);
        let last = placed.last().unwrap();
        assert_eq!(last.rect.x, placed[1].rect.x);
        assert!(last.rect.y > placed[0].rect.bottom());
        assert_eq!(size.height, last.rect.bottom() + grid.padding);
    }

    #[test]
    fn row_height_follows_tallest_card() {
        let grid = GridLayout::default();
        let cards = vec![card("A", "x", 24), card("B", "x", 96), card("C", "x", 12)];
        let (placed, size) = layout(&cards, grid);
        assert_eq!(size.width, 24 * 2 + 3 * 280 + 2 * 16);
        let tallest = placed.iter().map(|p| p.rect.bottom()).max().unwrap();
        assert_eq!(size.height, tallest + grid.padding);
    }

    #[test]
    fn svg_carries_injected_style_first() {
        let snapshot = ExportSnapshot::new(vec![card("Font-1", "a < b", 24)], vec![]);
        let mut surface = ExportSurface::new(&snapshot, GridLayout::default(), (255, 255, 255));
        surface.inject_style("@font-face{font-family:'Font-1';}".into());

        let svg = surface.to_svg(surface.layout_size());
        let style_at = svg.find(EXPORT_STYLE_ATTR).unwrap();
        let rect_at = svg.find("<rect").unwrap();
        assert!(style_at < rect_at);
        assert!(svg.contains("a &lt; b"));
        assert!(svg.contains("&apos;Font-1&apos;"));

        assert!(surface.remove_injected_style());
        assert!(!surface.remove_injected_style());
        assert!(!surface.to_svg(surface.layout_size()).contains(EXPORT_STYLE_ATTR));
    }

    #[test]
    fn family_names_keep_their_apostrophes() {
        assert_eq!(quote_family("Font-1"), "'Font-1'");
        assert_eq!(quote_family("O'Neil Sans"), "\"O'Neil Sans\"");

        let snapshot = ExportSnapshot::new(vec![card("O'Neil Sans", "Hello", 24)], Vec::new());
        let surface = ExportSurface::new(&snapshot, GridLayout::default(), (255, 255, 255));
        let svg = surface.to_svg(surface.layout_size());
        assert!(svg.contains(r#"font-family="&quot;O&apos;Neil Sans&quot;, ui-sans-serif"#));

        let tree = resvg::usvg::Tree::from_str(&svg, &resvg::usvg::Options::default()).unwrap();
        assert_eq!(tree.size().width() as u32, surface.layout_size().width);
    }

    #[test]
    fn text_sample_is_truncated() {
        let snapshot = ExportSnapshot::new(vec![card("AB", "cdef", 24), card("G", "hij", 24)], vec![]);
        assert_eq!(snapshot.text_sample(5), "ABcde");
        assert_eq!(snapshot.text_sample(64), "ABcdefGhij");
    }
}
