//! Integer pixel boxes used by the export layout.

/// A card's box in the composition, origin top-left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RectPx {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl RectPx {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    /// The box shrunk by `pad` on every side, never below zero size.
    pub fn inset(&self, pad: u32) -> RectPx {
        RectPx {
            x: self.x + pad,
            y: self.y + pad,
            width: self.width.saturating_sub(pad * 2),
            height: self.height.saturating_sub(pad * 2),
        }
    }
}

/// Width and height of a composition or raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SizePx {
    pub width: u32,
    pub height: u32,
}

impl SizePx {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// The smallest size covering both.
    pub fn union(&self, other: SizePx) -> SizePx {
        SizePx::new(self.width.max(other.width), self.height.max(other.height))
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}
