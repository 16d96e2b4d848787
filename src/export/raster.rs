//! SVG rasterization using resvg/usvg.

use std::io::Cursor;
use std::sync::Arc;

use image::{ImageFormat, Rgba, RgbaImage};
use resvg::tiny_skia::{Color, Pixmap, Transform};
use resvg::usvg::{Options, Tree, fontdb::Database};

use crate::error::ExportError;
use crate::geometry::SizePx;

// ============================================================================
// Rasterizer
// ============================================================================

/// A raster request for one export.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterRequest {
    /// Content box in CSS px.
    pub content: SizePx,
    /// Output dimensions in device px.
    pub output: SizePx,
    pub scale: f64,
    pub background: (u8, u8, u8),
}

/// Converts an SVG document into pixels.
pub trait Rasterizer: Send + Sync {
    /// Measures the painted bounds of `svg` in px, rounded up.
    fn measure(&self, svg: &str, fonts: Arc<Database>) -> Result<SizePx, ExportError>;

    /// Renders `svg` over an opaque background.
    fn rasterize(&self, svg: &str, fonts: Arc<Database>, request: RasterRequest) -> Result<RgbaImage, ExportError>;
}

/// The resvg-backed rasterizer.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResvgRasterizer;

impl ResvgRasterizer {
    fn parse(svg: &str, fonts: Arc<Database>) -> Result<Tree, ExportError> {
        let mut opts = Options::default();
        opts.fontdb = fonts;
        Tree::from_str(svg, &opts).map_err(|e| ExportError::Surface(e.to_string()))
    }
}

impl Rasterizer for ResvgRasterizer {
    fn measure(&self, svg: &str, fonts: Arc<Database>) -> Result<SizePx, ExportError> {
        let tree = Self::parse(svg, fonts)?;
        let bbox = tree.root().abs_bounding_box();
        let size = tree.size();
        let right = bbox.right().max(size.width()).max(0.0);
        let bottom = bbox.bottom().max(size.height()).max(0.0);
        Ok(SizePx::new(right.ceil() as u32, bottom.ceil() as u32))
    }

    fn rasterize(&self, svg: &str, fonts: Arc<Database>, request: RasterRequest) -> Result<RgbaImage, ExportError> {
        let tree = Self::parse(svg, fonts)?;

        let mut pixmap = Pixmap::new(request.output.width, request.output.height).ok_or_else(|| {
            ExportError::Raster(format!(
                "cannot allocate {}x{} pixmap",
                request.output.width, request.output.height
            ))
        })?;
        let (r, g, b) = request.background;
        pixmap.fill(Color::from_rgba8(r, g, b, 255));

        let scale = request.scale as f32;
        resvg::render(&tree, Transform::from_scale(scale, scale), &mut pixmap.as_mut());

        Ok(pixmap_to_rgba_image(&pixmap))
    }
}

// ============================================================================
// Pixel conversion
// ============================================================================

/// Converts a tiny_skia Pixmap to an image::RgbaImage.
fn pixmap_to_rgba_image(pixmap: &Pixmap) -> RgbaImage {
    let width = pixmap.width();
    let height = pixmap.height();
    let mut img = RgbaImage::new(width, height);

    for (i, pixel) in pixmap.pixels().iter().enumerate() {
        // tiny_skia uses premultiplied alpha, we need to unpremultiply
        let (r, g, b, a) = unpremultiply(pixel.red(), pixel.green(), pixel.blue(), pixel.alpha());
        let x = i as u32 % width;
        let y = i as u32 / width;
        img.put_pixel(x, y, Rgba([r, g, b, a]));
    }

    img
}

/// Unpremultiplies a premultiplied alpha pixel.
fn unpremultiply(r: u8, g: u8, b: u8, a: u8) -> (u8, u8, u8, u8) {
    if a == 0 {
        (0, 0, 0, 0)
    } else {
        let a_f = a as f32 / 255.0;
        (
            (r as f32 / a_f).round().min(255.0) as u8,
            (g as f32 / a_f).round().min(255.0) as u8,
            (b as f32 / a_f).round().min(255.0) as u8,
            a,
        )
    }
}

/// Encodes an image as PNG.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, ExportError> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}
