//! Capture scale selection.

use crate::geometry::SizePx;

/// Bounds on the capture scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleLimits {
    /// Upper cap regardless of device pixel ratio.
    pub max_scale: f64,
    /// Largest raster width or height.
    pub max_dimension: u32,
    /// Smallest scale kept for legibility.
    pub min_scale: f64,
}

impl Default for ScaleLimits {
    fn default() -> Self {
        Self {
            max_scale: 2.0,
            max_dimension: 16384,
            min_scale: 0.75,
        }
    }
}

/// Chooses the scale at which `content` is rasterized.
///
/// `min(dpr, max_scale, max_dimension / w, max_dimension / h)`, raised to
/// `min_scale` only as far as the dimension limit allows. The result never
/// exceeds `max_scale` nor pushes either side past `max_dimension`.
pub fn capture_scale(content: SizePx, device_pixel_ratio: f64, limits: ScaleLimits) -> f64 {
    let dpr = if device_pixel_ratio.is_finite() && device_pixel_ratio > 0.0 {
        device_pixel_ratio
    } else {
        1.0
    };
    let max_dim = limits.max_dimension as f64;
    let fit = (max_dim / content.width.max(1) as f64).min(max_dim / content.height.max(1) as f64);

    let scale = dpr.min(limits.max_scale).min(fit);
    scale.max(limits.min_scale.min(fit))
}

/// Raster dimensions for `content` at `scale`, rounded up.
pub fn raster_size(content: SizePx, scale: f64, limits: ScaleLimits) -> SizePx {
    let side = |v: u32| ((v as f64 * scale).ceil() as u32).clamp(1, limits.max_dimension);
    SizePx::new(side(content.width), side(content.height))
}
