//! Crops frames down to the areas where offer cards appear.

use image::{imageops, RgbaImage};

use crate::config::RelativeRect;

/// A rectangle in absolute pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RegionSelector {
    regions: Vec<RelativeRect>,
}

impl RegionSelector {
    /// An empty list selects the whole screen.
    pub fn new(regions: Vec<RelativeRect>) -> Self {
        Self { regions }
    }

    /// Resolves the configured regions for a screen of the given size.
    ///
    /// Converts each relative rect (0.0–1.0) to pixel coordinates clamped to
    /// the screen. A region that resolves to zero height means the whole
    /// screen.
    pub fn regions(&self, width: u32, height: u32) -> Vec<PixelRect> {
        if self.regions.is_empty() {
            return vec![PixelRect::full(width, height)];
        }
        self.regions
            .iter()
            .map(|region| {
                let rect = to_pixels(region, width, height);
                if rect.height == 0 {
                    PixelRect::full(width, height)
                } else {
                    rect
                }
            })
            .collect()
    }
}

fn to_pixels(region: &RelativeRect, w: u32, h: u32) -> PixelRect {
    let frac = |v: f32| if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 };

    let x = ((frac(region.x) * w as f32) as u32).min(w);
    let y = ((frac(region.y) * h as f32) as u32).min(h);
    let width = ((frac(region.width) * w as f32) as u32).min(w - x);
    let height = ((frac(region.height) * h as f32) as u32).min(h - y);

    PixelRect {
        x,
        y,
        width,
        height,
    }
}

/// Copies out a sub-image, clamped to the image bounds.
///
/// Returns `None` when nothing is left after clamping.
pub fn crop(image: &RgbaImage, rect: &PixelRect) -> Option<RgbaImage> {
    let (w, h) = image.dimensions();
    let x = rect.x.min(w);
    let y = rect.y.min(h);
    let width = rect.width.min(w - x);
    let height = rect.height.min(h - y);
    if width == 0 || height == 0 {
        return None;
    }
    Some(imageops::crop_imm(image, x, y, width, height).to_image())
}
