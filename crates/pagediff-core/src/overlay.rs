//! Diff overlay rendering.
//!
//! Produces an advisory image for human review: the candidate page with
//! every significantly changed pixel tinted in the highlight color, and
//! each connected changed region outlined so that small edits stay
//! visible when the page is viewed scaled down.
//!
//! Overlays are visualisation only. Nothing here feeds back into
//! scoring or classification.

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use imageproc::region_labelling::{Connectivity, connected_components};

use crate::grid::{Channels, PixelGrid};
use crate::ssim::DiffMap;
use crate::types::{CompareConfig, CompareError};

/// Margin in pixels between a changed region and its outline.
const OUTLINE_MARGIN: u32 = 2;

/// How changed pixels are drawn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayStyle {
    /// Tint color.
    pub highlight_color: [u8; 3],
    /// Tint opacity in `[0, 1]`.
    pub alpha: f32,
    /// Pixels with dissimilarity strictly above this are highlighted.
    pub significance_floor: f32,
    /// Draw a rectangle around each connected changed region.
    pub outline_regions: bool,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self::from(&CompareConfig::default())
    }
}

impl From<&CompareConfig> for OverlayStyle {
    fn from(config: &CompareConfig) -> Self {
        Self {
            highlight_color: config.highlight_color,
            alpha: config.highlight_alpha,
            significance_floor: config.significance_floor,
            outline_regions: config.outline_regions,
        }
    }
}

/// Bounding box of one changed region, inclusive pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    /// Leftmost column.
    pub min_x: u32,
    /// Topmost row.
    pub min_y: u32,
    /// Rightmost column.
    pub max_x: u32,
    /// Bottom row.
    pub max_y: u32,
}

impl Region {
    fn include(&mut self, x: u32, y: u32) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }
}

/// Render the overlay for one page.
///
/// The output has exactly the candidate's shape. Gray candidates get a
/// gray overlay, with the tint reduced to its luminance. When no pixel
/// exceeds the significance floor the result equals the candidate.
///
/// # Errors
///
/// Returns [`CompareError::ShapeMismatch`] if `baseline` does not have
/// the candidate's shape, or [`CompareError::InvalidGrid`] if `diff`
/// does not cover the candidate's extent.
pub fn build_overlay(
    candidate: &PixelGrid,
    baseline: &PixelGrid,
    diff: &DiffMap,
    style: &OverlayStyle,
) -> Result<PixelGrid, CompareError> {
    if !candidate.same_shape(baseline) {
        return Err(CompareError::ShapeMismatch {
            candidate: candidate.shape(),
            baseline: baseline.shape(),
        });
    }
    if diff.width() != candidate.width() || diff.height() != candidate.height() {
        return Err(CompareError::InvalidGrid(format!(
            "diff map is {}x{}, page is {}x{}",
            diff.width(),
            diff.height(),
            candidate.width(),
            candidate.height()
        )));
    }

    let mask = significance_mask(diff, style.significance_floor);
    if !mask.pixels().any(|p| p.0[0] != 0) {
        return Ok(candidate.clone());
    }

    let mut canvas = candidate.to_rgb().to_dynamic().to_rgb8();
    tint(&mut canvas, &mask, style);
    if style.outline_regions {
        for region in changed_regions(&mask) {
            outline(&mut canvas, region, style.highlight_color);
        }
    }

    Ok(match candidate.channels() {
        Channels::Rgb => PixelGrid::from_rgb(canvas),
        Channels::Gray => PixelGrid::from_gray(image::DynamicImage::ImageRgb8(canvas).to_luma8()),
    })
}

/// Bounding boxes of the 8-connected regions whose dissimilarity
/// exceeds `floor`, ordered by first appearance in raster order.
#[must_use]
pub fn find_regions(diff: &DiffMap, floor: f32) -> Vec<Region> {
    changed_regions(&significance_mask(diff, floor))
}

fn significance_mask(diff: &DiffMap, floor: f32) -> image::GrayImage {
    image::GrayImage::from_fn(diff.width(), diff.height(), |x, y| {
        image::Luma([if diff.get(x, y) > floor { 255 } else { 0 }])
    })
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn tint(canvas: &mut RgbImage, mask: &image::GrayImage, style: &OverlayStyle) {
    let alpha = style.alpha.clamp(0.0, 1.0);
    for (x, y, pixel) in canvas.enumerate_pixels_mut() {
        if mask.get_pixel(x, y).0[0] == 0 {
            continue;
        }
        for (sample, &tint) in pixel.0.iter_mut().zip(&style.highlight_color) {
            let blended = f32::from(*sample).mul_add(1.0 - alpha, f32::from(tint) * alpha);
            *sample = blended.round().clamp(0.0, 255.0) as u8;
        }
    }
}

fn changed_regions(mask: &image::GrayImage) -> Vec<Region> {
    let labels = connected_components(mask, Connectivity::Eight, image::Luma([0u8]));
    let mut regions: Vec<Option<Region>> = Vec::new();
    for (x, y, label) in labels.enumerate_pixels() {
        let label = label.0[0] as usize;
        if label == 0 {
            continue;
        }
        if regions.len() < label {
            regions.resize(label, None);
        }
        match &mut regions[label - 1] {
            Some(region) => region.include(x, y),
            slot @ None => {
                *slot = Some(Region {
                    min_x: x,
                    min_y: y,
                    max_x: x,
                    max_y: y,
                });
            }
        }
    }
    regions.into_iter().flatten().collect()
}

#[allow(clippy::cast_possible_wrap)]
fn outline(canvas: &mut RgbImage, region: Region, color: [u8; 3]) {
    let left = region.min_x.saturating_sub(OUTLINE_MARGIN);
    let top = region.min_y.saturating_sub(OUTLINE_MARGIN);
    let right = (region.max_x + OUTLINE_MARGIN).min(canvas.width() - 1);
    let bottom = (region.max_y + OUTLINE_MARGIN).min(canvas.height() - 1);
    let rect = Rect::at(left as i32, top as i32).of_size(right - left + 1, bottom - top + 1);
    draw_hollow_rect_mut(canvas, rect, Rgb(color));
}
