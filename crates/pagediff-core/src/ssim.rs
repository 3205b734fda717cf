//! Windowed structural similarity (SSIM) scoring.
//!
//! Each channel is compared with a uniform square window centred on
//! every pixel. Borders are handled by replicating edge samples, so the
//! local index map has exactly the input's spatial shape. Multi-channel
//! grids are scored per channel and the local maps averaged with equal
//! weight.
//!
//! The local index is the standard
//!
//! ```text
//!          (2·μx·μy + C1) · (2·σxy + C2)
//! SSIM = ─────────────────────────────────
//!        (μx² + μy² + C1) · (σx² + σy² + C2)
//! ```
//!
//! with `C1 = (0.01·255)²` and `C2 = (0.03·255)²`, which keeps the ratio
//! finite on perfectly flat windows. The formula is symmetric in its two
//! arguments, and so is [`score`].

use image::GrayImage;

use crate::grid::PixelGrid;
use crate::types::CompareError;

const DYNAMIC_RANGE: f64 = 255.0;
const C1: f64 = (0.01 * DYNAMIC_RANGE) * (0.01 * DYNAMIC_RANGE);
const C2: f64 = (0.03 * DYNAMIC_RANGE) * (0.03 * DYNAMIC_RANGE);

/// Default side length of the SSIM window.
pub const DEFAULT_WINDOW: u32 = 7;

/// Per-pixel structural dissimilarity, `1 − local SSIM` clamped to
/// `[0, 1]`, at full input resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffMap {
    width: u32,
    height: u32,
    values: Vec<f32>,
}

impl DiffMap {
    /// Wrap precomputed values (row-major, `width * height` long).
    ///
    /// # Errors
    ///
    /// Returns [`CompareError::InvalidGrid`] on a length mismatch.
    pub fn new(width: u32, height: u32, values: Vec<f32>) -> Result<Self, CompareError> {
        if values.len() != width as usize * height as usize {
            return Err(CompareError::InvalidGrid(format!(
                "diff map for {width}x{height} needs {} values, got {}",
                width as usize * height as usize,
                values.len()
            )));
        }
        Ok(Self {
            width,
            height,
            values,
        })
    }

    /// A map with the same dissimilarity everywhere.
    #[must_use]
    pub fn filled(width: u32, height: u32, value: f32) -> Self {
        Self {
            width,
            height,
            values: vec![value; width as usize * height as usize],
        }
    }

    /// Width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Row-major values.
    #[must_use]
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Dissimilarity at `(x, y)`.
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.values[y as usize * self.width as usize + x as usize]
    }

    /// Whether every value is exactly zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.values.iter().all(|&v| v == 0.0)
    }

    /// Number of pixels whose dissimilarity exceeds `floor`.
    #[must_use]
    pub fn count_above(&self, floor: f32) -> usize {
        self.values.iter().filter(|&&v| v > floor).count()
    }

    /// Export as a grayscale mask (`dissimilarity × 255`).
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn to_gray_image(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            image::Luma([(self.get(x, y) * 255.0).round().clamp(0.0, 255.0) as u8])
        })
    }
}

/// Output of [`score`].
#[derive(Debug, Clone, PartialEq)]
pub struct Similarity {
    /// Mean local SSIM over the whole grid, clamped to `[0, 1]`.
    pub score: f64,
    /// Per-pixel dissimilarity, for overlays only.
    pub diff: DiffMap,
}

/// Score `candidate` against `baseline` with the default window.
///
/// # Errors
///
/// Returns [`CompareError::ShapeMismatch`] if the grids differ in
/// height, width, or channel count.
pub fn score(candidate: &PixelGrid, baseline: &PixelGrid) -> Result<Similarity, CompareError> {
    score_with_window(candidate, baseline, DEFAULT_WINDOW)
}

/// Score `candidate` against `baseline` with a `window × window`
/// neighbourhood.
///
/// `window` is expected to be odd; an even value behaves like the next
/// odd size down (minimum 1).
///
/// # Errors
///
/// Returns [`CompareError::ShapeMismatch`] if the grids differ in
/// height, width, or channel count, and [`CompareError::InvalidGrid`]
/// if they have no pixels.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub fn score_with_window(
    candidate: &PixelGrid,
    baseline: &PixelGrid,
    window: u32,
) -> Result<Similarity, CompareError> {
    if !candidate.same_shape(baseline) {
        return Err(CompareError::ShapeMismatch {
            candidate: candidate.shape(),
            baseline: baseline.shape(),
        });
    }
    if candidate.is_empty() {
        return Err(CompareError::InvalidGrid(format!(
            "cannot score an empty {}x{} grid",
            candidate.width(),
            candidate.height()
        )));
    }

    let w = candidate.width() as usize;
    let h = candidate.height() as usize;
    let channels = candidate.channels().count();
    let radius = (window / 2) as usize;

    let mut local = vec![0.0_f64; w * h];
    for c in 0..channels {
        let x = channel(candidate, c);
        let y = channel(baseline, c);
        accumulate_channel(&x, &y, w, h, radius, &mut local);
    }
    if channels > 1 {
        let n = channels as f64;
        for v in &mut local {
            *v /= n;
        }
    }

    let mean = local.iter().sum::<f64>() / local.len() as f64;
    let diff = local
        .iter()
        .map(|&s| (1.0 - s).clamp(0.0, 1.0) as f32)
        .collect();

    Ok(Similarity {
        score: mean.clamp(0.0, 1.0),
        diff: DiffMap {
            width: candidate.width(),
            height: candidate.height(),
            values: diff,
        },
    })
}

/// Extract channel `c` as floating-point samples.
fn channel(grid: &PixelGrid, c: usize) -> Vec<f64> {
    let n = grid.channels().count();
    grid.as_raw()
        .iter()
        .skip(c)
        .step_by(n)
        .map(|&v| f64::from(v))
        .collect()
}

/// Add the local SSIM of one channel into `out`.
fn accumulate_channel(x: &[f64], y: &[f64], w: usize, h: usize, radius: usize, out: &mut [f64]) {
    let xx: Vec<f64> = x.iter().map(|v| v * v).collect();
    let yy: Vec<f64> = y.iter().map(|v| v * v).collect();
    let xy: Vec<f64> = x.iter().zip(y).map(|(a, b)| a * b).collect();

    let mu_x = box_mean(x, w, h, radius);
    let mu_y = box_mean(y, w, h, radius);
    let e_xx = box_mean(&xx, w, h, radius);
    let e_yy = box_mean(&yy, w, h, radius);
    let e_xy = box_mean(&xy, w, h, radius);

    for i in 0..w * h {
        let (mx, my) = (mu_x[i], mu_y[i]);
        let var_x = mx.mul_add(-mx, e_xx[i]);
        let var_y = my.mul_add(-my, e_yy[i]);
        let cov = mx.mul_add(-my, e_xy[i]);

        let numerator = (2.0 * mx * my + C1) * (2.0 * cov + C2);
        let denominator = (mx * mx + my * my + C1) * (var_x + var_y + C2);
        out[i] += numerator / denominator;
    }
}

/// Mean over a `(2r+1)²` window with replicated borders, computed as two
/// separable passes.
#[allow(clippy::cast_precision_loss)]
fn box_mean(src: &[f64], w: usize, h: usize, radius: usize) -> Vec<f64> {
    let span = 2 * radius + 1;
    let area = (span * span) as f64;

    let mut rows = vec![0.0; w * h];
    for yi in 0..h {
        let row = &src[yi * w..(yi + 1) * w];
        for xi in 0..w {
            let mut sum = 0.0;
            for d in 0..span {
                sum += row[(xi + d).saturating_sub(radius).min(w - 1)];
            }
            rows[yi * w + xi] = sum;
        }
    }

    let mut out = vec![0.0; w * h];
    for yi in 0..h {
        for xi in 0..w {
            let mut sum = 0.0;
            for d in 0..span {
                sum += rows[(yi + d).saturating_sub(radius).min(h - 1) * w + xi];
            }
            out[yi * w + xi] = sum / area;
        }
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::grid::Channels;

    /// Deterministic "page-like" content: dark text strokes on white.
    fn text_page(width: u32, height: u32, channels: Channels) -> PixelGrid {
        PixelGrid::from_fn(width, height, channels, |x, y| {
            let ink = (y % 12 < 3) && ((x / 4 + y / 12) % 5 != 0);
            if ink { [20, 30, 40] } else { [250, 248, 245] }
        })
    }

    /// Same content with a +-2 deterministic "anti-aliasing" jitter.
    #[allow(clippy::cast_possible_truncation)]
    fn jittered(grid: &PixelGrid) -> PixelGrid {
        let data = grid
            .as_raw()
            .iter()
            .enumerate()
            .map(|(i, &v)| {
                let delta = (i % 5) as i16 - 2;
                (i16::from(v) + delta).clamp(0, 255) as u8
            })
            .collect();
        PixelGrid::new(grid.width(), grid.height(), grid.channels(), data).unwrap()
    }

    #[test]
    fn identical_grids_score_exactly_one_with_zero_diff() {
        for channels in [Channels::Gray, Channels::Rgb] {
            let page = text_page(40, 30, channels);
            let result = score(&page, &page.clone()).unwrap();
            assert!((result.score - 1.0).abs() < f64::EPSILON, "{channels:?}: {}", result.score);
            assert!(result.diff.is_zero(), "{channels:?}: diff not zero");
        }
    }

    #[test]
    fn uniform_identical_grids_score_one() {
        let page = PixelGrid::filled(16, 16, Channels::Gray, [255; 3]);
        let result = score(&page, &page).unwrap();
        assert!((result.score - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_grids_are_rejected_not_scored() {
        let empty = PixelGrid::filled(0, 0, Channels::Gray, [255; 3]);
        let err = score(&empty, &empty.clone()).unwrap_err();
        assert!(matches!(err, CompareError::InvalidGrid(_)));

        let no_rows = PixelGrid::filled(12, 0, Channels::Rgb, [0; 3]);
        assert!(score_with_window(&no_rows, &no_rows, 3).is_err());
    }

    #[test]
    fn shape_mismatch_is_an_error() {
        let a = PixelGrid::filled(10, 10, Channels::Gray, [0; 3]);
        let b = PixelGrid::filled(10, 11, Channels::Gray, [0; 3]);
        let err = score(&a, &b).unwrap_err();
        assert_eq!(
            err,
            CompareError::ShapeMismatch {
                candidate: (10, 10, 1),
                baseline: (11, 10, 1),
            }
        );
    }

    #[test]
    fn channel_mismatch_is_an_error() {
        let a = PixelGrid::filled(10, 10, Channels::Gray, [0; 3]);
        let b = PixelGrid::filled(10, 10, Channels::Rgb, [0; 3]);
        assert!(matches!(score(&a, &b), Err(CompareError::ShapeMismatch { .. })));
    }

    #[test]
    fn white_versus_black_scores_near_zero() {
        let white = PixelGrid::filled(20, 20, Channels::Rgb, [255; 3]);
        let black = PixelGrid::filled(20, 20, Channels::Rgb, [0; 3]);
        let result = score(&white, &black).unwrap();
        assert!(result.score < 0.01, "got {}", result.score);
        assert!(result.diff.values().iter().all(|&v| v > 0.9));
    }

    #[test]
    fn rendering_noise_scores_high() {
        let page = text_page(60, 60, Channels::Rgb);
        let result = score(&jittered(&page), &page).unwrap();
        assert!(result.score > 0.95, "got {}", result.score);
        assert!(result.score < 1.0);
    }

    #[test]
    fn score_is_symmetric() {
        let page = text_page(30, 30, Channels::Gray);
        let other = jittered(&page);
        let ab = score(&page, &other).unwrap();
        let ba = score(&other, &page).unwrap();
        assert!((ab.score - ba.score).abs() < f64::EPSILON);
        assert_eq!(ab.diff, ba.diff);
    }

    #[test]
    fn localized_change_is_localized_in_diff() {
        let base = PixelGrid::filled(50, 50, Channels::Gray, [255; 3]);
        let cand = PixelGrid::from_fn(50, 50, Channels::Gray, |x, y| {
            if (20..25).contains(&x) && (20..25).contains(&y) { [0; 3] } else { [255; 3] }
        });
        let result = score(&cand, &base).unwrap();
        // Far corner is untouched by any window covering the block.
        assert!(result.diff.get(0, 0).abs() < f32::EPSILON);
        assert!(result.diff.get(22, 19) > 0.5);
        assert!(result.score > 0.8 && result.score < 1.0, "got {}", result.score);
    }

    #[test]
    fn diff_map_has_input_resolution() {
        let a = text_page(33, 17, Channels::Rgb);
        let result = score(&a, &jittered(&a)).unwrap();
        assert_eq!(result.diff.width(), 33);
        assert_eq!(result.diff.height(), 17);
        assert!(result.diff.values().iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn tiny_grids_smaller_than_window_are_scored() {
        let a = PixelGrid::filled(2, 1, Channels::Gray, [10; 3]);
        let result = score(&a, &a).unwrap();
        assert!((result.score - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn larger_window_still_identity() {
        let a = text_page(25, 25, Channels::Gray);
        let result = score_with_window(&a, &a, 11).unwrap();
        assert!((result.score - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn repeated_scoring_is_deterministic() {
        let a = text_page(25, 25, Channels::Rgb);
        let b = jittered(&a);
        assert_eq!(score(&a, &b).unwrap(), score(&a, &b).unwrap());
    }

    #[test]
    fn diff_map_rejects_wrong_length() {
        assert!(DiffMap::new(3, 3, vec![0.0; 8]).is_err());
        assert!(DiffMap::new(3, 3, vec![0.0; 9]).is_ok());
    }

    #[test]
    fn diff_map_exports_scaled_mask() {
        let map = DiffMap::new(2, 1, vec![0.0, 1.0]).unwrap();
        let mask = map.to_gray_image();
        assert_eq!(mask.get_pixel(0, 0).0[0], 0);
        assert_eq!(mask.get_pixel(1, 0).0[0], 255);
        assert_eq!(map.count_above(0.5), 1);
    }
}
