//! Canonical page raster.
//!
//! A [`PixelGrid`] is the only image representation the comparison core
//! understands: an immutable `height × width × channels` block of `u8`
//! samples in row-major, interleaved order. Renderers and stores convert
//! to and from `image` buffers at the boundary; nothing inside the core
//! depends on file formats.

use std::hash::Hasher;

use image::{DynamicImage, GrayImage, RgbImage};
use serde::{Deserialize, Serialize};
use siphasher::sip::SipHasher13;

use crate::types::CompareError;

/// Channel layout of a [`PixelGrid`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channels {
    /// One luminance sample per pixel.
    Gray,
    /// Red, green, blue samples per pixel.
    Rgb,
}

impl Channels {
    /// Number of samples per pixel.
    #[must_use]
    pub const fn count(self) -> usize {
        match self {
            Self::Gray => 1,
            Self::Rgb => 3,
        }
    }
}

/// Immutable page raster of shape `(height, width, channels)`.
///
/// Two grids are comparable only when [`PixelGrid::shape`] matches
/// exactly.
#[derive(Clone, PartialEq, Eq)]
pub struct PixelGrid {
    width: u32,
    height: u32,
    channels: Channels,
    data: Vec<u8>,
}

impl std::fmt::Debug for PixelGrid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Pixel data is omitted; a single page is millions of samples.
        f.debug_struct("PixelGrid")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("channels", &self.channels)
            .finish_non_exhaustive()
    }
}

impl PixelGrid {
    /// Build a grid from raw interleaved samples.
    ///
    /// # Errors
    ///
    /// Returns [`CompareError::InvalidGrid`] if either dimension is zero
    /// or `data.len()` is not `width * height * channels`.
    pub fn new(
        width: u32,
        height: u32,
        channels: Channels,
        data: Vec<u8>,
    ) -> Result<Self, CompareError> {
        if width == 0 || height == 0 {
            return Err(CompareError::InvalidGrid(format!(
                "grid dimensions must be non-zero, got {width}x{height}"
            )));
        }
        let expected = width as usize * height as usize * channels.count();
        if data.len() != expected {
            return Err(CompareError::InvalidGrid(format!(
                "expected {expected} samples for {width}x{height} {channels:?}, got {}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    /// Build a grid by evaluating `f(x, y)` for every pixel.
    ///
    /// `f` must return exactly `channels.count()` samples; extra samples
    /// are ignored and missing ones are zero.
    #[must_use]
    pub fn from_fn(
        width: u32,
        height: u32,
        channels: Channels,
        mut f: impl FnMut(u32, u32) -> [u8; 3],
    ) -> Self {
        let n = channels.count();
        let mut data = Vec::with_capacity(width as usize * height as usize * n);
        for y in 0..height {
            for x in 0..width {
                let px = f(x, y);
                data.extend_from_slice(&px[..n]);
            }
        }
        Self {
            width,
            height,
            channels,
            data,
        }
    }

    /// A grid where every pixel is `value` (only the first
    /// `channels.count()` samples are used).
    #[must_use]
    pub fn filled(width: u32, height: u32, channels: Channels, value: [u8; 3]) -> Self {
        Self::from_fn(width, height, channels, |_, _| value)
    }

    /// Wrap a grayscale `image` buffer.
    #[must_use]
    pub fn from_gray(image: GrayImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            channels: Channels::Gray,
            data: image.into_raw(),
        }
    }

    /// Wrap an RGB `image` buffer.
    #[must_use]
    pub fn from_rgb(image: RgbImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            channels: Channels::Rgb,
            data: image.into_raw(),
        }
    }

    /// Convert a decoded image into canonical form.
    ///
    /// Luma images (with or without alpha) become [`Channels::Gray`];
    /// everything else becomes [`Channels::Rgb`]. Alpha is dropped.
    #[must_use]
    pub fn from_dynamic(image: &DynamicImage) -> Self {
        match image {
            DynamicImage::ImageLuma8(_)
            | DynamicImage::ImageLumaA8(_)
            | DynamicImage::ImageLuma16(_)
            | DynamicImage::ImageLumaA16(_) => Self::from_gray(image.to_luma8()),
            _ => Self::from_rgb(image.to_rgb8()),
        }
    }

    /// Convert back to an `image` value for encoding.
    #[must_use]
    pub fn to_dynamic(&self) -> DynamicImage {
        match self.channels {
            Channels::Gray => GrayImage::from_raw(self.width, self.height, self.data.clone())
                .map_or_else(|| DynamicImage::new_luma8(0, 0), DynamicImage::ImageLuma8),
            Channels::Rgb => RgbImage::from_raw(self.width, self.height, self.data.clone())
                .map_or_else(|| DynamicImage::new_rgb8(0, 0), DynamicImage::ImageRgb8),
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

    /// Channel layout.
    #[must_use]
    pub const fn channels(&self) -> Channels {
        self.channels
    }

    /// `(height, width, channels)`.
    #[must_use]
    pub const fn shape(&self) -> (u32, u32, usize) {
        (self.height, self.width, self.channels.count())
    }

    /// Number of pixels (not samples).
    #[must_use]
    pub const fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Whether the grid has no pixels. Only the infallible constructors
    /// can produce one; [`PixelGrid::new`] rejects it.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.pixel_count() == 0
    }

    /// Raw interleaved samples.
    #[must_use]
    pub fn as_raw(&self) -> &[u8] {
        &self.data
    }

    /// Sample `c` of the pixel at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if the coordinates or channel are out of bounds.
    #[must_use]
    pub fn sample(&self, x: u32, y: u32, c: usize) -> u8 {
        let n = self.channels.count();
        self.data[(y as usize * self.width as usize + x as usize) * n + c]
    }

    /// Whether `other` has exactly the same shape.
    #[must_use]
    pub fn same_shape(&self, other: &Self) -> bool {
        self.shape() == other.shape()
    }

    /// Content fingerprint over shape and samples.
    ///
    /// Equal grids always share a fingerprint; used to short-circuit
    /// scoring of byte-identical pages.
    #[must_use]
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = SipHasher13::new_with_keys(0, 0);
        hasher.write_u32(self.width);
        hasher.write_u32(self.height);
        hasher.write_usize(self.channels.count());
        hasher.write(&self.data);
        hasher.finish()
    }

    /// Resample to a new size, keeping the channel layout.
    #[must_use]
    pub fn resized(&self, width: u32, height: u32) -> Self {
        if width == self.width && height == self.height {
            return self.clone();
        }
        let filter = image::imageops::FilterType::Triangle;
        match self.to_dynamic() {
            DynamicImage::ImageLuma8(img) => {
                Self::from_gray(image::imageops::resize(&img, width, height, filter))
            }
            other => Self::from_rgb(image::imageops::resize(
                &other.to_rgb8(),
                width,
                height,
                filter,
            )),
        }
    }

    /// The same page with three channels.
    #[must_use]
    pub fn to_rgb(&self) -> Self {
        match self.channels {
            Channels::Rgb => self.clone(),
            Channels::Gray => Self {
                width: self.width,
                height: self.height,
                channels: Channels::Rgb,
                data: self.data.iter().flat_map(|&v| [v, v, v]).collect(),
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_wrong_sample_count() {
        let result = PixelGrid::new(2, 2, Channels::Rgb, vec![0; 11]);
        assert!(matches!(result, Err(CompareError::InvalidGrid(_))));
    }

    #[test]
    fn new_rejects_zero_dimensions() {
        let result = PixelGrid::new(0, 4, Channels::Gray, vec![]);
        assert!(matches!(result, Err(CompareError::InvalidGrid(_))));
    }

    #[test]
    fn shape_is_height_width_channels() {
        let grid = PixelGrid::filled(5, 3, Channels::Rgb, [1, 2, 3]);
        assert_eq!(grid.shape(), (3, 5, 3));
        assert_eq!(grid.as_raw().len(), 45);
        assert_eq!(grid.sample(4, 2, 2), 3);
    }

    #[test]
    fn gray_and_rgb_of_same_size_are_not_comparable() {
        let gray = PixelGrid::filled(4, 4, Channels::Gray, [0; 3]);
        let rgb = PixelGrid::filled(4, 4, Channels::Rgb, [0; 3]);
        assert!(!gray.same_shape(&rgb));
    }

    #[test]
    fn from_dynamic_keeps_luma_as_gray() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(3, 2, image::Luma([9])));
        let grid = PixelGrid::from_dynamic(&img);
        assert_eq!(grid.channels(), Channels::Gray);
        assert_eq!(grid.shape(), (2, 3, 1));
    }

    #[test]
    fn from_dynamic_drops_alpha() {
        let img = DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
            2,
            2,
            image::Rgba([10, 20, 30, 128]),
        ));
        let grid = PixelGrid::from_dynamic(&img);
        assert_eq!(grid.channels(), Channels::Rgb);
        assert_eq!(&grid.as_raw()[..3], &[10, 20, 30]);
    }

    #[test]
    fn to_dynamic_round_trips_samples() {
        let grid = PixelGrid::from_fn(4, 3, Channels::Rgb, |x, y| {
            [u8::try_from(x).unwrap(), u8::try_from(y).unwrap(), 7]
        });
        let back = PixelGrid::from_dynamic(&grid.to_dynamic());
        assert_eq!(grid, back);
    }

    #[test]
    fn fingerprint_differs_on_single_sample_change() {
        let a = PixelGrid::filled(8, 8, Channels::Gray, [200; 3]);
        let mut data = a.as_raw().to_vec();
        data[17] = 199;
        let b = PixelGrid::new(8, 8, Channels::Gray, data).unwrap();
        assert_eq!(a.fingerprint(), a.clone().fingerprint());
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn fingerprint_includes_shape() {
        let a = PixelGrid::filled(4, 2, Channels::Gray, [0; 3]);
        let b = PixelGrid::filled(2, 4, Channels::Gray, [0; 3]);
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn resized_changes_extent_only() {
        let grid = PixelGrid::filled(10, 10, Channels::Rgb, [50, 60, 70]);
        let resized = grid.resized(20, 15);
        assert_eq!(resized.shape(), (15, 20, 3));
        assert_eq!(&resized.as_raw()[..3], &[50, 60, 70]);
    }

    #[test]
    fn to_rgb_replicates_gray() {
        let grid = PixelGrid::filled(2, 1, Channels::Gray, [42, 0, 0]);
        let rgb = grid.to_rgb();
        assert_eq!(rgb.as_raw(), &[42, 42, 42, 42, 42, 42]);
    }
}
