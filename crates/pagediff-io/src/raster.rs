//! Page raster encoding and file I/O.
//!
//! Pages are persisted as PNG. Reads accept any format the `image`
//! crate was built with (PNG, JPEG, BMP, WebP).

use std::io::Write;
use std::path::Path;

use image::ImageEncoder;
use image::codecs::png::PngEncoder;
use pagediff_core::{Channels, PixelGrid};

use crate::IoError;

/// File extensions recognised as page images, in lookup preference
/// order.
pub const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "webp"];

/// Whether `path` has one of [`IMAGE_EXTENSIONS`] (case-insensitive).
#[must_use]
pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IMAGE_EXTENSIONS.iter().any(|x| x.eq_ignore_ascii_case(e)))
}

/// Encode a grid as PNG bytes (8-bit gray or RGB, matching the grid).
///
/// # Errors
///
/// Returns [`image::ImageError`] if encoding fails.
pub fn encode_png(grid: &PixelGrid) -> Result<Vec<u8>, image::ImageError> {
    let color = match grid.channels() {
        Channels::Gray => image::ExtendedColorType::L8,
        Channels::Rgb => image::ExtendedColorType::Rgb8,
    };
    let mut bytes = Vec::new();
    PngEncoder::new(&mut bytes).write_image(grid.as_raw(), grid.width(), grid.height(), color)?;
    Ok(bytes)
}

/// Decode an image file into a grid. Luma images stay gray; everything
/// else becomes RGB with alpha dropped.
///
/// # Errors
///
/// Returns [`IoError::Image`] if the file cannot be read or decoded.
pub fn read_grid(path: &Path) -> Result<PixelGrid, IoError> {
    let image = image::open(path).map_err(|e| IoError::Image {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(PixelGrid::from_dynamic(&image))
}

/// Write `grid` as a PNG at `path`, atomically.
///
/// The image is written to a temporary file in the destination
/// directory, synced, and renamed over `path`. Readers see either the
/// old file or the complete new one.
///
/// # Errors
///
/// Returns [`IoError::Image`] if encoding fails, or [`IoError::Io`] if
/// the temporary file cannot be written or renamed.
pub fn write_png_atomic(path: &Path, grid: &PixelGrid) -> Result<(), IoError> {
    let bytes = encode_png(grid).map_err(|e| IoError::Image {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    write_atomic(path, &bytes)
}

/// Replace `path` with `contents` via a synced temporary file and
/// rename.
///
/// # Errors
///
/// Returns [`IoError::Io`] on any filesystem failure; `path` is then
/// unchanged.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), IoError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let io_err = |source| IoError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
    tmp.write_all(contents).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}
