//! Run artifacts written next to the reports: diff overlays and report
//! files.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use pagediff_core::{PageKey, RunResult};
use tracing::{debug, info};

use crate::IoError;
use crate::raster::{write_atomic, write_png_atomic};

/// File name of the overlay for `key`: `{stem}_page_{n}_diff.png`.
#[must_use]
pub fn diff_image_name(key: &PageKey) -> String {
    format!("{}_diff.png", key.baseline_name())
}

/// Save every overlay attached to `run` into `out_dir`, creating it if
/// needed. Returns the file name written for each page, relative to
/// `out_dir`.
///
/// # Errors
///
/// Returns [`IoError`] on the first overlay that cannot be written.
pub fn save_diff_images(
    run: &RunResult,
    out_dir: &Path,
) -> Result<BTreeMap<PageKey, String>, IoError> {
    ensure_dir(out_dir)?;
    let mut written = BTreeMap::new();
    for page in run.pages() {
        let Some(overlay) = &page.diff_image else {
            continue;
        };
        let name = diff_image_name(&page.key);
        write_png_atomic(&out_dir.join(&name), overlay)?;
        debug!(page = %page.key, file = %name, "diff image saved");
        written.insert(page.key.clone(), name);
    }
    info!(count = written.len(), dir = %out_dir.display(), "diff images saved");
    Ok(written)
}

/// Write one report file into `out_dir`, atomically. Returns its path.
///
/// # Errors
///
/// Returns [`IoError::Io`] if the directory or file cannot be written.
pub fn write_report(out_dir: &Path, file_name: &str, contents: &str) -> Result<PathBuf, IoError> {
    ensure_dir(out_dir)?;
    let path = out_dir.join(file_name);
    write_atomic(&path, contents.as_bytes())?;
    info!(path = %path.display(), "report written");
    Ok(path)
}

fn ensure_dir(dir: &Path) -> Result<(), IoError> {
    std::fs::create_dir_all(dir).map_err(|source| IoError::Io {
        path: dir.to_path_buf(),
        source,
    })
}
