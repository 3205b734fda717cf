//! Directory-backed baseline store.
//!
//! Baselines live flat in one directory as `{document_stem}_page_{n}.png`
//! (other image extensions are read but never written). Writes go
//! through a temporary file and a rename, so an interrupted accept never
//! leaves a truncated baseline behind.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::path::{Path, PathBuf};

use pagediff_core::{BaselineStore, PageKey, PixelGrid, StoreError};
use tracing::debug;

use crate::IoError;
use crate::raster::{IMAGE_EXTENSIONS, is_image_path, read_grid, write_png_atomic};

/// [`BaselineStore`] over a directory of page images.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
    dirty: bool,
}

impl DirectoryStore {
    /// Open (creating if needed) a store rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::Io`] if the directory cannot be created.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, IoError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|source| IoError::Io {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root, dirty: false })
    }

    /// The store directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path a baseline for `key` is written to.
    #[must_use]
    pub fn path_for(&self, key: &PageKey) -> PathBuf {
        self.root.join(format!("{}.png", key.baseline_name()))
    }

    /// Existing baseline file for `key`, preferring PNG.
    ///
    /// Lowercase extensions are probed directly; anything else (`.PNG`,
    /// `.Jpg`) is resolved through the same listing [`page_files`] uses,
    /// so a page that is counted can always be loaded.
    fn existing(&self, key: &PageKey) -> Result<Option<PathBuf>, IoError> {
        let name = key.baseline_name();
        let direct = IMAGE_EXTENSIONS
            .iter()
            .map(|ext| self.root.join(format!("{name}.{ext}")))
            .find(|p| p.is_file());
        if direct.is_some() {
            return Ok(direct);
        }
        Ok(page_files(&self.root)?.remove(key))
    }

    /// Every baseline in the store, in key order.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::Io`] if the directory cannot be read.
    pub fn keys(&self) -> Result<Vec<PageKey>, IoError> {
        Ok(page_files(&self.root)?.into_keys().collect())
    }
}

impl BaselineStore for DirectoryStore {
    fn load(&self, key: &PageKey) -> Result<Option<PixelGrid>, StoreError> {
        let read_err = |e: IoError| StoreError::Read {
            key: key.clone(),
            reason: e.to_string(),
        };
        let Some(path) = self.existing(key).map_err(read_err)? else {
            return Ok(None);
        };
        read_grid(&path).map(Some).map_err(read_err)
    }

    fn page_count(&self, document_stem: &str) -> Result<u32, StoreError> {
        let files = page_files(&self.root).map_err(|e| StoreError::List {
            document: document_stem.to_string(),
            reason: e.to_string(),
        })?;
        Ok(files
            .keys()
            .filter(|k| k.document_stem == document_stem)
            .map(|k| k.page_number)
            .max()
            .unwrap_or(0))
    }

    fn store(&mut self, key: &PageKey, grid: &PixelGrid) -> Result<(), StoreError> {
        let path = self.path_for(key);
        write_png_atomic(&path, grid).map_err(|e| StoreError::Write {
            key: key.clone(),
            reason: e.to_string(),
        })?;
        self.dirty = true;
        debug!(page = %key, path = %path.display(), "baseline written");
        Ok(())
    }

    fn flush(&mut self) -> Result<(), StoreError> {
        if !self.dirty {
            return Ok(());
        }
        sync_dir(&self.root)
            .map_err(|e| StoreError::Flush(format!("{}: {e}", self.root.display())))?;
        self.dirty = false;
        Ok(())
    }
}

/// Page images in `dir` that follow the `{stem}_page_{n}` naming, keyed
/// by page. Where several extensions exist for one key, the preferred
/// one in [`IMAGE_EXTENSIONS`] order wins.
///
/// # Errors
///
/// Returns [`IoError::Io`] if `dir` cannot be listed.
pub fn page_files(dir: &Path) -> Result<BTreeMap<PageKey, PathBuf>, IoError> {
    let io_err = |source| IoError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut files = BTreeMap::new();
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if !path.is_file() || !is_image_path(&path) {
            continue;
        }
        let Some(key) = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(PageKey::parse_baseline_name)
        else {
            continue;
        };
        match files.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(path);
            }
            Entry::Occupied(mut slot) => {
                if extension_rank(&path) < extension_rank(slot.get()) {
                    slot.insert(path);
                }
            }
        }
    }
    Ok(files)
}

/// Preference order: known extension first, then exact lowercase over
/// other spellings of the same extension.
fn extension_rank(path: &Path) -> (usize, bool) {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
    let rank = IMAGE_EXTENSIONS
        .iter()
        .position(|x| x.eq_ignore_ascii_case(ext))
        .unwrap_or(IMAGE_EXTENSIONS.len());
    (rank, !IMAGE_EXTENSIONS.contains(&ext))
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}
