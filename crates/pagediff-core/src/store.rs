//! Baseline storage contract.
//!
//! The baseline store is the only shared mutable state in the system. It
//! is always passed in explicitly: the comparison engine borrows it
//! immutably, and the approval workflow borrows it mutably for the whole
//! review so no reader can observe a page while it is being replaced.
//!
//! [`MemoryStore`] is the in-process implementation used by tests and by
//! callers that manage persistence themselves; the filesystem-backed
//! store lives in `pagediff-io`.

use std::collections::BTreeMap;

use crate::grid::PixelGrid;
use crate::types::PageKey;

/// Failure reading or writing the baseline store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// A baseline exists but could not be read or decoded.
    #[error("failed to read baseline for {key}: {reason}")]
    Read {
        /// Page whose baseline failed to load.
        key: PageKey,
        /// Underlying cause.
        reason: String,
    },

    /// A baseline could not be written. The previous baseline, if any,
    /// is still in place.
    #[error("failed to write baseline for {key}: {reason}")]
    Write {
        /// Page whose baseline failed to store.
        key: PageKey,
        /// Underlying cause.
        reason: String,
    },

    /// The baselines of a document could not be enumerated.
    #[error("failed to list baselines for {document}: {reason}")]
    List {
        /// Document stem.
        document: String,
        /// Underlying cause.
        reason: String,
    },

    /// Completed writes could not be made durable.
    #[error("failed to flush baseline store: {0}")]
    Flush(String),
}

/// Key-value mapping `PageKey → PixelGrid` holding accepted baselines.
///
/// Implementations must make [`BaselineStore::store`] atomic per key: a
/// failed or interrupted write leaves the previous baseline (or absence
/// of one) intact. Entries are never deleted through this trait.
pub trait BaselineStore {
    /// Load the baseline for `key`, or `None` if there is none.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Read`] if an entry exists but is unreadable.
    fn load(&self, key: &PageKey) -> Result<Option<PixelGrid>, StoreError>;

    /// Baseline page count for a document: the highest page number
    /// stored, or `0` if the document has no baselines.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::List`] if the store cannot be enumerated.
    fn page_count(&self, document_stem: &str) -> Result<u32, StoreError>;

    /// Insert or overwrite the baseline for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Write`] if the entry could not be written;
    /// the store is then unchanged for `key`.
    fn store(&mut self, key: &PageKey, grid: &PixelGrid) -> Result<(), StoreError>;

    /// Make all completed writes durable. Called when a write session
    /// ends, on every exit path.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Flush`] if pending data could not be synced.
    fn flush(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// In-memory [`BaselineStore`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStore {
    entries: BTreeMap<PageKey, PixelGrid>,
}

impl MemoryStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a baseline directly (setup helper; bypasses the workflow).
    pub fn insert(&mut self, key: PageKey, grid: PixelGrid) {
        self.entries.insert(key, grid);
    }

    /// Number of stored baselines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Borrow the baseline for `key`.
    #[must_use]
    pub fn get(&self, key: &PageKey) -> Option<&PixelGrid> {
        self.entries.get(key)
    }

    /// Fingerprints of every entry, in key order.
    #[must_use]
    pub fn fingerprints(&self) -> Vec<(PageKey, u64)> {
        self.entries
            .iter()
            .map(|(k, g)| (k.clone(), g.fingerprint()))
            .collect()
    }
}

impl BaselineStore for MemoryStore {
    fn load(&self, key: &PageKey) -> Result<Option<PixelGrid>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn page_count(&self, document_stem: &str) -> Result<u32, StoreError> {
        Ok(self
            .entries
            .keys()
            .filter(|k| k.document_stem == document_stem)
            .map(|k| k.page_number)
            .max()
            .unwrap_or(0))
    }

    fn store(&mut self, key: &PageKey, grid: &PixelGrid) -> Result<(), StoreError> {
        self.entries.insert(key.clone(), grid.clone());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::grid::Channels;

    #[test]
    fn empty_store_has_no_pages() {
        let store = MemoryStore::new();
        assert_eq!(store.page_count("invoice").unwrap(), 0);
        assert_eq!(store.load(&PageKey::new("invoice", 1)).unwrap(), None);
    }

    #[test]
    fn page_count_is_highest_page_for_stem() {
        let mut store = MemoryStore::new();
        let grid = PixelGrid::filled(2, 2, Channels::Gray, [0; 3]);
        store.insert(PageKey::new("invoice", 1), grid.clone());
        store.insert(PageKey::new("invoice", 3), grid.clone());
        store.insert(PageKey::new("receipt", 7), grid);
        assert_eq!(store.page_count("invoice").unwrap(), 3);
        assert_eq!(store.page_count("receipt").unwrap(), 7);
        assert_eq!(store.page_count("invoice_page").unwrap(), 0);
    }

    #[test]
    fn store_overwrites() {
        let mut store = MemoryStore::new();
        let key = PageKey::new("a", 1);
        store
            .store(&key, &PixelGrid::filled(1, 1, Channels::Gray, [1; 3]))
            .unwrap();
        store
            .store(&key, &PixelGrid::filled(1, 1, Channels::Gray, [2; 3]))
            .unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&key).unwrap().as_raw(), &[2]);
    }
}
