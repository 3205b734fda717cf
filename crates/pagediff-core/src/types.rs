//! Shared types for the pagediff comparison core.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::grid::PixelGrid;

/// Identity of one page across the candidate and baseline sides.
///
/// Ordered by document stem, then page number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageKey {
    /// File stem of the document (`invoice` for `invoice.pdf`).
    pub document_stem: String,
    /// 1-based page number.
    pub page_number: u32,
}

impl PageKey {
    /// Create a new key.
    #[must_use]
    pub fn new(document_stem: impl Into<String>, page_number: u32) -> Self {
        Self {
            document_stem: document_stem.into(),
            page_number,
        }
    }

    /// Baseline file name without extension: `{stem}_page_{n}`.
    #[must_use]
    pub fn baseline_name(&self) -> String {
        format!("{}_page_{}", self.document_stem, self.page_number)
    }

    /// Parse a `{stem}_page_{n}` name back into a key.
    ///
    /// The split happens at the last `_page_`, so stems may themselves
    /// contain that sequence. Page `0` is rejected.
    #[must_use]
    pub fn parse_baseline_name(name: &str) -> Option<Self> {
        let (stem, page) = name.rsplit_once("_page_")?;
        if stem.is_empty() {
            return None;
        }
        let page_number: u32 = page.parse().ok()?;
        (page_number > 0).then(|| Self::new(stem, page_number))
    }
}

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} page {}", self.document_stem, self.page_number)
    }
}

/// Terminal classification of a page.
///
/// Variants are declared from least to most severe, so the derived
/// `Ord` gives the document aggregation order directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PageStatus {
    /// Scored at or above the threshold.
    Pass,
    /// Scored below the threshold.
    Fail,
    /// Baseline present but not comparable (shape mismatch, unreadable
    /// raster), or the document could not be rendered.
    Error,
    /// No baseline entry for the page.
    MissingBaseline,
    /// Candidate and baseline disagree on the document's page count and
    /// this page exists on one side only.
    PageCountMismatch,
}

impl PageStatus {
    /// Whether this status permits a similarity score on the record.
    #[must_use]
    pub const fn is_scored(self) -> bool {
        matches!(self, Self::Pass | Self::Fail)
    }

    /// Upper-case label used in logs and reports.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Error => "ERROR",
            Self::MissingBaseline => "MISSING_BASELINE",
            Self::PageCountMismatch => "PAGE_COUNT_MISMATCH",
        }
    }
}

impl fmt::Display for PageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Comparison record for one page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageResult {
    /// Which page this record describes.
    pub key: PageKey,
    /// Terminal classification.
    pub status: PageStatus,
    /// Grid-wide SSIM in `[0, 1]`; `None` unless `status` is
    /// [`PageStatus::Pass`] or [`PageStatus::Fail`].
    pub similarity_score: Option<f64>,
    /// Threshold (percent) the page was classified against.
    pub threshold_used: f64,
    /// Advisory overlay highlighting changed regions. Never serialized;
    /// the report layer refers to it by the file it was saved to.
    #[serde(skip)]
    pub diff_image: Option<PixelGrid>,
    /// Human-readable detail for [`PageStatus::Error`] and mismatch
    /// records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl PageResult {
    /// Similarity as a percentage (`0.0..=100.0`), if scored.
    #[must_use]
    pub fn similarity_pct(&self) -> Option<f64> {
        self.similarity_score.map(|s| s * 100.0)
    }

    /// Whether the page passed.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.status == PageStatus::Pass
    }

    /// An unscored record with the given status and detail message.
    #[must_use]
    pub fn unscored(key: PageKey, status: PageStatus, threshold: f64, message: String) -> Self {
        Self {
            key,
            status,
            similarity_score: None,
            threshold_used: threshold,
            diff_image: None,
            message: Some(message),
        }
    }
}

/// Comparison records for one document, in ascending page order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentResult {
    /// File stem of the document.
    pub document_stem: String,
    /// Per-page records, ascending by page number.
    pub pages: Vec<PageResult>,
    /// Number of pages the candidate render produced.
    pub candidate_page_count: u32,
    /// Number of pages the baseline store holds for this document.
    pub baseline_page_count: u32,
    /// Document-level failure (render error, unreadable baseline listing).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DocumentResult {
    /// A document that could not be compared at all.
    #[must_use]
    pub fn failed(
        document_stem: impl Into<String>,
        baseline_page_count: u32,
        error: String,
    ) -> Self {
        Self {
            document_stem: document_stem.into(),
            pages: Vec::new(),
            candidate_page_count: 0,
            baseline_page_count,
            error: Some(error),
        }
    }

    /// Worst page status; [`PageStatus::Error`] for a document-level failure,
    /// [`PageStatus::Pass`] for a document with no pages.
    #[must_use]
    pub fn status(&self) -> PageStatus {
        if self.error.is_some() {
            return PageStatus::Error;
        }
        self.pages
            .iter()
            .map(|p| p.status)
            .max()
            .unwrap_or(PageStatus::Pass)
    }

    /// Whether every page passed.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.status() == PageStatus::Pass
    }

    /// Mean similarity percentage over scored pages.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean_similarity_pct(&self) -> Option<f64> {
        let scores: Vec<f64> = self.pages.iter().filter_map(PageResult::similarity_pct).collect();
        if scores.is_empty() {
            return None;
        }
        Some(scores.iter().sum::<f64>() / scores.len() as f64)
    }

    /// Record for `page_number`, if present.
    #[must_use]
    pub fn page(&self, page_number: u32) -> Option<&PageResult> {
        self.pages.iter().find(|p| p.key.page_number == page_number)
    }
}

/// All documents of one comparison run, in caller-supplied order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunResult {
    /// Per-document results.
    pub documents: Vec<DocumentResult>,
}

impl RunResult {
    /// Worst status across all documents ([`PageStatus::Pass`] if empty).
    #[must_use]
    pub fn status(&self) -> PageStatus {
        self.documents
            .iter()
            .map(DocumentResult::status)
            .max()
            .unwrap_or(PageStatus::Pass)
    }

    /// Number of documents whose aggregate status is PASS.
    #[must_use]
    pub fn passed_count(&self) -> usize {
        self.documents.iter().filter(|d| d.passed()).count()
    }

    /// Every page record in document order, then page order.
    pub fn pages(&self) -> impl Iterator<Item = &PageResult> {
        self.documents.iter().flat_map(|d| d.pages.iter())
    }

    /// Keys of all non-PASS pages that have a candidate raster, in
    /// review order. Pages that exist only on the baseline side have
    /// nothing to promote and are left out.
    #[must_use]
    pub fn review_queue(&self) -> Vec<PageKey> {
        self.documents
            .iter()
            .flat_map(|d| {
                d.pages
                    .iter()
                    .filter(|p| !p.passed() && p.key.page_number <= d.candidate_page_count)
            })
            .map(|p| p.key.clone())
            .collect()
    }

    /// Look up the record for `key`.
    #[must_use]
    pub fn page(&self, key: &PageKey) -> Option<&PageResult> {
        self.documents
            .iter()
            .find(|d| d.document_stem == key.document_stem)
            .and_then(|d| d.page(key.page_number))
    }

    /// Replace the record with the same key in place.
    ///
    /// Returns the previous record, or `None` (and changes nothing) if
    /// the run has no such page.
    pub fn replace_page(&mut self, result: PageResult) -> Option<PageResult> {
        let doc = self
            .documents
            .iter_mut()
            .find(|d| d.document_stem == result.key.document_stem)?;
        let slot = doc
            .pages
            .iter_mut()
            .find(|p| p.key.page_number == result.key.page_number)?;
        Some(std::mem::replace(slot, result))
    }
}

/// RGB color used for highlighting.
pub type Rgb = [u8; 3];

/// Tunables for scoring, classification, and overlay rendering.
///
/// Construct with struct-update syntax over [`CompareConfig::default`]
/// and check with [`CompareConfig::validate`] before a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompareConfig {
    /// Pass threshold as a percentage in `[0, 100]`.
    pub threshold: f64,
    /// Side length of the square SSIM window. Odd, at least 3.
    pub window_size: u32,
    /// Per-pixel dissimilarity above which the overlay highlights a
    /// pixel, in `[0, 1]`.
    pub significance_floor: f32,
    /// Highlight tint for changed regions.
    pub highlight_color: Rgb,
    /// Tint opacity in `[0, 1]`.
    pub highlight_alpha: f32,
    /// Outline each connected changed region in the overlay.
    pub outline_regions: bool,
    /// Also attach overlays to passing pages.
    pub overlay_passing_pages: bool,
}

impl CompareConfig {
    /// Default pass threshold (percent).
    pub const DEFAULT_THRESHOLD: f64 = 95.0;
    /// Default SSIM window side length.
    pub const DEFAULT_WINDOW_SIZE: u32 = 7;
    /// Default overlay significance floor.
    pub const DEFAULT_SIGNIFICANCE_FLOOR: f32 = 0.1;
    /// Default highlight tint (red).
    pub const DEFAULT_HIGHLIGHT_COLOR: Rgb = [255, 0, 0];
    /// Default tint opacity.
    pub const DEFAULT_HIGHLIGHT_ALPHA: f32 = 0.4;

    /// Check every field against its documented range.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_threshold(self.threshold)?;
        if self.window_size < 3 || self.window_size % 2 == 0 {
            return Err(ConfigError::WindowSize(self.window_size));
        }
        if !(0.0..=1.0).contains(&self.significance_floor) {
            return Err(ConfigError::SignificanceFloor(self.significance_floor));
        }
        if !(0.0..=1.0).contains(&self.highlight_alpha) {
            return Err(ConfigError::HighlightAlpha(self.highlight_alpha));
        }
        Ok(())
    }
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            threshold: Self::DEFAULT_THRESHOLD,
            window_size: Self::DEFAULT_WINDOW_SIZE,
            significance_floor: Self::DEFAULT_SIGNIFICANCE_FLOOR,
            highlight_color: Self::DEFAULT_HIGHLIGHT_COLOR,
            highlight_alpha: Self::DEFAULT_HIGHLIGHT_ALPHA,
            outline_regions: true,
            overlay_passing_pages: false,
        }
    }
}

/// Per-invocation parameters supplied by the command line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunParams {
    /// Pass threshold as a percentage in `[0, 100]`.
    pub threshold: f64,
    /// Render resolution in dots per inch.
    pub dpi: u32,
    /// Whether to run the approval workflow after scoring.
    pub interactive: bool,
}

impl RunParams {
    /// Default render resolution.
    pub const DEFAULT_DPI: u32 = 150;

    /// Validate before any comparison starts.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Threshold`] for a non-finite or
    /// out-of-range threshold and [`ConfigError::Dpi`] for zero DPI.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_threshold(self.threshold)?;
        if self.dpi == 0 {
            return Err(ConfigError::Dpi(self.dpi));
        }
        Ok(())
    }
}

impl Default for RunParams {
    fn default() -> Self {
        Self {
            threshold: CompareConfig::DEFAULT_THRESHOLD,
            dpi: Self::DEFAULT_DPI,
            interactive: false,
        }
    }
}

fn validate_threshold(threshold: f64) -> Result<(), ConfigError> {
    if threshold.is_finite() && (0.0..=100.0).contains(&threshold) {
        Ok(())
    } else {
        Err(ConfigError::Threshold(threshold))
    }
}

/// Invalid run configuration. Fatal: reported before any work starts.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// Threshold is not a finite percentage.
    #[error("threshold must be between 0 and 100, got {0}")]
    Threshold(f64),

    /// DPI must be positive.
    #[error("dpi must be a positive integer, got {0}")]
    Dpi(u32),

    /// SSIM window must be odd and at least 3.
    #[error("window size must be an odd integer of at least 3, got {0}")]
    WindowSize(u32),

    /// Significance floor outside `[0, 1]`.
    #[error("significance floor must be between 0 and 1, got {0}")]
    SignificanceFloor(f32),

    /// Highlight alpha outside `[0, 1]`.
    #[error("highlight alpha must be between 0 and 1, got {0}")]
    HighlightAlpha(f32),
}

/// Errors raised while comparing two rasters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompareError {
    /// The two grids do not have the same `(height, width, channels)`.
    #[error(
        "shape mismatch: candidate is {}x{}x{}, baseline is {}x{}x{}",
        candidate.1, candidate.0, candidate.2, baseline.1, baseline.0, baseline.2
    )]
    ShapeMismatch {
        /// Candidate `(height, width, channels)`.
        candidate: (u32, u32, usize),
        /// Baseline `(height, width, channels)`.
        baseline: (u32, u32, usize),
    },

    /// Raster data is malformed.
    #[error("invalid pixel grid: {0}")]
    InvalidGrid(String),
}

/// A candidate document could not be turned into page rasters.
///
/// Document-level: the document is reported as failed and the run
/// moves on to the next one.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    /// The document file does not exist.
    #[error("document not found: {0}")]
    NotFound(String),

    /// The renderer could not open or rasterize the document.
    #[error("failed to render {document}: {reason}")]
    Failed {
        /// Document path or stem.
        document: String,
        /// Renderer diagnostic.
        reason: String,
    },

    /// Rendering succeeded but produced no pages.
    #[error("document has no pages: {0}")]
    NoPages(String),
}
