//! Comparison engine: candidate documents + baseline store → [`RunResult`].
//!
//! Every page receives exactly one terminal status:
//!
//! | condition                                        | status                |
//! |--------------------------------------------------|-----------------------|
//! | page exists on the baseline side only            | `PAGE_COUNT_MISMATCH` |
//! | document has no baselines / page has none        | `MISSING_BASELINE`    |
//! | candidate page beyond the baseline page count    | `PAGE_COUNT_MISMATCH` |
//! | baseline unreadable or shape differs             | `ERROR`               |
//! | scored below threshold                           | `FAIL`                |
//! | scored at or above threshold                     | `PASS`                |
//!
//! Pages of a document are scored in parallel; records are collected in
//! page order regardless of completion order. The engine only reads the
//! store.

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::classify::classify;
use crate::grid::PixelGrid;
use crate::overlay::{OverlayStyle, build_overlay};
use crate::ssim::{Similarity, score_with_window};
use crate::store::BaselineStore;
use crate::types::{
    CompareConfig, DocumentResult, PageKey, PageResult, PageStatus, RenderError, RunResult,
};

/// Rendered candidate side of one document.
#[derive(Debug, Clone)]
pub struct CandidateDocument {
    /// File stem, used to address baselines.
    pub document_stem: String,
    /// Page rasters in page order, or why rendering failed.
    pub rendering: Result<Vec<PixelGrid>, RenderError>,
}

impl CandidateDocument {
    /// A successfully rendered document.
    #[must_use]
    pub fn rendered(document_stem: impl Into<String>, pages: Vec<PixelGrid>) -> Self {
        Self {
            document_stem: document_stem.into(),
            rendering: Ok(pages),
        }
    }

    /// A document whose rendering failed.
    #[must_use]
    pub fn failed(document_stem: impl Into<String>, error: RenderError) -> Self {
        Self {
            document_stem: document_stem.into(),
            rendering: Err(error),
        }
    }

    /// Candidate raster for a 1-based page number.
    #[must_use]
    pub fn page(&self, page_number: u32) -> Option<&PixelGrid> {
        let index = usize::try_from(page_number.checked_sub(1)?).ok()?;
        self.rendering.as_ref().ok()?.get(index)
    }

    /// Number of rendered pages (`0` if rendering failed).
    #[must_use]
    pub fn page_count(&self) -> u32 {
        self.rendering
            .as_ref()
            .map_or(0, |pages| u32::try_from(pages.len()).unwrap_or(u32::MAX))
    }
}

/// Page counts of both sides of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCounts {
    /// Pages in the candidate render.
    pub candidate: u32,
    /// Highest page number in the baseline store.
    pub baseline: u32,
}

/// Compare every document, in the order given.
///
/// Never fails: per-page and per-document problems become statuses.
pub fn compare_run<S>(documents: &[CandidateDocument], store: &S, config: &CompareConfig) -> RunResult
where
    S: BaselineStore + Sync + ?Sized,
{
    let documents = documents
        .iter()
        .map(|doc| compare_document(doc, store, config))
        .collect();
    RunResult { documents }
}

/// Compare one document against its baselines.
pub fn compare_document<S>(
    document: &CandidateDocument,
    store: &S,
    config: &CompareConfig,
) -> DocumentResult
where
    S: BaselineStore + Sync + ?Sized,
{
    let stem = document.document_stem.as_str();

    let baseline = match store.page_count(stem) {
        Ok(n) => n,
        Err(e) => {
            warn!(document = stem, error = %e, "cannot enumerate baselines");
            return DocumentResult::failed(stem, 0, e.to_string());
        }
    };

    if let Err(e) = &document.rendering {
        warn!(document = stem, error = %e, "candidate document failed to render");
        return DocumentResult::failed(stem, baseline, e.to_string());
    }

    let counts = PageCounts {
        candidate: document.page_count(),
        baseline,
    };
    if counts.candidate != counts.baseline && counts.baseline > 0 {
        info!(
            document = stem,
            candidate = counts.candidate,
            baseline = counts.baseline,
            "page count changed"
        );
    }

    let total = counts.candidate.max(counts.baseline);
    let pages: Vec<PageResult> = (1..=total)
        .into_par_iter()
        .map(|n| {
            let key = PageKey::new(stem, n);
            compare_page(&key, document.page(n), counts, store, config)
        })
        .collect();

    let result = DocumentResult {
        document_stem: stem.to_string(),
        pages,
        candidate_page_count: counts.candidate,
        baseline_page_count: counts.baseline,
        error: None,
    };
    info!(
        document = stem,
        status = %result.status(),
        pages = result.pages.len(),
        mean_similarity_pct = result.mean_similarity_pct(),
        "document compared"
    );
    result
}

/// Classify a single page.
///
/// `candidate` is `None` for pages that exist on the baseline side only.
pub fn compare_page<S>(
    key: &PageKey,
    candidate: Option<&PixelGrid>,
    counts: PageCounts,
    store: &S,
    config: &CompareConfig,
) -> PageResult
where
    S: BaselineStore + ?Sized,
{
    let threshold = config.threshold;

    let Some(candidate) = candidate else {
        return PageResult::unscored(
            key.clone(),
            PageStatus::PageCountMismatch,
            threshold,
            format!(
                "page missing from candidate ({} pages, baseline has {})",
                counts.candidate, counts.baseline
            ),
        );
    };
    if counts.baseline == 0 {
        return PageResult::unscored(
            key.clone(),
            PageStatus::MissingBaseline,
            threshold,
            format!("no baseline images for {}", key.document_stem),
        );
    }
    if key.page_number > counts.baseline {
        return PageResult::unscored(
            key.clone(),
            PageStatus::PageCountMismatch,
            threshold,
            format!(
                "page missing from baseline ({} pages, candidate has {})",
                counts.baseline, counts.candidate
            ),
        );
    }

    match store.load(key) {
        Ok(Some(baseline)) => score_page(key, candidate, &baseline, config),
        Ok(None) => PageResult::unscored(
            key.clone(),
            PageStatus::MissingBaseline,
            threshold,
            format!("no baseline image {}", key.baseline_name()),
        ),
        Err(e) => {
            warn!(page = %key, error = %e, "unreadable baseline");
            PageResult::unscored(key.clone(), PageStatus::Error, threshold, e.to_string())
        }
    }
}

/// Score a candidate against a loaded baseline and classify it.
pub fn score_page(
    key: &PageKey,
    candidate: &PixelGrid,
    baseline: &PixelGrid,
    config: &CompareConfig,
) -> PageResult {
    if candidate.is_empty() || baseline.is_empty() {
        let (ch, cw, _) = candidate.shape();
        let (bh, bw, _) = baseline.shape();
        let message = format!("empty page image: candidate is {cw}x{ch}, baseline is {bw}x{bh}");
        warn!(page = %key, detail = %message, "empty page");
        return PageResult::unscored(key.clone(), PageStatus::Error, config.threshold, message);
    }
    if !candidate.same_shape(baseline) {
        return mismatched_page(key, candidate, baseline, config);
    }

    if candidate == baseline {
        debug!(page = %key, "byte-identical to baseline");
        let diff_image = config.overlay_passing_pages.then(|| candidate.clone());
        return PageResult {
            key: key.clone(),
            status: PageStatus::Pass,
            similarity_score: Some(1.0),
            threshold_used: config.threshold,
            diff_image,
            message: None,
        };
    }

    match score_with_window(candidate, baseline, config.window_size) {
        Ok(similarity) => scored_result(key, &similarity, candidate, baseline, config),
        Err(e) => PageResult::unscored(key.clone(), PageStatus::Error, config.threshold, e.to_string()),
    }
}

/// Build the record for a scored page. Classification looks only at the
/// score; the diff map feeds the overlay and nothing else.
fn scored_result(
    key: &PageKey,
    similarity: &Similarity,
    candidate: &PixelGrid,
    baseline: &PixelGrid,
    config: &CompareConfig,
) -> PageResult {
    let status = classify(similarity.score, config.threshold);
    debug!(
        page = %key,
        similarity_pct = similarity.score * 100.0,
        status = %status,
        "page scored"
    );

    let wants_overlay = status == PageStatus::Fail || config.overlay_passing_pages;
    let diff_image = if wants_overlay {
        build_overlay(candidate, baseline, &similarity.diff, &OverlayStyle::from(config))
            .map_err(|e| debug!(page = %key, error = %e, "overlay skipped"))
            .ok()
    } else {
        None
    };

    PageResult {
        key: key.clone(),
        status,
        similarity_score: Some(similarity.score),
        threshold_used: config.threshold,
        diff_image,
        message: None,
    }
}

/// ERROR record for a shape mismatch, with a best-effort overlay built
/// after resampling both sides to a common extent.
fn mismatched_page(
    key: &PageKey,
    candidate: &PixelGrid,
    baseline: &PixelGrid,
    config: &CompareConfig,
) -> PageResult {
    let (ch, cw, cc) = candidate.shape();
    let (bh, bw, bc) = baseline.shape();
    let message = format!(
        "candidate is {cw}x{ch}x{cc}, baseline is {bw}x{bh}x{bc}; check the render DPI"
    );
    warn!(page = %key, detail = %message, "shape mismatch");

    let width = cw.max(bw);
    let height = ch.max(bh);
    let (cand, base) = if candidate.channels() == baseline.channels() {
        (candidate.resized(width, height), baseline.resized(width, height))
    } else {
        (
            candidate.to_rgb().resized(width, height),
            baseline.to_rgb().resized(width, height),
        )
    };
    let diff_image = score_with_window(&cand, &base, config.window_size)
        .and_then(|s| build_overlay(&cand, &base, &s.diff, &OverlayStyle::from(config)))
        .map_err(|e| debug!(page = %key, error = %e, "overlay skipped"))
        .ok();

    PageResult {
        key: key.clone(),
        status: PageStatus::Error,
        similarity_score: None,
        threshold_used: config.threshold,
        diff_image,
        message: Some(message),
    }
}
