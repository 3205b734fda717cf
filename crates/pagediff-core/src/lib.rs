//! pagediff-core: Page comparison and approval engine (sans-IO).
//!
//! Compares rendered document pages against approved baselines:
//! SSIM scoring -> threshold classification -> per-page status ->
//! advisory diff overlay -> optional human approval.
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! page rasters and an abstract [`BaselineStore`]. Rendering, the
//! filesystem-backed store, and image export live in `pagediff-io`;
//! report formatting lives in `pagediff-report`.

pub mod approval;
pub mod classify;
pub mod engine;
pub mod grid;
pub mod overlay;
pub mod ssim;
pub mod store;
pub mod types;

pub use approval::{
    ApprovalError, ApprovalSummary, ApprovalWorkflow, Decision, DecisionSource, Review,
    ReviewRecord, ReviewState, ScriptedDecisions, approve_all,
};
pub use engine::{CandidateDocument, PageCounts, compare_document, compare_page, compare_run};
pub use grid::{Channels, PixelGrid};
pub use overlay::{OverlayStyle, Region, build_overlay, find_regions};
pub use ssim::{DiffMap, Similarity};
pub use store::{BaselineStore, MemoryStore, StoreError};
pub use types::{
    CompareConfig, CompareError, ConfigError, DocumentResult, PageKey, PageResult, PageStatus,
    RenderError, RunParams, RunResult,
};

/// Score and classify every document of a run.
///
/// Validates `config` first; nothing is compared if it is invalid.
///
/// # Errors
///
/// Returns [`ConfigError`] if any configuration value is out of range.
pub fn run<S>(
    documents: &[CandidateDocument],
    store: &S,
    config: &CompareConfig,
) -> Result<RunResult, ConfigError>
where
    S: BaselineStore + Sync + ?Sized,
{
    config.validate()?;
    Ok(compare_run(documents, store, config))
}
