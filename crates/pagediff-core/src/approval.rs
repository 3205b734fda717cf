//! Human-in-the-loop approval of changed pages.
//!
//! After a run is scored, every non-`PASS` page is presented, in run
//! order, to a [`DecisionSource`]. Accepting a page promotes its
//! candidate raster to the baseline store and re-scores it; rejecting or
//! skipping leaves everything untouched. The loop is strictly
//! sequential and holds the store exclusively for its whole duration.
//!
//! The decision source is the single suspension point: the binary
//! backs it with a terminal prompt, tests with [`ScriptedDecisions`].

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};

use serde::Serialize;
use tracing::{info, warn};

use crate::engine::{CandidateDocument, PageCounts, compare_page};
use crate::store::{BaselineStore, StoreError};
use crate::types::{CompareConfig, PageKey, PageResult, RunResult};

/// Operator verdict for one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Promote the candidate to baseline.
    Accept,
    /// Keep the old baseline; the page stays failed.
    Reject,
    /// Leave the page for later.
    Skip,
    /// Stop reviewing; every undecided page is treated as skipped.
    Abort,
}

/// Where a queued page ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewState {
    /// Candidate written to the store.
    Accepted,
    /// Explicitly rejected.
    Rejected,
    /// Skipped, aborted before a decision, or the accept failed.
    Skipped,
}

/// One page as presented to the operator.
#[derive(Debug, Clone, Copy)]
pub struct Review<'a> {
    /// 1-based position in the queue.
    pub position: usize,
    /// Queue length.
    pub total: usize,
    /// Current record for the page, including its overlay if any.
    pub result: &'a PageResult,
}

/// Supplies operator decisions.
pub trait DecisionSource {
    /// Decide on one page. May block for as long as it likes.
    fn decide(&mut self, review: &Review<'_>) -> Decision;

    /// An accepted page could not be promoted. The page keeps its
    /// previous record and the workflow moves on.
    fn notify_error(&mut self, key: &PageKey, error: &ApprovalError) {
        let _ = (key, error);
    }
}

/// Replays a fixed list of decisions, then aborts.
#[derive(Debug, Clone, Default)]
pub struct ScriptedDecisions {
    decisions: VecDeque<Decision>,
    presented: Vec<PageKey>,
    errors: Vec<(PageKey, String)>,
}

impl ScriptedDecisions {
    /// Script the given decisions, in queue order.
    #[must_use]
    pub fn new(decisions: impl IntoIterator<Item = Decision>) -> Self {
        Self {
            decisions: decisions.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Keys presented so far, in order.
    #[must_use]
    pub fn presented(&self) -> &[PageKey] {
        &self.presented
    }

    /// Errors reported through [`DecisionSource::notify_error`].
    #[must_use]
    pub fn errors(&self) -> &[(PageKey, String)] {
        &self.errors
    }
}

impl DecisionSource for ScriptedDecisions {
    fn decide(&mut self, review: &Review<'_>) -> Decision {
        self.presented.push(review.result.key.clone());
        self.decisions.pop_front().unwrap_or(Decision::Abort)
    }

    fn notify_error(&mut self, key: &PageKey, error: &ApprovalError) {
        self.errors.push((key.clone(), error.to_string()));
    }
}

/// Final state of one reviewed page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewRecord {
    /// Page reviewed.
    pub key: PageKey,
    /// Outcome.
    pub state: ReviewState,
    /// Why an accept did not take effect.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of an approval session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApprovalSummary {
    /// One record per queued page, in queue order.
    pub records: Vec<ReviewRecord>,
    /// The operator stopped before the end of the queue.
    pub aborted: bool,
    /// The store could not be flushed when the session ended, so
    /// accepted baselines may not be durable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flush_error: Option<String>,
}

impl ApprovalSummary {
    fn count(&self, state: ReviewState) -> usize {
        self.records.iter().filter(|r| r.state == state).count()
    }

    /// Pages promoted to baseline.
    #[must_use]
    pub fn accepted(&self) -> usize {
        self.count(ReviewState::Accepted)
    }

    /// Pages explicitly rejected.
    #[must_use]
    pub fn rejected(&self) -> usize {
        self.count(ReviewState::Rejected)
    }

    /// Pages skipped, left undecided, or whose accept failed.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(ReviewState::Skipped)
    }
}

/// An accept could not be carried out.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApprovalError {
    /// There is no candidate raster to promote (baseline-only page or
    /// a document that failed to render).
    #[error("no candidate image for {0}")]
    NoCandidate(PageKey),

    /// The page is not part of the run.
    #[error("{0} is not part of this run")]
    UnknownPage(PageKey),

    /// The baseline store rejected the write.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Exclusive write access to a store for the length of a session.
///
/// [`WriteSession::finish`] flushes and reports the outcome; a session
/// dropped without finishing (early return) still flushes, logging any
/// failure.
struct WriteSession<'s, S: BaselineStore + ?Sized> {
    store: &'s mut S,
    finished: bool,
}

impl<'s, S: BaselineStore + ?Sized> WriteSession<'s, S> {
    fn open(store: &'s mut S) -> Self {
        Self {
            store,
            finished: false,
        }
    }

    fn finish(mut self) -> Result<(), StoreError> {
        self.finished = true;
        self.store.flush()
    }
}

impl<S: BaselineStore + ?Sized> Deref for WriteSession<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.store
    }
}

impl<S: BaselineStore + ?Sized> DerefMut for WriteSession<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        self.store
    }
}

impl<S: BaselineStore + ?Sized> Drop for WriteSession<'_, S> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(e) = self.store.flush() {
            warn!(error = %e, "failed to flush baseline store");
        }
    }
}

/// Drives review of a scored run against the store it was scored with.
pub struct ApprovalWorkflow<'a, S: BaselineStore + ?Sized> {
    store: &'a mut S,
    candidates: &'a [CandidateDocument],
    config: &'a CompareConfig,
}

impl<'a, S: BaselineStore + ?Sized> ApprovalWorkflow<'a, S> {
    /// Borrow the store exclusively, together with the candidate
    /// rasters and configuration the run was scored with.
    #[must_use]
    pub fn new(
        store: &'a mut S,
        candidates: &'a [CandidateDocument],
        config: &'a CompareConfig,
    ) -> Self {
        Self {
            store,
            candidates,
            config,
        }
    }

    /// Review every non-`PASS` page of `run`, updating it in place.
    ///
    /// Never fails: accept errors are reported to `source` and recorded
    /// as [`ReviewState::Skipped`]; a failed final flush is recorded in
    /// [`ApprovalSummary::flush_error`].
    pub fn run(&mut self, run: &mut RunResult, source: &mut dyn DecisionSource) -> ApprovalSummary {
        let queue = run.review_queue();
        let total = queue.len();
        let mut summary = ApprovalSummary::default();
        let mut session = WriteSession::open(&mut *self.store);
        info!(pages = total, "starting review");

        let mut pending = queue.into_iter().enumerate();
        for (index, key) in pending.by_ref() {
            let Some(result) = run.page(&key) else {
                continue;
            };
            let review = Review {
                position: index + 1,
                total,
                result,
            };
            let (state, error) = match source.decide(&review) {
                Decision::Accept => {
                    match accept_page(&mut *session, self.candidates, self.config, run, &key) {
                        Ok(_) => (ReviewState::Accepted, None),
                        Err(e) => {
                            warn!(page = %key, error = %e, "accept failed");
                            source.notify_error(&key, &e);
                            (ReviewState::Skipped, Some(e.to_string()))
                        }
                    }
                }
                Decision::Reject => (ReviewState::Rejected, None),
                Decision::Skip => (ReviewState::Skipped, None),
                Decision::Abort => {
                    summary.aborted = true;
                    summary.records.push(ReviewRecord {
                        key,
                        state: ReviewState::Skipped,
                        error: None,
                    });
                    break;
                }
            };
            summary.records.push(ReviewRecord { key, state, error });
        }

        summary
            .records
            .extend(pending.map(|(_, key)| ReviewRecord {
                key,
                state: ReviewState::Skipped,
                error: None,
            }));

        if let Err(e) = session.finish() {
            warn!(error = %e, "accepted baselines may not be durable");
            summary.flush_error = Some(e.to_string());
        }

        info!(
            accepted = summary.accepted(),
            rejected = summary.rejected(),
            skipped = summary.skipped(),
            aborted = summary.aborted,
            "review finished"
        );
        summary
    }

    /// Promote one page outside the interactive loop.
    ///
    /// # Errors
    ///
    /// See [`ApprovalError`]. On a write error the store and `run` are
    /// unchanged for `key`; on a flush error the page is already
    /// replaced but may not be durable.
    pub fn accept(&mut self, run: &mut RunResult, key: &PageKey) -> Result<PageResult, ApprovalError> {
        let mut session = WriteSession::open(&mut *self.store);
        let previous = accept_page(&mut *session, self.candidates, self.config, run, key)?;
        session.finish()?;
        Ok(previous)
    }
}

/// Write the candidate for `key` as its baseline and replace the page's
/// record with a fresh comparison. Returns the superseded record.
fn accept_page<S: BaselineStore + ?Sized>(
    store: &mut S,
    candidates: &[CandidateDocument],
    config: &CompareConfig,
    run: &mut RunResult,
    key: &PageKey,
) -> Result<PageResult, ApprovalError> {
    let document = run
        .documents
        .iter_mut()
        .find(|d| d.document_stem == key.document_stem)
        .ok_or_else(|| ApprovalError::UnknownPage(key.clone()))?;
    if document.page(key.page_number).is_none() {
        return Err(ApprovalError::UnknownPage(key.clone()));
    }

    let candidate_doc = candidates
        .iter()
        .find(|c| c.document_stem == key.document_stem)
        .ok_or_else(|| ApprovalError::NoCandidate(key.clone()))?;
    let grid = candidate_doc
        .page(key.page_number)
        .ok_or_else(|| ApprovalError::NoCandidate(key.clone()))?;

    store.store(key, grid)?;

    let counts = PageCounts {
        candidate: candidate_doc.page_count(),
        baseline: document.baseline_page_count.max(key.page_number),
    };
    document.baseline_page_count = counts.baseline;
    let fresh = compare_page(key, Some(grid), counts, &*store, config);
    info!(
        page = %key,
        status = %fresh.status,
        fingerprint = format_args!("{:016x}", grid.fingerprint()),
        "baseline accepted"
    );

    run.replace_page(fresh)
        .ok_or_else(|| ApprovalError::UnknownPage(key.clone()))
}

/// Write every rendered page of every document as its baseline,
/// replacing whatever was stored. Documents that failed to render are
/// skipped. Returns the number of pages written.
///
/// # Errors
///
/// Stops at the first [`StoreError`]; pages written before it stay
/// written.
pub fn approve_all<S: BaselineStore + ?Sized>(
    store: &mut S,
    documents: &[CandidateDocument],
) -> Result<usize, StoreError> {
    let mut session = WriteSession::open(store);
    let mut written = 0;
    for document in documents {
        let pages = match &document.rendering {
            Ok(pages) => pages,
            Err(e) => {
                warn!(document = %document.document_stem, error = %e, "skipping document");
                continue;
            }
        };
        for (grid, n) in pages.iter().zip(1..) {
            session.store(&PageKey::new(document.document_stem.as_str(), n), grid)?;
            written += 1;
        }
        info!(document = %document.document_stem, pages = pages.len(), "baselines written");
    }
    session.finish()?;
    Ok(written)
}
