//! Plain-text report.

use std::fmt::Write;

use pagediff_core::{DocumentResult, PageResult, PageStatus, RunResult};

use crate::{ReportContext, round2};

/// Width of the rule under the header line.
const RULE_WIDTH: usize = 50;

/// Render `run` as a plain-text summary, one block per document.
#[must_use]
pub fn to_text(run: &RunResult, context: &ReportContext<'_>) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Comparison Results: {}/{} passed",
        run.passed_count(),
        run.documents.len()
    );
    let _ = writeln!(out, "{}", "-".repeat(RULE_WIDTH));

    for doc in &run.documents {
        write_document(&mut out, doc, context);
    }

    if let Some(review) = context.review {
        let _ = writeln!(out, "{}", "-".repeat(RULE_WIDTH));
        let _ = write!(
            out,
            "Review: {} accepted, {} rejected, {} skipped",
            review.accepted(),
            review.rejected(),
            review.skipped()
        );
        if review.aborted {
            out.push_str(" (aborted)");
        }
        out.push('\n');
        if let Some(error) = &review.flush_error {
            let _ = writeln!(out, "    Baselines may not be saved: {error}");
        }
        for record in review.records.iter().filter(|r| r.error.is_some()) {
            let _ = writeln!(
                out,
                "    {}: {}",
                record.key,
                record.error.as_deref().unwrap_or_default()
            );
        }
    }
    out
}

fn write_document(out: &mut String, doc: &DocumentResult, context: &ReportContext<'_>) {
    let _ = writeln!(out, "[{}] {}", doc.status(), doc.document_stem);

    if let Some(error) = &doc.error {
        let _ = writeln!(out, "    Error: {error}");
        return;
    }
    if doc.pages.iter().all(|p| p.status == PageStatus::MissingBaseline) {
        let _ = writeln!(out, "    No baseline found");
        return;
    }

    if let Some(mean) = doc.mean_similarity_pct() {
        let _ = writeln!(out, "    Similarity: {:.2}%", round2(mean));
    }
    if doc.candidate_page_count != doc.baseline_page_count {
        let _ = writeln!(
            out,
            "    Page count mismatch: baseline={} candidate={}",
            doc.baseline_page_count, doc.candidate_page_count
        );
    }
    for page in &doc.pages {
        write_page(out, page, context);
    }
}

fn write_page(out: &mut String, page: &PageResult, context: &ReportContext<'_>) {
    let n = page.key.page_number;
    match page.similarity_pct() {
        Some(pct) => {
            let tag = if page.passed() { "ok" } else { "DIFF" };
            let _ = write!(out, "      Page {n}: {:.2}% [{tag}]", round2(pct));
        }
        None => {
            let _ = write!(out, "      Page {n}: {}", page.status);
            if let Some(message) = &page.message {
                let _ = write!(out, " ({message})");
            }
        }
    }
    if let Some(image) = context.diff_image(&page.key) {
        let _ = write!(out, " -> {image}");
    }
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use pagediff_core::{ApprovalSummary, PageKey, ReviewRecord, ReviewState};

    use super::*;
    use crate::fixtures;

    #[test]
    fn header_counts_passing_documents() {
        let text = to_text(&fixtures::run(), &ReportContext::default());
        assert!(text.starts_with("Comparison Results: 1/3 passed\n"));
    }

    #[test]
    fn document_blocks() {
        let text = to_text(&fixtures::run(), &ReportContext::default());
        assert!(text.contains("[PASS] invoice\n    Similarity: 99.38%\n"));
        assert!(text.contains("      Page 2: 98.77% [ok]\n"));
        assert!(text.contains("[PAGE_COUNT_MISMATCH] report <draft>\n"));
        assert!(text.contains("    Page count mismatch: baseline=1 candidate=2\n"));
        assert!(text.contains("      Page 1: 91.23% [DIFF]\n"));
        assert!(text.contains("      Page 2: PAGE_COUNT_MISMATCH (PAGE_COUNT_MISMATCH detail)\n"));
        assert!(text.contains("[ERROR] broken\n    Error: document not found: broken.pdf\n"));
    }

    #[test]
    fn missing_baselines_are_summarised() {
        let mut run = fixtures::run();
        run.documents.truncate(1);
        for page in &mut run.documents[0].pages {
            page.status = PageStatus::MissingBaseline;
            page.similarity_score = None;
        }
        let text = to_text(&run, &ReportContext::default());
        assert!(text.contains("[MISSING_BASELINE] invoice\n    No baseline found\n"));
    }

    #[test]
    fn diff_images_and_review_footer() {
        let key = PageKey::new("report <draft>", 1);
        let images = BTreeMap::from([(key.clone(), "d.png".to_string())]);
        let review = ApprovalSummary {
            records: vec![ReviewRecord {
                key,
                state: ReviewState::Skipped,
                error: Some("disk full".to_string()),
            }],
            aborted: true,
            flush_error: Some("fsync failed".to_string()),
        };
        let context = ReportContext {
            diff_images: Some(&images),
            review: Some(&review),
        };
        let text = to_text(&fixtures::run(), &context);
        assert!(text.contains("Page 1: 91.23% [DIFF] -> d.png\n"));
        assert!(text.contains("Review: 0 accepted, 0 rejected, 1 skipped (aborted)\n"));
        assert!(text.contains("    report <draft> page 1: disk full\n"));
        assert!(text.contains("    Baselines may not be saved: fsync failed\n"));
    }
}
