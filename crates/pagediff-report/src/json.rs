//! JSON report.
//!
//! The core result types serialize directly, but the report flattens
//! them into a stable, reader-friendly shape: percentages instead of raw
//! scores, a per-document summary, and diff image file names.

use serde::Serialize;

use pagediff_core::{ApprovalSummary, DocumentResult, PageResult, PageStatus, RunResult};

use crate::{ReportContext, round2};

#[derive(Serialize)]
struct Report<'a> {
    summary: Summary,
    documents: Vec<Document<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    review: Option<&'a ApprovalSummary>,
}

#[derive(Serialize)]
struct Summary {
    status: PageStatus,
    passed: bool,
    documents: usize,
    documents_passed: usize,
    pages: usize,
    pages_passed: usize,
}

#[derive(Serialize)]
struct Document<'a> {
    document: &'a str,
    status: PageStatus,
    passed: bool,
    mean_similarity_pct: Option<f64>,
    candidate_page_count: u32,
    baseline_page_count: u32,
    error: Option<&'a str>,
    pages: Vec<Page<'a>>,
}

#[derive(Serialize)]
struct Page<'a> {
    page: u32,
    status: PageStatus,
    passed: bool,
    similarity_pct: Option<f64>,
    similarity_score: Option<f64>,
    threshold: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    diff_image: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
}

/// Render `run` as pretty-printed JSON.
///
/// # Errors
///
/// Returns [`serde_json::Error`] if serialization fails.
pub fn to_json(run: &RunResult, context: &ReportContext<'_>) -> Result<String, serde_json::Error> {
    let report = Report {
        summary: Summary {
            status: run.status(),
            passed: run.status() == PageStatus::Pass,
            documents: run.documents.len(),
            documents_passed: run.passed_count(),
            pages: run.pages().count(),
            pages_passed: run.pages().filter(|p| p.passed()).count(),
        },
        documents: run.documents.iter().map(|d| document(d, context)).collect(),
        review: context.review,
    };
    serde_json::to_string_pretty(&report)
}

fn document<'a>(doc: &'a DocumentResult, context: &ReportContext<'a>) -> Document<'a> {
    Document {
        document: &doc.document_stem,
        status: doc.status(),
        passed: doc.passed(),
        mean_similarity_pct: doc.mean_similarity_pct().map(round2),
        candidate_page_count: doc.candidate_page_count,
        baseline_page_count: doc.baseline_page_count,
        error: doc.error.as_deref(),
        pages: doc.pages.iter().map(|p| page(p, context)).collect(),
    }
}

fn page<'a>(result: &'a PageResult, context: &ReportContext<'a>) -> Page<'a> {
    Page {
        page: result.key.page_number,
        status: result.status,
        passed: result.passed(),
        similarity_pct: result.similarity_pct().map(round2),
        similarity_score: result.similarity_score,
        threshold: result.threshold_used,
        diff_image: context.diff_image(&result.key),
        message: result.message.as_deref(),
    }
}
