//! HTML report.
//!
//! A single self-contained page with one card per document. Diff images
//! are referenced by relative file name, so the report must sit in the
//! same directory as the images it links.

use std::fmt::Write;

use pagediff_core::{DocumentResult, PageStatus, RunResult};

use crate::{ReportContext, round2};

const STYLE: &str = "\
  body { font-family: system-ui, sans-serif; max-width: 900px; margin: 2rem auto; padding: 0 1rem; }
  h1 { border-bottom: 2px solid #333; padding-bottom: .5rem; }
  .summary { font-size: 1.1rem; margin-bottom: 1.5rem; }
  .result { border: 1px solid #ddd; border-radius: 6px; padding: 1rem; margin-bottom: 1rem; }
  .result.pass { border-left: 4px solid #22c55e; }
  .result.fail { border-left: 4px solid #ef4444; }
  .result.error { border-left: 4px solid #f59e0b; }
  .result.missing { border-left: 4px solid #6b7280; }
  .filename { font-weight: 600; font-size: 1.05rem; }
  .pages { margin-top: .5rem; font-size: .9rem; color: #555; }
  .diff-img { max-width: 100%; margin-top: .5rem; border: 1px solid #eee; }
";

/// Render `run` as an HTML page.
#[must_use]
pub fn to_html(run: &RunResult, context: &ReportContext<'_>) -> String {
    let mut out = String::new();
    out.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
    out.push_str("<title>Page Diff Report</title>\n<style>\n");
    out.push_str(STYLE);
    out.push_str("</style>\n</head>\n<body>\n<h1>Page Diff Report</h1>\n");
    let _ = writeln!(
        out,
        "<div class=\"summary\">{}/{} documents passed</div>",
        run.passed_count(),
        run.documents.len()
    );

    for doc in &run.documents {
        write_card(&mut out, doc, context);
    }

    if let Some(review) = context.review {
        let _ = writeln!(
            out,
            "<div class=\"summary\">Review: {} accepted &middot; {} rejected &middot; {} skipped{}</div>",
            review.accepted(),
            review.rejected(),
            review.skipped(),
            if review.aborted { " (aborted)" } else { "" }
        );
        if let Some(error) = &review.flush_error {
            let _ = writeln!(
                out,
                "<div class=\"summary\">Baselines may not be saved: {}</div>",
                escape(error)
            );
        }
    }
    out.push_str("</body>\n</html>\n");
    out
}

fn write_card(out: &mut String, doc: &DocumentResult, context: &ReportContext<'_>) {
    let status = doc.status();
    let (class, icon) = match status {
        PageStatus::Pass => ("pass", "&#x2705;"),
        PageStatus::Fail => ("fail", "&#x274C;"),
        PageStatus::Error => ("error", "&#x26A0;"),
        PageStatus::MissingBaseline | PageStatus::PageCountMismatch => ("missing", "&#x2753;"),
    };
    let similarity = doc
        .mean_similarity_pct()
        .map_or_else(|| "n/a".to_string(), |m| format!("{:.2}%", round2(m)));

    let _ = writeln!(out, "<div class=\"result {class}\">");
    let _ = writeln!(
        out,
        "  <div class=\"filename\">{icon} {}</div>",
        escape(&doc.document_stem)
    );
    let _ = writeln!(out, "  <div>SSIM: {similarity} &middot; Status: {status}</div>");
    if let Some(error) = &doc.error {
        let _ = writeln!(out, "  <div class=\"pages\">{}</div>", escape(error));
    }

    let lines: Vec<String> = doc
        .pages
        .iter()
        .map(|p| {
            let n = p.key.page_number;
            p.similarity_pct().map_or_else(
                || format!("Page {n}: {}", p.status),
                |pct| {
                    let tag = if p.passed() { "ok" } else { "DIFF" };
                    format!("Page {n}: {:.2}% [{tag}]", round2(pct))
                },
            )
        })
        .collect();
    if !lines.is_empty() {
        let _ = writeln!(out, "  <div class=\"pages\">{}</div>", lines.join("<br>"));
    }

    for page in &doc.pages {
        if let Some(image) = context.diff_image(&page.key) {
            let _ = writeln!(
                out,
                "  <img class=\"diff-img\" src=\"{}\" alt=\"diff {}\">",
                escape(image),
                escape(&page.key.to_string())
            );
        }
    }
    out.push_str("</div>\n");
}

/// Escape text for use in HTML content and double-quoted attributes.
fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
