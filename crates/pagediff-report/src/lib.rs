//! pagediff-report: Pure report serializers (sans-IO).
//!
//! Renders a [`RunResult`] as JSON, plain text, or HTML. Every function
//! returns a `String`; writing it anywhere is the caller's business.
//! Percentages are rounded to two decimals.

use std::collections::BTreeMap;

use pagediff_core::{ApprovalSummary, PageKey, RunResult};

pub mod html;
pub mod json;
pub mod text;

pub use html::to_html;
pub use json::to_json;
pub use text::to_text;

/// Output format of a report file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReportFormat {
    /// Machine-readable JSON.
    Json,
    /// Plain text summary.
    Text,
    /// Self-contained HTML page.
    Html,
}

impl ReportFormat {
    /// Every format, in the order reports are written.
    pub const ALL: [Self; 3] = [Self::Json, Self::Text, Self::Html];

    /// File name the report is conventionally written to.
    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::Json => "comparison_results.json",
            Self::Text => "comparison_results.txt",
            Self::Html => "comparison_results.html",
        }
    }
}

/// Extra information a report may include besides the run itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportContext<'a> {
    /// Saved overlay file names, relative to the report's directory.
    pub diff_images: Option<&'a BTreeMap<PageKey, String>>,
    /// Outcome of the interactive review, if one took place.
    pub review: Option<&'a ApprovalSummary>,
}

impl<'a> ReportContext<'a> {
    fn diff_image(&self, key: &PageKey) -> Option<&'a str> {
        self.diff_images?.get(key).map(String::as_str)
    }
}

/// Errors while producing a report.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// JSON serialization failed.
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Render `run` in `format`.
///
/// # Errors
///
/// Returns [`ReportError::Json`] if JSON serialization fails.
pub fn render(
    format: ReportFormat,
    run: &RunResult,
    context: &ReportContext<'_>,
) -> Result<String, ReportError> {
    Ok(match format {
        ReportFormat::Json => to_json(run, context)?,
        ReportFormat::Text => to_text(run, context),
        ReportFormat::Html => to_html(run, context),
    })
}

/// Round to two decimals for display and serialization.
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round2_keeps_two_decimals() {
        assert!((round2(98.765_43) - 98.77).abs() < 1e-9);
        assert!((round2(100.0) - 100.0).abs() < 1e-9);
        assert!((round2(0.004) - 0.0).abs() < 1e-9);
    }

    #[test]
    fn file_names() {
        let names: Vec<_> = ReportFormat::ALL.iter().map(|f| f.file_name()).collect();
        assert_eq!(
            names,
            vec![
                "comparison_results.json",
                "comparison_results.txt",
                "comparison_results.html"
            ]
        );
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn render_dispatches_on_format() {
        let run = fixtures::run();
        let context = ReportContext::default();
        assert!(render(ReportFormat::Json, &run, &context).unwrap().starts_with('{'));
        assert!(render(ReportFormat::Text, &run, &context).unwrap().starts_with("Comparison"));
        assert!(render(ReportFormat::Html, &run, &context).unwrap().starts_with("<!DOCTYPE"));
    }
}
