//! Terminal-backed [`DecisionSource`].

use std::collections::BTreeMap;
use std::io::{BufRead, Write};
use std::path::PathBuf;

use pagediff_core::{ApprovalError, Decision, DecisionSource, PageKey, Review};

/// Prompts on `output` and reads one answer per line from `input`.
///
/// End of input aborts the review, so piping a short answer list or
/// closing the terminal never leaves the loop waiting.
pub struct ConsoleDecisions<R, W> {
    input: R,
    output: W,
    diff_images: BTreeMap<PageKey, PathBuf>,
}

impl<R: BufRead, W: Write> ConsoleDecisions<R, W> {
    /// Diff image paths are shown next to the page they belong to.
    pub const fn new(input: R, output: W, diff_images: BTreeMap<PageKey, PathBuf>) -> Self {
        Self {
            input,
            output,
            diff_images,
        }
    }

    fn describe(&mut self, review: &Review<'_>) -> std::io::Result<()> {
        let result = review.result;
        write!(
            self.output,
            "[{}/{}] {}: {}",
            review.position, review.total, result.key, result.status
        )?;
        if let Some(pct) = result.similarity_pct() {
            write!(
                self.output,
                " ({pct:.2}% < {:.2}%)",
                result.threshold_used
            )?;
        }
        writeln!(self.output)?;
        if let Some(message) = &result.message {
            writeln!(self.output, "  {message}")?;
        }
        if let Some(path) = self.diff_images.get(&result.key) {
            writeln!(self.output, "  Diff image: {}", path.display())?;
        }
        Ok(())
    }

    fn ask(&mut self) -> std::io::Result<Option<Decision>> {
        loop {
            write!(
                self.output,
                "  Accept as new baseline? [y]es / [n]o / [s]kip / [q]uit: "
            )?;
            self.output.flush()?;

            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                return Ok(None);
            }
            if let Some(decision) = parse_answer(&line) {
                return Ok(Some(decision));
            }
            writeln!(self.output, "  Please answer y, n, s, or q.")?;
        }
    }
}

impl<R: BufRead, W: Write> DecisionSource for ConsoleDecisions<R, W> {
    fn decide(&mut self, review: &Review<'_>) -> Decision {
        let answer = self.describe(review).and_then(|()| self.ask());
        match answer {
            Ok(Some(decision)) => decision,
            Ok(None) | Err(_) => {
                let _ = writeln!(self.output);
                Decision::Abort
            }
        }
    }

    fn notify_error(&mut self, key: &PageKey, error: &ApprovalError) {
        let _ = writeln!(self.output, "  ! {key} not updated: {error}");
    }
}

/// Map a typed answer to a decision. An empty answer skips.
fn parse_answer(line: &str) -> Option<Decision> {
    match line.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" | "a" | "accept" => Some(Decision::Accept),
        "n" | "no" | "r" | "reject" => Some(Decision::Reject),
        "" | "s" | "skip" => Some(Decision::Skip),
        "q" | "quit" | "abort" => Some(Decision::Abort),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Cursor;

    use pagediff_core::{PageResult, PageStatus};

    use super::*;

    fn failing_page() -> PageResult {
        PageResult {
            key: PageKey::new("invoice", 2),
            status: PageStatus::Fail,
            similarity_score: Some(0.9123),
            threshold_used: 95.0,
            diff_image: None,
            message: None,
        }
    }

    fn decide_with(input: &str) -> (Decision, String) {
        let result = failing_page();
        let images = BTreeMap::from([(
            result.key.clone(),
            PathBuf::from("out/invoice_page_2_diff.png"),
        )]);
        let mut output = Vec::new();
        let decision = {
            let mut console =
                ConsoleDecisions::new(Cursor::new(input.to_string()), &mut output, images);
            console.decide(&Review {
                position: 1,
                total: 3,
                result: &result,
            })
        };
        (decision, String::from_utf8(output).unwrap())
    }

    #[test]
    fn answers_map_to_decisions() {
        assert_eq!(decide_with("y\n").0, Decision::Accept);
        assert_eq!(decide_with("No\n").0, Decision::Reject);
        assert_eq!(decide_with("\n").0, Decision::Skip);
        assert_eq!(decide_with("q\n").0, Decision::Abort);
    }

    #[test]
    fn end_of_input_aborts() {
        assert_eq!(decide_with("").0, Decision::Abort);
    }

    #[test]
    fn unrecognised_answer_reprompts() {
        let (decision, output) = decide_with("maybe\ns\n");
        assert_eq!(decision, Decision::Skip);
        assert!(output.contains("Please answer"));
        assert_eq!(output.matches("Accept as new baseline?").count(), 2);
    }

    #[test]
    fn prompt_describes_page() {
        let (_, output) = decide_with("s\n");
        assert!(output.starts_with("[1/3] invoice page 2: FAIL (91.23% < 95.00%)\n"));
        assert!(output.contains("Diff image: out/invoice_page_2_diff.png"));
    }
}
