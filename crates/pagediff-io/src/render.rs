//! Document discovery and rasterization.
//!
//! A [`Renderer`] turns one document into an ordered list of page
//! rasters. Two are provided:
//!
//! - [`PdftoppmRenderer`] shells out to poppler's `pdftoppm`.
//! - [`PageImageRenderer`] reads pages that were rasterized elsewhere,
//!   laid out as `{stem}_page_{n}.png` in one directory.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::Command;

use pagediff_core::{CandidateDocument, PixelGrid, RenderError};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::IoError;
use crate::raster::read_grid;
use crate::store::page_files;

/// One document to compare.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSource {
    /// File stem; addresses the document's baselines.
    pub stem: String,
    /// Where the renderer reads the document from.
    pub path: PathBuf,
}

/// Turns documents into page rasters.
pub trait Renderer: Sync {
    /// Documents found in `dir`, sorted by stem.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::Io`] if `dir` cannot be listed.
    fn discover(&self, dir: &Path) -> Result<Vec<DocumentSource>, IoError>;

    /// Rasterize every page of `source` at `dpi`, in page order.
    ///
    /// # Errors
    ///
    /// Returns a [`RenderError`] if the document is missing, unreadable,
    /// or has no pages.
    fn render(&self, source: &DocumentSource, dpi: u32) -> Result<Vec<PixelGrid>, RenderError>;
}

/// Render every source, in parallel, keeping input order. Failures are
/// captured per document.
pub fn render_all(
    renderer: &dyn Renderer,
    sources: &[DocumentSource],
    dpi: u32,
) -> Vec<CandidateDocument> {
    sources
        .par_iter()
        .map(|source| match renderer.render(source, dpi) {
            Ok(pages) => {
                info!(document = %source.stem, pages = pages.len(), dpi, "rendered");
                CandidateDocument::rendered(source.stem.as_str(), pages)
            }
            Err(e) => {
                warn!(document = %source.stem, error = %e, "render failed");
                CandidateDocument::failed(source.stem.as_str(), e)
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// pdftoppm
// ---------------------------------------------------------------------------

/// Renders PDFs with poppler's `pdftoppm` into a scratch directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdftoppmRenderer {
    /// Executable to run.
    pub program: PathBuf,
    /// Render in grayscale (`-gray`) instead of RGB.
    pub grayscale: bool,
}

impl PdftoppmRenderer {
    /// Executable name looked up on `PATH`.
    pub const DEFAULT_PROGRAM: &'static str = "pdftoppm";
}

impl Default for PdftoppmRenderer {
    fn default() -> Self {
        Self {
            program: PathBuf::from(Self::DEFAULT_PROGRAM),
            grayscale: false,
        }
    }
}

impl Renderer for PdftoppmRenderer {
    fn discover(&self, dir: &Path) -> Result<Vec<DocumentSource>, IoError> {
        let io_err = |source| IoError::Io {
            path: dir.to_path_buf(),
            source,
        };
        let mut sources = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            let is_pdf = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
            if !is_pdf || !path.is_file() {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                sources.push(DocumentSource {
                    stem: stem.to_string(),
                    path,
                });
            }
        }
        sources.sort_by(|a, b| a.stem.cmp(&b.stem));
        Ok(sources)
    }

    fn render(&self, source: &DocumentSource, dpi: u32) -> Result<Vec<PixelGrid>, RenderError> {
        let document = source.path.display().to_string();
        if !source.path.is_file() {
            return Err(RenderError::NotFound(document));
        }
        let failed = |reason: String| RenderError::Failed {
            document: document.clone(),
            reason,
        };

        let scratch = tempfile::tempdir().map_err(|e| failed(e.to_string()))?;
        let mut command = Command::new(&self.program);
        command.arg("-r").arg(dpi.to_string()).arg("-png");
        if self.grayscale {
            command.arg("-gray");
        }
        command.arg(&source.path).arg(scratch.path().join("page"));
        debug!(?command, "running renderer");

        let output = command.output().map_err(|e| {
            failed(format!("failed to run {}: {e}", self.program.display()))
        })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(failed(format!("{}: {}", output.status, stderr.trim())));
        }

        let pages = numbered_outputs(scratch.path()).map_err(|e| failed(e.to_string()))?;
        if pages.is_empty() {
            return Err(RenderError::NoPages(document.clone()));
        }
        pages
            .iter()
            .map(|path| read_grid(path).map_err(|e| failed(e.to_string())))
            .collect()
    }
}

/// `pdftoppm` output files (`page-1.png`, `page-01.png`, ...) in page
/// order.
fn numbered_outputs(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut numbered = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let number = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.rsplit_once('-'))
            .and_then(|(_, n)| n.parse::<u32>().ok());
        if let Some(n) = number {
            numbered.push((n, path));
        }
    }
    numbered.sort_by_key(|(n, _)| *n);
    Ok(numbered.into_iter().map(|(_, p)| p).collect())
}

// ---------------------------------------------------------------------------
// Pre-rendered pages
// ---------------------------------------------------------------------------

/// Reads pages already rasterized as `{stem}_page_{n}.<ext>` files.
///
/// [`DocumentSource::path`] is the directory holding the pages. The
/// `dpi` argument is ignored; pages are used at whatever resolution they
/// were produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageImageRenderer;

impl Renderer for PageImageRenderer {
    fn discover(&self, dir: &Path) -> Result<Vec<DocumentSource>, IoError> {
        let stems: BTreeSet<String> = page_files(dir)?
            .into_keys()
            .map(|k| k.document_stem)
            .collect();
        Ok(stems
            .into_iter()
            .map(|stem| DocumentSource {
                stem,
                path: dir.to_path_buf(),
            })
            .collect())
    }

    fn render(&self, source: &DocumentSource, _dpi: u32) -> Result<Vec<PixelGrid>, RenderError> {
        let document = source.path.join(&source.stem).display().to_string();
        if !source.path.is_dir() {
            return Err(RenderError::NotFound(document));
        }
        let failed = |reason: String| RenderError::Failed {
            document: document.clone(),
            reason,
        };

        let files = page_files(&source.path).map_err(|e| failed(e.to_string()))?;
        let pages: Vec<(u32, PathBuf)> = files
            .into_iter()
            .filter(|(k, _)| k.document_stem == source.stem)
            .map(|(k, p)| (k.page_number, p))
            .collect();
        if pages.is_empty() {
            return Err(RenderError::NoPages(document.clone()));
        }
        for (expected, (n, _)) in (1..).zip(&pages) {
            if *n != expected {
                return Err(failed(format!("page {expected} is missing")));
            }
        }
        pages
            .iter()
            .map(|(_, path)| read_grid(path).map_err(|e| failed(e.to_string())))
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::raster::write_png_atomic;
    use pagediff_core::Channels;

    fn write_page(dir: &Path, name: &str, v: u8) {
        let grid = PixelGrid::filled(8, 8, Channels::Rgb, [v, v, v]);
        write_png_atomic(&dir.join(name), &grid).unwrap();
    }

    // --- page image renderer tests ---

    #[test]
    fn discovers_stems_in_order() {
        let dir = tempfile::tempdir().unwrap();
        write_page(dir.path(), "zeta_page_1.png", 1);
        write_page(dir.path(), "alpha_page_2.png", 2);
        write_page(dir.path(), "alpha_page_1.png", 3);
        let stems: Vec<_> = PageImageRenderer
            .discover(dir.path())
            .unwrap()
            .into_iter()
            .map(|s| s.stem)
            .collect();
        assert_eq!(stems, vec!["alpha", "zeta"]);
    }

    #[test]
    fn renders_pages_in_numeric_order() {
        let dir = tempfile::tempdir().unwrap();
        for n in 1..=11u8 {
            write_page(dir.path(), &format!("doc_page_{n}.png"), n);
        }
        let source = DocumentSource {
            stem: "doc".to_string(),
            path: dir.path().to_path_buf(),
        };
        let pages = PageImageRenderer.render(&source, 150).unwrap();
        assert_eq!(pages.len(), 11);
        assert_eq!(pages[9].sample(0, 0, 0), 10);
        assert_eq!(pages[10].sample(0, 0, 0), 11);
    }

    #[test]
    fn gap_in_pages_is_render_error() {
        let dir = tempfile::tempdir().unwrap();
        write_page(dir.path(), "doc_page_1.png", 1);
        write_page(dir.path(), "doc_page_3.png", 3);
        let source = DocumentSource {
            stem: "doc".to_string(),
            path: dir.path().to_path_buf(),
        };
        let err = PageImageRenderer.render(&source, 150).unwrap_err();
        assert!(err.to_string().contains("page 2 is missing"));
    }

    #[test]
    fn unknown_stem_has_no_pages() {
        let dir = tempfile::tempdir().unwrap();
        let source = DocumentSource {
            stem: "ghost".to_string(),
            path: dir.path().to_path_buf(),
        };
        assert!(matches!(
            PageImageRenderer.render(&source, 150),
            Err(RenderError::NoPages(_))
        ));
    }

    #[test]
    fn render_all_keeps_order_and_isolates_failures() {
        let dir = tempfile::tempdir().unwrap();
        write_page(dir.path(), "a_page_1.png", 1);
        write_page(dir.path(), "c_page_1.png", 3);
        let sources: Vec<_> = ["a", "b", "c"]
            .into_iter()
            .map(|stem| DocumentSource {
                stem: stem.to_string(),
                path: dir.path().to_path_buf(),
            })
            .collect();
        let docs = render_all(&PageImageRenderer, &sources, 150);
        assert_eq!(docs.len(), 3);
        assert_eq!(docs[0].page_count(), 1);
        assert!(docs[1].rendering.is_err());
        assert_eq!(docs[2].document_stem, "c");
    }

    // --- pdftoppm tests ---

    #[test]
    fn discovers_pdfs_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.pdf"), b"%PDF").unwrap();
        std::fs::write(dir.path().join("a.PDF"), b"%PDF").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"").unwrap();
        let sources = PdftoppmRenderer::default().discover(dir.path()).unwrap();
        let stems: Vec<_> = sources.iter().map(|s| s.stem.as_str()).collect();
        assert_eq!(stems, vec!["a", "b"]);
    }

    #[test]
    fn missing_pdf_is_not_found() {
        let source = DocumentSource {
            stem: "nope".to_string(),
            path: PathBuf::from("/definitely/not/here/nope.pdf"),
        };
        assert!(matches!(
            PdftoppmRenderer::default().render(&source, 150),
            Err(RenderError::NotFound(_))
        ));
    }

    #[test]
    fn missing_program_is_render_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.pdf");
        std::fs::write(&path, b"%PDF-1.4").unwrap();
        let renderer = PdftoppmRenderer {
            program: dir.path().join("no-such-renderer"),
            grayscale: false,
        };
        let source = DocumentSource {
            stem: "doc".to_string(),
            path,
        };
        let err = renderer.render(&source, 150).unwrap_err();
        assert!(matches!(err, RenderError::Failed { .. }));
    }

    #[test]
    fn numbered_outputs_sort_numerically() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["page-10.png", "page-02.png", "page-01.png"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        let names: Vec<_> = numbered_outputs(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["page-01.png", "page-02.png", "page-10.png"]);
    }
}
