//! pagediff: visual regression testing for rendered document pages.
//!
//! Renders every PDF in a directory, compares each page against its
//! approved baseline with SSIM, and writes diff overlays plus JSON, text,
//! or HTML reports. Failing pages can be reviewed and accepted as new
//! baselines interactively.
//!
//! # Usage
//!
//! ```text
//! pagediff init -p pdfs/ -r baselines/
//! pagediff compare -t pdfs/ -r baselines/ -o out/ --format all
//! pagediff compare -t pdfs/ -r baselines/ -o out/ --interactive
//! ```
//!
//! Exit status is 0 when every document passes, 1 when any document does
//! not pass or an operational error occurs, and 2 for invalid
//! configuration.

#![allow(clippy::print_stdout, clippy::print_stderr)]

mod console;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use pagediff_core::{ApprovalWorkflow, CompareConfig, RunParams, RunResult};
use pagediff_io::{
    DirectoryStore, PageImageRenderer, PdftoppmRenderer, Renderer, render_all, save_diff_images,
    write_report,
};
use pagediff_report::{ReportContext, ReportFormat};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::console::ConsoleDecisions;

/// Exit status for invalid configuration.
const EXIT_CONFIG: u8 = 2;

/// Visual regression testing for rendered document pages.
#[derive(Parser)]
#[command(name = "pagediff", version)]
struct Cli {
    /// Log at debug level (overridden by `RUST_LOG`).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compare documents against their baselines and write reports.
    Compare(CompareArgs),
    /// Render documents and store every page as its baseline.
    Init(InitArgs),
}

#[derive(clap::Args)]
struct CompareArgs {
    /// Directory of documents to test.
    #[arg(short, long)]
    test_dir: PathBuf,

    /// Directory of baseline page images.
    #[arg(short, long)]
    ref_dir: PathBuf,

    /// Directory for reports and diff images.
    #[arg(short, long)]
    output: PathBuf,

    /// Pass threshold as an SSIM percentage (0-100).
    #[arg(long, default_value_t = CompareConfig::DEFAULT_THRESHOLD)]
    threshold: f64,

    /// SSIM window side length (odd, at least 3).
    #[arg(long, default_value_t = CompareConfig::DEFAULT_WINDOW_SIZE)]
    window_size: u32,

    /// Also save overlays for passing pages.
    #[arg(long)]
    overlay_passing: bool,

    /// Render resolution in dots per inch.
    #[arg(long, default_value_t = RunParams::DEFAULT_DPI)]
    dpi: u32,

    /// Report format.
    #[arg(long, value_enum, default_value_t = Format::Json)]
    format: Format,

    /// Review failing pages and optionally accept them as baselines.
    #[arg(long)]
    interactive: bool,

    #[command(flatten)]
    render: RenderArgs,

    /// Full comparison config as a JSON string.
    ///
    /// When provided, `--threshold`, `--window-size`, and
    /// `--overlay-passing` are ignored. Missing fields take their
    /// defaults.
    #[arg(long)]
    config_json: Option<String>,
}

#[derive(clap::Args)]
struct InitArgs {
    /// Directory of documents to approve.
    #[arg(short, long)]
    pdf_dir: PathBuf,

    /// Directory to write baseline page images to.
    #[arg(short, long)]
    ref_dir: PathBuf,

    /// Render resolution in dots per inch.
    #[arg(long, default_value_t = RunParams::DEFAULT_DPI)]
    dpi: u32,

    #[command(flatten)]
    render: RenderArgs,
}

#[derive(clap::Args)]
struct RenderArgs {
    /// How documents are turned into page images.
    #[arg(long, value_enum, default_value_t = RendererKind::Pdftoppm)]
    renderer: RendererKind,

    /// Render in grayscale (pdftoppm only).
    #[arg(long)]
    gray: bool,

    /// pdftoppm executable.
    #[arg(long, default_value = PdftoppmRenderer::DEFAULT_PROGRAM)]
    pdftoppm: PathBuf,
}

/// Page source selection.
#[derive(Clone, Copy, ValueEnum)]
enum RendererKind {
    /// Render `*.pdf` files with poppler's pdftoppm.
    Pdftoppm,
    /// Read pre-rendered `{stem}_page_{n}.png` images.
    Images,
}

/// Report format selection.
#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Text,
    Html,
    /// Write all three.
    All,
}

impl Format {
    fn report_formats(self) -> Vec<ReportFormat> {
        match self {
            Self::Json => vec![ReportFormat::Json],
            Self::Text => vec![ReportFormat::Text],
            Self::Html => vec![ReportFormat::Html],
            Self::All => ReportFormat::ALL.to_vec(),
        }
    }
}

impl RenderArgs {
    fn renderer(&self) -> Box<dyn Renderer> {
        match self.renderer {
            RendererKind::Pdftoppm => Box::new(PdftoppmRenderer {
                program: self.pdftoppm.clone(),
                grayscale: self.gray,
            }),
            RendererKind::Images => Box::new(PageImageRenderer),
        }
    }
}

/// Build and validate a [`CompareConfig`] and [`RunParams`] from CLI
/// arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and the
/// individual comparison flags are ignored.
fn config_from_cli(args: &CompareArgs) -> Result<(CompareConfig, RunParams), String> {
    let config = match args.config_json {
        Some(ref json) => serde_json::from_str(json)
            .map_err(|e| format!("Error parsing --config-json: {e}"))?,
        None => CompareConfig {
            threshold: args.threshold,
            window_size: args.window_size,
            overlay_passing_pages: args.overlay_passing,
            ..CompareConfig::default()
        },
    };
    let params = RunParams {
        threshold: config.threshold,
        dpi: args.dpi,
        interactive: args.interactive,
    };
    params
        .validate()
        .and_then(|()| config.validate())
        .map_err(|e| format!("Invalid configuration: {e}"))?;
    Ok((config, params))
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let outcome = match &cli.command {
        Command::Compare(args) => {
            let (config, params) = match config_from_cli(args) {
                Ok(c) => c,
                Err(msg) => {
                    eprintln!("{msg}");
                    return ExitCode::from(EXIT_CONFIG);
                }
            };
            compare(args, &config, params)
        }
        Command::Init(args) => {
            let params = RunParams {
                dpi: args.dpi,
                ..RunParams::default()
            };
            if let Err(e) = params.validate() {
                eprintln!("Invalid configuration: {e}");
                return ExitCode::from(EXIT_CONFIG);
            }
            init(args)
        }
    };

    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

// ---------------------------------------------------------------------------
// compare
// ---------------------------------------------------------------------------

/// Returns whether every document passed and every accepted baseline
/// was flushed.
fn compare(args: &CompareArgs, config: &CompareConfig, params: RunParams) -> anyhow::Result<bool> {
    require_dir(&args.test_dir, "test directory")?;
    require_dir(&args.ref_dir, "reference directory")?;

    let renderer = args.render.renderer();
    let sources = renderer
        .discover(&args.test_dir)
        .context("failed to list test documents")?;
    if sources.is_empty() {
        warn!(dir = %args.test_dir.display(), "no documents found");
    }
    let candidates = render_all(renderer.as_ref(), &sources, params.dpi);

    let mut store = DirectoryStore::open(&args.ref_dir)?;
    let mut run = pagediff_core::run(&candidates, &store, config)?;
    let mut diff_images =
        save_diff_images(&run, &args.output).context("failed to save diff images")?;

    let review = if params.interactive {
        let paths: BTreeMap<_, _> = diff_images
            .iter()
            .map(|(key, name)| (key.clone(), args.output.join(name)))
            .collect();
        let mut console =
            ConsoleDecisions::new(std::io::stdin().lock(), std::io::stdout(), paths);
        let summary =
            ApprovalWorkflow::new(&mut store, &candidates, config).run(&mut run, &mut console);
        info!(
            accepted = summary.accepted(),
            rejected = summary.rejected(),
            skipped = summary.skipped(),
            aborted = summary.aborted,
            "review finished"
        );
        // Accepted pages pass now; their overlays no longer describe a
        // difference.
        diff_images.retain(|key, _| run.page(key).is_some_and(|p| !p.passed()));
        Some(summary)
    } else {
        None
    };

    let context = ReportContext {
        diff_images: Some(&diff_images),
        review: review.as_ref(),
    };
    let mut written = Vec::new();
    for format in args.format.report_formats() {
        let contents = pagediff_report::render(format, &run, &context)?;
        written.push(write_report(&args.output, format.file_name(), &contents)?);
    }

    print_summary(&run, &written);
    let flush_error = review.as_ref().and_then(|r| r.flush_error.as_deref());
    if let Some(error) = flush_error {
        eprintln!("Accepted baselines may not be saved: {error}");
    }
    Ok(run.passed_count() == run.documents.len() && flush_error.is_none())
}

fn print_summary(run: &RunResult, reports: &[PathBuf]) {
    println!(
        "Results: {}/{} passed",
        run.passed_count(),
        run.documents.len()
    );
    for doc in run.documents.iter().filter(|d| !d.passed()) {
        println!("  [{}] {}", doc.status(), doc.document_stem);
    }
    for path in reports {
        println!("Report: {}", path.display());
    }
}

// ---------------------------------------------------------------------------
// init
// ---------------------------------------------------------------------------

/// Returns whether every document was rendered and stored.
fn init(args: &InitArgs) -> anyhow::Result<bool> {
    require_dir(&args.pdf_dir, "document directory")?;

    let renderer = args.render.renderer();
    let sources = renderer
        .discover(&args.pdf_dir)
        .context("failed to list documents")?;
    let candidates = render_all(renderer.as_ref(), &sources, args.dpi);

    let mut store = DirectoryStore::open(&args.ref_dir)?;
    let written = pagediff_core::approve_all(&mut store, &candidates)
        .context("failed to write baselines")?;

    let mut all_rendered = true;
    for doc in &candidates {
        if let Err(e) = &doc.rendering {
            println!("  [ERROR] {}: {e}", doc.document_stem);
            all_rendered = false;
        }
    }
    println!(
        "Initialized {written} baseline pages for {} documents in {}",
        candidates.iter().filter(|d| d.rendering.is_ok()).count(),
        store.root().display()
    );
    Ok(all_rendered)
}

fn require_dir(path: &Path, what: &str) -> anyhow::Result<()> {
    if !path.is_dir() {
        bail!("{what} not found: {}", path.display());
    }
    Ok(())
}
