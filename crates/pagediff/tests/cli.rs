//! End-to-end runs of the `pagediff` binary over pre-rendered page
//! images.

#![allow(clippy::unwrap_used)]

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use pagediff_core::{Channels, PixelGrid};
use pagediff_io::write_png_atomic;

fn page(seed: u32) -> PixelGrid {
    PixelGrid::from_fn(40, 56, Channels::Gray, |x, y| {
        if (x / 5 + y / 7 + seed) % 4 == 0 { [10; 3] } else { [245; 3] }
    })
}

struct Workspace {
    _root: tempfile::TempDir,
    docs: PathBuf,
    refs: PathBuf,
    out: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let docs = root.path().join("docs");
        std::fs::create_dir_all(&docs).unwrap();
        Self {
            docs,
            refs: root.path().join("refs"),
            out: root.path().join("out"),
            _root: root,
        }
    }

    fn write_pages(&self, stem: &str, seeds: &[u32]) {
        for (seed, n) in seeds.iter().zip(1..) {
            let path = self.docs.join(format!("{stem}_page_{n}.png"));
            write_png_atomic(&path, &page(*seed)).unwrap();
        }
    }

    fn init(&self) -> Output {
        pagediff()
            .args(["init", "--renderer", "images", "-p"])
            .arg(&self.docs)
            .arg("-r")
            .arg(&self.refs)
            .output()
            .unwrap()
    }

    fn compare_cmd(&self, extra: &[&str]) -> Command {
        let mut cmd = pagediff();
        cmd.args(["compare", "--renderer", "images", "-t"])
            .arg(&self.docs)
            .arg("-r")
            .arg(&self.refs)
            .arg("-o")
            .arg(&self.out)
            .args(extra);
        cmd
    }

    fn compare(&self, extra: &[&str]) -> Output {
        self.compare_cmd(extra).output().unwrap()
    }
}

fn pagediff() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_pagediff"));
    cmd.env("RUST_LOG", "warn");
    cmd
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn exists(dir: &Path, name: &str) -> bool {
    dir.join(name).is_file()
}

#[test]
fn init_then_identical_compare_passes() {
    let ws = Workspace::new();
    ws.write_pages("invoice", &[0, 1]);

    let init = ws.init();
    assert!(init.status.success());
    assert!(stdout(&init).contains("Initialized 2 baseline pages for 1 documents"));
    assert!(exists(&ws.refs, "invoice_page_1.png"));
    assert!(exists(&ws.refs, "invoice_page_2.png"));

    let compare = ws.compare(&[]);
    assert_eq!(compare.status.code(), Some(0));
    assert!(stdout(&compare).contains("Results: 1/1 passed"));
    assert!(exists(&ws.out, "comparison_results.json"));
    assert!(!exists(&ws.out, "comparison_results.txt"));
    assert!(!exists(&ws.out, "invoice_page_1_diff.png"));
}

#[test]
fn changed_page_fails_and_writes_every_report() {
    let ws = Workspace::new();
    ws.write_pages("invoice", &[0, 1]);
    assert!(ws.init().status.success());
    ws.write_pages("invoice", &[0, 2]);

    let compare = ws.compare(&["--format", "all"]);
    assert_eq!(compare.status.code(), Some(1));
    let out = stdout(&compare);
    assert!(out.contains("Results: 0/1 passed"));
    assert!(out.contains("[FAIL] invoice"));

    assert!(exists(&ws.out, "invoice_page_2_diff.png"));
    assert!(!exists(&ws.out, "invoice_page_1_diff.png"));
    for name in [
        "comparison_results.json",
        "comparison_results.txt",
        "comparison_results.html",
    ] {
        assert!(exists(&ws.out, name), "{name} missing");
    }

    let report = std::fs::read_to_string(ws.out.join("comparison_results.json")).unwrap();
    let json: serde_json::Value = serde_json::from_str(&report).unwrap();
    assert_eq!(json["documents"][0]["pages"][1]["status"], "FAIL");
    assert_eq!(
        json["documents"][0]["pages"][1]["diff_image"],
        "invoice_page_2_diff.png"
    );
}

#[test]
fn document_without_baseline_is_reported_missing() {
    let ws = Workspace::new();
    ws.write_pages("invoice", &[0]);
    assert!(ws.init().status.success());
    ws.write_pages("letter", &[3]);

    let compare = ws.compare(&["--format", "text"]);
    assert_eq!(compare.status.code(), Some(1));
    assert!(stdout(&compare).contains("Results: 1/2 passed"));
    let text = std::fs::read_to_string(ws.out.join("comparison_results.txt")).unwrap();
    assert!(text.contains("[MISSING_BASELINE] letter\n    No baseline found\n"));
}

#[test]
fn interactive_accept_updates_baseline() {
    let ws = Workspace::new();
    ws.write_pages("invoice", &[0]);
    assert!(ws.init().status.success());
    ws.write_pages("invoice", &[2]);

    let mut child = ws
        .compare_cmd(&["--interactive"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child.stdin.take().unwrap().write_all(b"y\n").unwrap();
    let reviewed = child.wait_with_output().unwrap();

    let out = stdout(&reviewed);
    assert!(out.contains("[1/1] invoice page 1: FAIL"));
    assert!(out.contains("Results: 1/1 passed"));
    assert_eq!(reviewed.status.code(), Some(0));

    let rerun = ws.compare(&[]);
    assert_eq!(rerun.status.code(), Some(0));
}

#[test]
fn invalid_threshold_is_a_configuration_error() {
    let ws = Workspace::new();
    let compare = ws.compare(&["--threshold", "150"]);
    assert_eq!(compare.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&compare.stderr);
    assert!(stderr.contains("threshold must be between 0 and 100"));
    assert!(!ws.out.exists());
}

#[test]
fn missing_directories_are_errors() {
    let ws = Workspace::new();
    let compare = ws.compare(&[]);
    assert_eq!(compare.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&compare.stderr);
    assert!(stderr.contains("reference directory not found"));

    let init = pagediff()
        .args(["init", "--renderer", "images", "-p", "/nonexistent/pagediff", "-r"])
        .arg(&ws.refs)
        .output()
        .unwrap();
    assert_eq!(init.status.code(), Some(1));
}
