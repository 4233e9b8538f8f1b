//! CLI binary for pdf2md-bench.
//!
//! A thin shim over the library crate: maps flags to a `RunRequest` and a
//! `HarnessConfig`, runs one conversion, prints the measurements.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pdf2md_bench::config::DEFAULT_CONFIG_PATH;
use pdf2md_bench::{HarnessConfig, RunHarness, RunReport, RunRequest};
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Tesseract on CPU
  pdf2md-bench -i test_cases/invoice.pdf -o outputs/tesseract --ocr tesseract --accelerator cpu

  # Surya on Apple silicon, finer memory sampling
  pdf2md-bench -i paper.pdf -o outputs/surya --ocr suryaocr --accelerator mps --poll-interval-ms 2

  # Different settings file
  pdf2md-bench -c experiments/gpu.json -i scan.pdf -o outputs/rapid --ocr rapidocr --accelerator cuda

OCR BACKENDS:
  Backend     Settings keys used
  ─────────   ──────────────────────────────────────────────────────────────
  tesseract   tesseract_lang, tessdata_prefix
  easyocr     easyocr_lang
  rapidocr    modelscope_model_cache_dir, rapidocr_{det,rec,cls}_model_rel_path
  suryaocr    suryaocr_lang

  Every backend also reads num_threads and force_full_page_ocr (default false).

OUTPUTS:
  <output-dir>/<stem>.md                 Markdown (empty if conversion failed)
  <output-dir>/<stem>_<accelerator>.log  Timing, peak RSS and failures

  The log name uses the canonical device name, so --accelerator metal or
  gpu-metal writes <stem>_mps.log.

ENVIRONMENT VARIABLES:
  PDF2MD_BENCH_CONFIG   Settings file (default: config.json)
  TESSDATA_PREFIX       Tesseract data dir; overrides tessdata_prefix when set
  RUST_LOG              Console log filter (overrides -v / -q)
"#;

/// Convert one PDF to Markdown with a chosen OCR backend and accelerator,
/// recording time and peak memory.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2md-bench",
    version,
    about = "Benchmark PDF-to-Markdown conversion for one OCR backend and accelerator",
    long_about = "Runs the document-conversion engine once on a PDF with the selected OCR \
backend (tesseract, easyocr, rapidocr, suryaocr) and accelerator device (cpu, mps, cuda). \
Writes the Markdown export and a log with wall-clock time and peak resident memory.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Input PDF file.
    #[arg(short, long)]
    input: PathBuf,

    /// Directory for the Markdown and log outputs (created if missing).
    #[arg(short, long)]
    output_dir: PathBuf,

    /// OCR backend: tesseract, easyocr, rapidocr, suryaocr.
    #[arg(long)]
    ocr: String,

    /// Accelerator device: cpu, mps, cuda.
    #[arg(long)]
    accelerator: String,

    /// Settings file.
    #[arg(short, long, env = "PDF2MD_BENCH_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Memory sampling period in milliseconds (1–1000).
    #[arg(long, env = "PDF2MD_BENCH_POLL_MS", default_value_t = 10,
          value_parser = clap::value_parser!(u64).range(1..=1000))]
    poll_interval_ms: u64,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner covers progress; library INFO lines would tear it.
    let show_progress = !cli.quiet && !cli.verbose;
    let filter = console_filter(cli.quiet, cli.verbose, show_progress);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter)))
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let config = HarnessConfig::builder()
        .config_path(&cli.config)
        .poll_interval_ms(cli.poll_interval_ms)
        .console_filter(filter)
        .build()
        .context("Invalid harness options")?;

    let request = RunRequest::new(&cli.input, &cli.output_dir, &cli.ocr, &cli.accelerator);
    let harness = RunHarness::new(config);

    // ── Run ──────────────────────────────────────────────────────────────
    let bar = show_progress.then(|| {
        spinner(&format!(
            "{} · {} · {}",
            cli.input.display(),
            cli.ocr,
            cli.accelerator
        ))
    });

    let result = harness.run(&request).await;

    if let Some(bar) = bar {
        bar.finish_and_clear();
    }

    let report = result.context("Run aborted")?;
    if !cli.quiet {
        print_summary(&report);
    }
    Ok(())
}

/// `RUST_LOG` wins; otherwise quiet → error, verbose → debug, spinner → warn.
fn console_filter(quiet: bool, verbose: bool, show_progress: bool) -> String {
    if let Ok(from_env) = std::env::var("RUST_LOG") {
        return from_env;
    }
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else if show_progress {
        "warn"
    } else {
        "info"
    };
    level.to_string()
}

fn spinner(message: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  ⏱ {elapsed}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
    );
    bar.set_prefix("Converting");
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

fn print_summary(report: &RunReport) {
    match report.outcome.error() {
        None => eprintln!(
            "{}  {}  {}",
            green("✔"),
            bold(&report.markdown_path.display().to_string()),
            dim(&format!("{} chars", report.outcome.markdown().len())),
        ),
        Some(e) => eprintln!(
            "{}  conversion failed: {}  {}",
            red("✘"),
            red(&e.to_string()),
            dim(&format!("(empty {})", report.markdown_path.display())),
        ),
    }
    eprintln!(
        "   peak {}  /  {}  →  {}",
        bold(&format!("{:.2} MB", report.usage.peak_rss_mb())),
        bold(&format!("{:.2} s", report.usage.elapsed_secs())),
        dim(&report.log_path.display().to_string()),
    );
}
