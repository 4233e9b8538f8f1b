//! CLI binary for the cloud layout-service path.
//!
//! Same harness, same outputs as `pdf2md-bench`, with the Document
//! Intelligence client in place of the docling engine. The log file is tagged
//! `docint` instead of an accelerator.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pdf2md_bench::config::DEFAULT_CONFIG_PATH;
use pdf2md_bench::{HarnessConfig, RunHarness};
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  docint-bench -i test_cases/invoice.pdf -o outputs/docint

SETTINGS KEYS:
  document_intelligence_endpoint   https://<resource>.cognitiveservices.azure.com
  document_intelligence_key        Resource key (sent as Ocp-Apim-Subscription-Key)

OUTPUTS:
  <output-dir>/<stem>.md          Markdown (empty if conversion failed)
  <output-dir>/<stem>_docint.log  Timing, peak RSS and failures
"#;

/// Convert one PDF through the cloud layout model, recording time and memory.
#[derive(Parser, Debug)]
#[command(
    name = "docint-bench",
    version,
    about = "Benchmark PDF-to-Markdown conversion through the Document Intelligence layout model",
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

    /// Settings file.
    #[arg(short, long, env = "PDF2MD_BENCH_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

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

    let show_progress = !cli.quiet && !cli.verbose;
    let filter = match std::env::var("RUST_LOG") {
        Ok(from_env) => from_env,
        Err(_) if cli.quiet => "error".to_string(),
        Err(_) if cli.verbose => "debug".to_string(),
        Err(_) if show_progress => "warn".to_string(),
        Err(_) => "info".to_string(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter)))
        .with_writer(io::stderr)
        .init();

    let config = HarnessConfig::builder()
        .config_path(&cli.config)
        // The upload and polling happen in this process; no engine child.
        .include_child_processes(false)
        .console_filter(filter)
        .build()
        .context("Invalid harness options")?;
    let harness = RunHarness::new(config);

    let bar = show_progress.then(|| {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  ⏱ {elapsed}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_prefix("Analyzing");
        bar.set_message(cli.input.display().to_string());
        bar.enable_steady_tick(Duration::from_millis(80));
        bar
    });

    let result = harness
        .run_document_intelligence(&cli.input, &cli.output_dir)
        .await;

    if let Some(bar) = bar {
        bar.finish_and_clear();
    }

    let report = result.context("Run aborted")?;
    if !cli.quiet {
        match report.outcome.error() {
            None => eprintln!("{}  {}", green("✔"), report.markdown_path.display()),
            Some(e) => eprintln!("{}  conversion failed: {}", red("✘"), red(&e.to_string())),
        }
        eprintln!(
            "   peak {:.2} MB  /  {:.2} s  →  {}",
            report.usage.peak_rss_mb(),
            report.usage.elapsed_secs(),
            dim(&report.log_path.display().to_string()),
        );
    }
    Ok(())
}
