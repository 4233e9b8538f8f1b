//! # pdf2md-bench
//!
//! Measure PDF-to-Markdown conversion across OCR backends and accelerator
//! devices: one document per run, wall-clock time and peak resident memory
//! recorded in a per-run log next to the Markdown output.
//!
//! ## Why a harness?
//!
//! Choosing an OCR stack for a document pipeline is an empirical question.
//! Tesseract, EasyOCR, RapidOCR and Surya differ by an order of magnitude in
//! speed and memory depending on the device, and their output quality differs
//! per document. This crate turns a single flat settings file into a fully
//! populated engine configuration, runs exactly one conversion under a memory
//! sampler, and leaves two comparable artifacts per run.
//!
//! ## Run Overview
//!
//! ```text
//! config.json
//!  │
//!  ├─ 1. Settings  load + per-backend key validation
//!  ├─ 2. Pipeline  OCR options + accelerator options + fixed flags
//!  ├─ 3. Engine    docling child process (or the cloud layout service)
//!  ├─ 4. Monitor   peak RSS sampler thread + wall clock
//!  └─ 5. Output    <stem>.md  +  <stem>_<accelerator>.log
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf2md_bench::{HarnessConfig, RunHarness, RunRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let harness = RunHarness::new(HarnessConfig::default());
//!     let request = RunRequest::new("invoice.pdf", "out", "tesseract", "cpu");
//!     let report = harness.run(&request).await?;
//!     eprintln!(
//!         "peak {:.2} MB in {:.2} s",
//!         report.usage.peak_rss_mb(),
//!         report.usage.elapsed_secs()
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2md-bench` and `docint-bench` binaries (clap + anyhow + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod engine;
pub mod error;
pub mod harness;
pub mod logging;
pub mod monitor;
pub mod ocr;
pub mod pipeline;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{load_settings, ExperimentSettings, HarnessConfig, HarnessConfigBuilder};
pub use convert::{ConversionExecutor, ConversionOutcome, DocumentConverter};
pub use engine::{CommandConverter, DocIntelligenceClient};
pub use error::{BenchError, EngineError};
pub use harness::{RunHarness, RunReport, RunRequest};
pub use logging::RunLog;
pub use monitor::{MemoryProbe, MonitorSession, ResourceMonitor, ResourceUsage};
pub use ocr::{OcrBackend, OcrBackendRegistry, OcrOptions};
pub use pipeline::{AcceleratorDevice, AcceleratorOptions, PipelineConfig, PipelineConfigBuilder};
