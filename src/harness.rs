//! Run orchestration: one document, one configuration, one measured conversion.
//!
//! ## Order of a run
//!
//! ```text
//! load settings ─▶ build pipeline ─▶ bind converter      (fatal errors: no files)
//!      │
//!      ▼
//! create output dir ─▶ open <stem>_<tag>.log ─▶ scope RunLog
//!      │
//!      ▼
//! "Processing file" ─▶ monitor start ─▶ executor ─▶ monitor finish (summary)
//!      │
//!      ▼
//! write <stem>.md (temp + rename) ─▶ "Wrote markdown" ─▶ RunReport
//! ```
//!
//! ## Why validate before touching the filesystem?
//!
//! Series of runs are compared by listing the output directory. A run that
//! never converted anything (unknown backend, missing settings) must not leave
//! an empty `.md` or a stub `.log` that looks like a failed conversion.
//! Conversion failures, by contrast, do produce both files: the empty Markdown
//! and a log naming the cause.

use crate::config::{load_settings, ExperimentSettings, HarnessConfig};
use crate::convert::{ConversionExecutor, ConversionOutcome, DocumentConverter};
use crate::engine::{CommandConverter, DocIntelligenceClient};
use crate::error::BenchError;
use crate::logging::RunLog;
use crate::monitor::{ResourceMonitor, ResourceUsage};
use crate::ocr::OcrBackend;
use crate::pipeline::{AcceleratorDevice, PipelineConfig, PipelineConfigBuilder};
use std::path::{Path, PathBuf};
use tracing::instrument::WithSubscriber;
use tracing::{debug, info};

/// Log-file tag for Document Intelligence runs (docling runs use the device).
pub const DOCINT_TAG: &str = "docint";

/// One experiment: which document, where to put results, which engine setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    /// OCR backend identifier, e.g. `"tesseract"`.
    pub ocr_backend: String,
    /// Accelerator identifier, e.g. `"cpu"`.
    pub accelerator: String,
}

impl RunRequest {
    pub fn new(
        input: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        ocr_backend: impl Into<String>,
        accelerator: impl Into<String>,
    ) -> Self {
        Self {
            input: input.into(),
            output_dir: output_dir.into(),
            ocr_backend: ocr_backend.into(),
            accelerator: accelerator.into(),
        }
    }
}

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub markdown_path: PathBuf,
    pub log_path: PathBuf,
    pub outcome: ConversionOutcome,
    pub usage: ResourceUsage,
}

/// Drives runs according to a [`HarnessConfig`].
#[derive(Debug, Clone)]
pub struct RunHarness {
    config: HarnessConfig,
}

impl RunHarness {
    pub fn new(config: HarnessConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Run the docling engine as configured by `converter_command`.
    pub async fn run(&self, request: &RunRequest) -> Result<RunReport, BenchError> {
        self.run_with(request, |pipeline, settings| {
            let converter = CommandConverter::from_settings(settings, &pipeline)?;
            Ok(Box::new(converter) as Box<dyn DocumentConverter>)
        })
        .await
    }

    /// Like [`run`](Self::run), with the converter supplied by `bind`.
    ///
    /// `bind` receives the finished pipeline configuration and the loaded
    /// settings. Its errors are fatal and, like every configuration error,
    /// leave no files behind.
    pub async fn run_with<F>(&self, request: &RunRequest, bind: F) -> Result<RunReport, BenchError>
    where
        F: FnOnce(PipelineConfig, &ExperimentSettings) -> Result<Box<dyn DocumentConverter>, BenchError>,
    {
        let stem = file_stem(&request.input)?;
        let settings = load_settings(&self.config.config_path)?;

        let backend: OcrBackend = request.ocr_backend.parse()?;
        let device: AcceleratorDevice = request.accelerator.parse()?;
        let pipeline = PipelineConfigBuilder::new(&settings).build_for(backend, device)?;
        debug!("Pipeline: {} on {}", pipeline.backend(), device);

        let converter = bind(pipeline, &settings)?;
        self.execute(
            &request.input,
            &request.output_dir,
            &stem,
            device.as_str(),
            converter.as_ref(),
        )
        .await
    }

    /// Convert through the cloud layout service instead of docling.
    pub async fn run_document_intelligence(
        &self,
        input: &Path,
        output_dir: &Path,
    ) -> Result<RunReport, BenchError> {
        let stem = file_stem(input)?;
        let settings = load_settings(&self.config.config_path)?;
        let client = DocIntelligenceClient::from_settings(&settings)?;
        self.execute(input, output_dir, &stem, DOCINT_TAG, &client)
            .await
    }

    async fn execute(
        &self,
        input: &Path,
        output_dir: &Path,
        stem: &str,
        tag: &str,
        converter: &dyn DocumentConverter,
    ) -> Result<RunReport, BenchError> {
        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|source| BenchError::OutputWriteFailed {
                path: output_dir.to_path_buf(),
                source,
            })?;

        let log_path = output_dir.join(format!("{stem}_{tag}.log"));
        let markdown_path = output_dir.join(format!("{stem}.md"));
        let log = RunLog::create(&log_path, self.config.console_filter.as_deref())?;

        let monitor = ResourceMonitor::new(self.config.poll_interval());
        let include_children = self.config.include_child_processes;

        let run = async {
            info!("Processing file: {}", input.display());

            let session = monitor.start_process(include_children)?;
            let outcome = ConversionExecutor::new(converter).convert(input).await;
            let usage = session.finish();

            write_markdown(&markdown_path, outcome.markdown()).await?;
            info!("Wrote markdown: {}", markdown_path.display());

            Ok::<_, BenchError>((outcome, usage))
        };

        let (outcome, usage) = run.with_subscriber(log.dispatch().clone()).await?;

        Ok(RunReport {
            markdown_path,
            log_path,
            outcome,
            usage,
        })
    }
}

/// File stem used to name both outputs.
fn file_stem(input: &Path) -> Result<String, BenchError> {
    input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| BenchError::InvalidInput {
            path: input.to_path_buf(),
        })
}

/// Atomic write: temp file next to `path`, then rename over it.
async fn write_markdown(path: &Path, markdown: &str) -> Result<(), BenchError> {
    let tmp_path = path.with_extension("md.tmp");
    tokio::fs::write(&tmp_path, markdown)
        .await
        .map_err(|source| BenchError::OutputWriteFailed {
            path: path.to_path_buf(),
            source,
        })?;

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|source| BenchError::OutputWriteFailed {
            path: path.to_path_buf(),
            source,
        })
}
