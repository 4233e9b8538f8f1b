//! Pipeline configuration: OCR options + accelerator options + fixed flags.
//!
//! A [`PipelineConfig`] is built once per run by [`PipelineConfigBuilder`],
//! never mutated afterwards, and handed to exactly one converter. It
//! serialises to the JSON layout of the conversion engine's PDF pipeline
//! options, which is what the command adapter writes to the engine's stdin.
//!
//! ```text
//! settings ──▶ OcrBackendRegistry ──▶ OcrOptions ─┐
//!          └─▶ num_threads + device ──────────────┼─▶ PipelineConfig
//!              fixed flags (ocr, tables, plugins) ┘
//! ```

use crate::config::ExperimentSettings;
use crate::error::BenchError;
use crate::ocr::{OcrBackend, OcrBackendRegistry, OcrOptions};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Compute device used for layout and OCR inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AcceleratorDevice {
    Cpu,
    /// Apple GPU through Metal Performance Shaders.
    Mps,
    Cuda,
}

impl AcceleratorDevice {
    pub const ALL: [AcceleratorDevice; 3] = [
        AcceleratorDevice::Cpu,
        AcceleratorDevice::Mps,
        AcceleratorDevice::Cuda,
    ];

    /// Canonical identifier; also names the run's log file.
    pub fn as_str(&self) -> &'static str {
        match self {
            AcceleratorDevice::Cpu => "cpu",
            AcceleratorDevice::Mps => "mps",
            AcceleratorDevice::Cuda => "cuda",
        }
    }
}

impl fmt::Display for AcceleratorDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AcceleratorDevice {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" => Ok(AcceleratorDevice::Cpu),
            "mps" | "metal" | "gpu-metal" => Ok(AcceleratorDevice::Mps),
            "cuda" => Ok(AcceleratorDevice::Cuda),
            _ => Err(BenchError::InvalidAccelerator { id: s.to_string() }),
        }
    }
}

/// Accelerator options passed to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceleratorOptions {
    pub num_threads: usize,
    pub device: AcceleratorDevice,
}

/// The immutable configuration for one conversion.
///
/// Fields are private; the only way to obtain one is
/// [`PipelineConfigBuilder::build`], which sets the fixed flags. It is only
/// ever serialised, for the engine; there is no way back from JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineConfig {
    do_ocr: bool,
    do_table_structure: bool,
    allow_external_plugins: bool,
    ocr_options: OcrOptions,
    accelerator_options: AcceleratorOptions,
    /// Engine selector for plugin-provided OCR engines.
    #[serde(skip_serializing_if = "Option::is_none")]
    ocr_model: Option<String>,
}

impl PipelineConfig {
    pub fn backend(&self) -> OcrBackend {
        self.ocr_options.backend()
    }

    pub fn ocr_options(&self) -> &OcrOptions {
        &self.ocr_options
    }

    pub fn accelerator(&self) -> AcceleratorOptions {
        self.accelerator_options
    }

    pub fn do_ocr(&self) -> bool {
        self.do_ocr
    }

    pub fn do_table_structure(&self) -> bool {
        self.do_table_structure
    }

    pub fn allow_external_plugins(&self) -> bool {
        self.allow_external_plugins
    }

    pub fn ocr_model(&self) -> Option<&str> {
        self.ocr_model.as_deref()
    }

    /// JSON document in the engine's pipeline-options layout.
    pub fn to_json(&self) -> Result<String, BenchError> {
        serde_json::to_string(self)
            .map_err(|e| BenchError::Internal(format!("pipeline config serialisation: {e}")))
    }
}

/// Builds [`PipelineConfig`] values from the settings file.
#[derive(Debug, Clone, Copy)]
pub struct PipelineConfigBuilder<'a> {
    settings: &'a ExperimentSettings,
}

impl<'a> PipelineConfigBuilder<'a> {
    pub fn new(settings: &'a ExperimentSettings) -> Self {
        Self { settings }
    }

    /// Build from raw identifiers, e.g. `build("suryaocr", "mps")`.
    ///
    /// Backend/device compatibility is not checked here; the engine rejects
    /// combinations it cannot run.
    pub fn build(
        &self,
        ocr_backend_id: &str,
        accelerator_device: &str,
    ) -> Result<PipelineConfig, BenchError> {
        let backend: OcrBackend = ocr_backend_id.parse()?;
        let device: AcceleratorDevice = accelerator_device.parse()?;
        self.build_for(backend, device)
    }

    /// Build from already-parsed selections.
    pub fn build_for(
        &self,
        backend: OcrBackend,
        device: AcceleratorDevice,
    ) -> Result<PipelineConfig, BenchError> {
        let ocr_options = OcrBackendRegistry::new(self.settings).resolve_backend(backend)?;
        let accelerator_options = AcceleratorOptions {
            num_threads: self.settings.num_threads()?,
            device,
        };

        // The engine's plugin loader cannot tell which OCR engine is active
        // from the options alone; surya needs the selector spelled out.
        let ocr_model = match ocr_options.backend() {
            OcrBackend::SuryaOcr => Some(OcrBackend::SuryaOcr.as_str().to_string()),
            _ => None,
        };

        Ok(PipelineConfig {
            do_ocr: true,
            do_table_structure: true,
            allow_external_plugins: true,
            ocr_options,
            accelerator_options,
            ocr_model,
        })
    }
}
