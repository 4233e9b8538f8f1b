//! Configuration types: the experiment settings file and the harness options.
//!
//! Two layers of configuration exist because they change at different rates:
//!
//! * [`ExperimentSettings`]: the JSON settings file shared by every run on a
//!   machine (model cache locations, language lists, thread count). Loaded once
//!   per run with [`load_settings`].
//! * [`HarnessConfig`]: how the harness itself behaves (where to find the
//!   settings file, how often to sample memory). Built via
//!   [`HarnessConfigBuilder`] from CLI flags.
//!
//! # Missing keys
//! Every backend-specific key is an `Option` in [`ExperimentSettings`] so one
//! settings file can serve runs that need different subsets of keys. Whatever
//! the selected backend needs is fetched through [`require`], which turns an
//! absent key into [`BenchError::MissingConfigKey`]. The only key with a
//! default is `force_full_page_ocr` (`false`).

use crate::error::BenchError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Default settings file, resolved against the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

/// Converter program used when `converter_command` is absent.
pub const DEFAULT_CONVERTER_PROGRAM: &str = "docling-convert";

/// Contents of the experiment settings file.
///
/// Unknown keys are ignored: the Document Intelligence run and the docling
/// runs read the same file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExperimentSettings {
    /// Threads given to the conversion engine's accelerator options.
    #[serde(default)]
    pub num_threads: Option<usize>,

    /// Run OCR on every page region instead of only on bitmap areas.
    /// Absent means `false`.
    #[serde(default)]
    pub force_full_page_ocr: Option<bool>,

    /// Tesseract data directory, exported to the engine as `TESSDATA_PREFIX`.
    #[serde(default)]
    pub tessdata_prefix: Option<PathBuf>,

    #[serde(default)]
    pub tesseract_lang: Option<Vec<String>>,

    #[serde(default)]
    pub easyocr_lang: Option<Vec<String>>,

    #[serde(default)]
    pub suryaocr_lang: Option<Vec<String>>,

    /// Root of the ModelScope cache holding the RapidOCR ONNX models.
    #[serde(default)]
    pub modelscope_model_cache_dir: Option<PathBuf>,

    #[serde(default)]
    pub rapidocr_det_model_rel_path: Option<PathBuf>,

    #[serde(default)]
    pub rapidocr_rec_model_rel_path: Option<PathBuf>,

    #[serde(default)]
    pub rapidocr_cls_model_rel_path: Option<PathBuf>,

    /// Program plus leading arguments implementing the converter protocol.
    /// Default: `["docling-convert"]`.
    #[serde(default)]
    pub converter_command: Option<Vec<String>>,

    #[serde(default)]
    pub document_intelligence_endpoint: Option<String>,

    #[serde(default)]
    pub document_intelligence_key: Option<String>,
}

impl ExperimentSettings {
    /// The full-page OCR flag with its single canonical fallback.
    pub fn force_full_page_ocr(&self) -> bool {
        self.force_full_page_ocr.unwrap_or(false)
    }

    /// Thread count for the accelerator options; must be at least 1.
    pub fn num_threads(&self) -> Result<usize, BenchError> {
        let n = *require(&self.num_threads, "num_threads")?;
        if n == 0 {
            return Err(BenchError::InvalidConfig(
                "num_threads must be ≥ 1".into(),
            ));
        }
        Ok(n)
    }

    /// Converter program and its leading arguments.
    pub fn converter_command(&self) -> Result<(String, Vec<String>), BenchError> {
        match self.converter_command.as_deref() {
            None => Ok((DEFAULT_CONVERTER_PROGRAM.to_string(), Vec::new())),
            Some([]) => Err(BenchError::InvalidConfig(
                "converter_command must name a program".into(),
            )),
            Some([program, args @ ..]) => Ok((program.clone(), args.to_vec())),
        }
    }
}

/// Fetch a key the current run cannot do without.
pub fn require<'a, T>(value: &'a Option<T>, key: &'static str) -> Result<&'a T, BenchError> {
    value.as_ref().ok_or(BenchError::MissingConfigKey { key })
}

/// Load the settings file.
///
/// # Errors
/// - [`BenchError::ConfigNotFound`] when nothing exists at `path`
/// - [`BenchError::ConfigUnreadable`] for other I/O failures
/// - [`BenchError::ConfigParse`] for malformed JSON or mistyped values
pub fn load_settings(path: &Path) -> Result<ExperimentSettings, BenchError> {
    let raw = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => BenchError::ConfigNotFound {
            path: path.to_path_buf(),
        },
        _ => BenchError::ConfigUnreadable {
            path: path.to_path_buf(),
            source: e,
        },
    })?;

    let settings: ExperimentSettings =
        serde_json::from_str(&raw).map_err(|e| BenchError::ConfigParse {
            path: path.to_path_buf(),
            source: e,
        })?;

    debug!("Loaded settings from {}", path.display());
    Ok(settings)
}

// ── Harness options ──────────────────────────────────────────────────────

/// How the [`crate::harness::RunHarness`] behaves.
///
/// Built via [`HarnessConfig::builder()`] or [`HarnessConfig::default()`].
///
/// # Example
/// ```rust
/// use pdf2md_bench::HarnessConfig;
///
/// let config = HarnessConfig::builder()
///     .config_path("experiments/config.json")
///     .poll_interval_ms(25)
///     .build()
///     .unwrap();
/// assert_eq!(config.poll_interval().as_millis(), 25);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    /// Settings file location. Default: `config.json`.
    pub config_path: PathBuf,

    /// Memory sampling period in milliseconds. Range: 1–1000. Default: 10.
    ///
    /// Smaller values tighten the peak estimate at the cost of more wake-ups.
    /// The true instantaneous peak can still fall between two samples.
    pub poll_interval_ms: u64,

    /// Add the RSS of child processes to the sampled figure. Default: true.
    ///
    /// The docling adapter runs the engine as a child process, so without this
    /// the peak would only reflect the harness itself.
    pub include_child_processes: bool,

    /// Echo each run's log events to stderr with this filter. Default: None.
    pub console_filter: Option<String>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from(DEFAULT_CONFIG_PATH),
            poll_interval_ms: 10,
            include_child_processes: true,
            console_filter: None,
        }
    }
}

impl HarnessConfig {
    /// Create a new builder for `HarnessConfig`.
    pub fn builder() -> HarnessConfigBuilder {
        HarnessConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Builder for [`HarnessConfig`].
#[derive(Debug)]
pub struct HarnessConfigBuilder {
    config: HarnessConfig,
}

impl HarnessConfigBuilder {
    pub fn config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.config_path = path.into();
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms.clamp(1, 1000);
        self
    }

    pub fn include_child_processes(mut self, v: bool) -> Self {
        self.config.include_child_processes = v;
        self
    }

    pub fn console_filter(mut self, filter: impl Into<String>) -> Self {
        self.config.console_filter = Some(filter.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<HarnessConfig, BenchError> {
        let c = &self.config;
        if c.poll_interval_ms == 0 || c.poll_interval_ms > 1000 {
            return Err(BenchError::InvalidConfig(format!(
                "poll interval must be 1–1000 ms, got {}",
                c.poll_interval_ms
            )));
        }
        if c.config_path.as_os_str().is_empty() {
            return Err(BenchError::InvalidConfig(
                "config path must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_settings(json: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().expect("tempfile");
        f.write_all(json.as_bytes()).expect("write");
        f
    }

    #[test]
    fn load_missing_file_is_config_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        match load_settings(&path) {
            Err(BenchError::ConfigNotFound { path: p }) => assert_eq!(p, path),
            other => panic!("expected ConfigNotFound, got {other:?}"),
        }
    }

    #[test]
    fn load_malformed_json_is_parse_error() {
        let f = write_settings("{ \"num_threads\": ");
        assert!(matches!(
            load_settings(f.path()),
            Err(BenchError::ConfigParse { .. })
        ));
    }

    #[test]
    fn load_mistyped_value_is_parse_error() {
        let f = write_settings(r#"{ "num_threads": "ten" }"#);
        assert!(matches!(
            load_settings(f.path()),
            Err(BenchError::ConfigParse { .. })
        ));
    }

    #[test]
    fn load_ignores_unknown_keys() {
        let f = write_settings(r#"{ "num_threads": 4, "some_future_key": [1, 2] }"#);
        let s = load_settings(f.path()).expect("load");
        assert_eq!(s.num_threads, Some(4));
    }

    #[test]
    fn full_page_ocr_defaults_to_false() {
        let s = ExperimentSettings::default();
        assert!(!s.force_full_page_ocr());

        let s = ExperimentSettings {
            force_full_page_ocr: Some(true),
            ..Default::default()
        };
        assert!(s.force_full_page_ocr());
    }

    #[test]
    fn num_threads_missing_or_zero() {
        let s = ExperimentSettings::default();
        assert!(matches!(
            s.num_threads(),
            Err(BenchError::MissingConfigKey { key: "num_threads" })
        ));

        let s = ExperimentSettings {
            num_threads: Some(0),
            ..Default::default()
        };
        assert!(matches!(s.num_threads(), Err(BenchError::InvalidConfig(_))));
    }

    #[test]
    fn converter_command_default_and_override() {
        let s = ExperimentSettings::default();
        let (program, args) = s.converter_command().unwrap();
        assert_eq!(program, DEFAULT_CONVERTER_PROGRAM);
        assert!(args.is_empty());

        let s = ExperimentSettings {
            converter_command: Some(vec!["python".into(), "convert.py".into()]),
            ..Default::default()
        };
        let (program, args) = s.converter_command().unwrap();
        assert_eq!(program, "python");
        assert_eq!(args, vec!["convert.py".to_string()]);

        let s = ExperimentSettings {
            converter_command: Some(vec![]),
            ..Default::default()
        };
        assert!(s.converter_command().is_err());
    }

    #[test]
    fn builder_defaults_and_clamping() {
        let c = HarnessConfig::builder().build().unwrap();
        assert_eq!(c.poll_interval_ms, 10);
        assert_eq!(c.config_path, PathBuf::from("config.json"));
        assert!(c.include_child_processes);

        let c = HarnessConfig::builder().poll_interval_ms(0).build().unwrap();
        assert_eq!(c.poll_interval_ms, 1);
        let c = HarnessConfig::builder()
            .poll_interval_ms(60_000)
            .build()
            .unwrap();
        assert_eq!(c.poll_interval_ms, 1000);
    }

    #[test]
    fn builder_rejects_empty_config_path() {
        assert!(HarnessConfig::builder().config_path("").build().is_err());
    }
}
