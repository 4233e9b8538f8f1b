//! Error types for the pdf2md-bench library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`BenchError`]: **Fatal**: the run cannot proceed at all (settings file
//!   missing, unknown OCR backend, output directory not writable). Returned as
//!   `Err(BenchError)` from the [`crate::harness::RunHarness`] entry points and
//!   turned into a non-zero exit code by the binaries.
//!
//! * [`EngineError`]: **Non-fatal**: the conversion engine failed on this
//!   document (malformed PDF, engine crash, missing model files, service
//!   rejected the request). Stored inside
//!   [`crate::convert::ConversionOutcome::Failed`] so one bad document never
//!   aborts a series of independent experiment invocations.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pdf2md-bench library.
///
/// Conversion failures use [`EngineError`] and are contained by
/// [`crate::convert::ConversionExecutor`] rather than propagated here.
#[derive(Debug, Error)]
pub enum BenchError {
    // ── Settings errors ───────────────────────────────────────────────────
    /// The settings file does not exist.
    #[error("Config file not found: '{path}'\nPass --config <PATH> or create config.json in the working directory.")]
    ConfigNotFound { path: PathBuf },

    /// The settings file exists but could not be read.
    #[error("Failed to read config file '{path}': {source}")]
    ConfigUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The settings file is not valid JSON or has a wrongly-typed value.
    #[error("Config file '{path}' is not valid: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A key required by the selected backend or the pipeline is absent.
    #[error("Config key '{key}' is required for this run but missing from the config file")]
    MissingConfigKey { key: &'static str },

    /// A settings value or harness option is out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Selection errors ──────────────────────────────────────────────────
    /// OCR backend identifier outside the closed set.
    #[error("Unknown OCR backend '{id}'\nSupported: tesseract, easyocr, rapidocr, suryaocr")]
    InvalidBackend { id: String },

    /// Accelerator identifier outside the closed set.
    #[error("Unknown accelerator device '{id}'\nSupported: cpu, mps, cuda")]
    InvalidAccelerator { id: String },

    /// The input path has no file name to derive output names from.
    #[error("Input path '{path}' has no file name")]
    InvalidInput { path: PathBuf },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create the output directory or write the Markdown file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not create the per-run log file.
    #[error("Failed to create log file '{path}': {source}")]
    LogSetupFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal failure of one conversion.
///
/// Carried in [`crate::convert::ConversionOutcome::Failed`]; the harness still
/// writes an (empty) Markdown file and closes out the run's log.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum EngineError {
    /// The converter program could not be started.
    #[error("Failed to launch '{program}': {detail}")]
    Launch { program: String, detail: String },

    /// The converter program exited unsuccessfully.
    #[error("'{program}' exited with {}: {stderr}", describe_exit(.code))]
    ExitStatus {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    /// The engine produced output that is not Markdown text.
    #[error("Engine output is invalid: {detail}")]
    InvalidOutput { detail: String },

    /// Reading the input or talking to the child process failed.
    #[error("I/O error on '{path}': {detail}")]
    Io { path: PathBuf, detail: String },

    /// HTTP transport failure talking to a remote service.
    #[error("HTTP request failed: {detail}")]
    Http { detail: String },

    /// A remote service answered but reported a failure.
    #[error("Service returned {status}: {detail}")]
    ServiceFailed { status: String, detail: String },

    /// The converter panicked.
    #[error("Converter panicked: {detail}")]
    Panicked { detail: String },
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("status {c}"),
        None => "a signal".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_not_found_names_path() {
        let e = BenchError::ConfigNotFound {
            path: PathBuf::from("/etc/bench/config.json"),
        };
        assert!(e.to_string().contains("/etc/bench/config.json"));
    }

    #[test]
    fn missing_key_display() {
        let e = BenchError::MissingConfigKey { key: "num_threads" };
        assert!(e.to_string().contains("num_threads"));
    }

    #[test]
    fn invalid_backend_lists_choices() {
        let e = BenchError::InvalidBackend {
            id: "unknown-engine".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("unknown-engine"), "got: {msg}");
        assert!(msg.contains("rapidocr"), "got: {msg}");
    }

    #[test]
    fn exit_status_display_with_code() {
        let e = EngineError::ExitStatus {
            program: "docling-convert".into(),
            code: Some(2),
            stderr: "model not found".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("status 2"), "got: {msg}");
        assert!(msg.contains("model not found"), "got: {msg}");
    }

    #[test]
    fn exit_status_display_killed_by_signal() {
        let e = EngineError::ExitStatus {
            program: "docling-convert".into(),
            code: None,
            stderr: String::new(),
        };
        assert!(e.to_string().contains("a signal"));
    }

    #[test]
    fn engine_error_serialises() {
        let e = EngineError::Http {
            detail: "connection reset".into(),
        };
        let json = serde_json::to_string(&e).expect("serialise");
        assert!(json.contains("connection reset"));
    }
}
