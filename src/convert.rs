//! Conversion execution: drive one converter call and contain its failures.
//!
//! ## Why contain instead of propagate?
//!
//! Experiment runs are launched one document at a time by an outer driver
//! script. A malformed PDF or a crashing OCR backend must not turn into a
//! non-zero exit for the whole series; it should produce "no output" for that
//! document and a log record saying why. [`ConversionExecutor`] is the single
//! boundary where that happens: every error return *and* every panic from the
//! converter becomes [`ConversionOutcome::Failed`].
//!
//! ```text
//! Idle ──convert()──▶ Running ──Ok(text)──▶ Converted { markdown }
//!                        └──────Err / panic──▶ Failed { error }
//! ```

use crate::error::EngineError;
use async_trait::async_trait;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use tracing::{debug, error, info};

/// A document-to-Markdown conversion engine bound to one configuration.
///
/// Implementations perform exactly one blocking-in-spirit conversion per call.
/// They may fail in any way; the executor handles the consequences.
#[async_trait]
pub trait DocumentConverter: Send + Sync {
    /// Short engine name for log lines.
    fn name(&self) -> &str;

    /// Convert the PDF at `input` and return its Markdown export.
    async fn convert(&self, input: &Path) -> Result<String, EngineError>;
}

/// Result of one conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionOutcome {
    /// The engine produced Markdown (possibly empty for a blank document).
    Converted { markdown: String },
    /// The engine failed; no Markdown was produced.
    Failed { error: EngineError },
}

impl ConversionOutcome {
    /// Markdown to persist: the engine's text, or `""` on failure.
    pub fn markdown(&self) -> &str {
        match self {
            ConversionOutcome::Converted { markdown } => markdown,
            ConversionOutcome::Failed { .. } => "",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ConversionOutcome::Converted { .. })
    }

    pub fn error(&self) -> Option<&EngineError> {
        match self {
            ConversionOutcome::Converted { .. } => None,
            ConversionOutcome::Failed { error } => Some(error),
        }
    }
}

/// Runs a [`DocumentConverter`] and never lets its failures escape.
pub struct ConversionExecutor<'a> {
    converter: &'a dyn DocumentConverter,
}

impl<'a> ConversionExecutor<'a> {
    pub fn new(converter: &'a dyn DocumentConverter) -> Self {
        Self { converter }
    }

    /// Convert `input`. Failures are logged at ERROR with the input path and
    /// returned as [`ConversionOutcome::Failed`].
    pub async fn convert(&self, input: &Path) -> ConversionOutcome {
        debug!("Converting {} with {}", input.display(), self.converter.name());

        let result = AssertUnwindSafe(self.converter.convert(input))
            .catch_unwind()
            .await;

        match result {
            Ok(Ok(markdown)) => {
                info!(
                    "Converted {} ({} bytes of Markdown)",
                    input.display(),
                    markdown.len()
                );
                ConversionOutcome::Converted { markdown }
            }
            Ok(Err(e)) => {
                error!("Failed to convert source {}: {}", input.display(), e);
                ConversionOutcome::Failed { error: e }
            }
            Err(payload) => {
                let e = EngineError::Panicked {
                    detail: panic_message(payload.as_ref()),
                };
                error!("Failed to convert source {}: {}", input.display(), e);
                ConversionOutcome::Failed { error: e }
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
