//! Per-run log sink.
//!
//! Every run writes its own log file next to its Markdown output, so a series
//! of experiments leaves one self-contained record per document × accelerator.
//! [`RunLog`] is a `tracing` dispatcher scoped to a single run (via
//! `WithSubscriber` in the harness), not a process-global subscriber: a test
//! or an embedding program can run several harnesses without their log lines
//! crossing.
//!
//! ```text
//! 2026-10-19T09:14:02.118Z  INFO Processing file: test_cases/invoice.pdf
//! 2026-10-19T09:14:09.541Z  INFO Peak RSS: 812.44 MB
//! 2026-10-19T09:14:09.541Z  INFO Processing completed. Time taken: 7.42 seconds
//! 2026-10-19T09:14:09.543Z  INFO Wrote markdown: out/invoice.md
//! ```

use crate::error::BenchError;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::Dispatch;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter, Registry};

/// The tracing dispatcher for one run: an INFO-level file layer plus an
/// optional stderr echo.
#[derive(Clone)]
pub struct RunLog {
    path: PathBuf,
    dispatch: Dispatch,
}

impl RunLog {
    /// Create (or truncate) the log file at `path`.
    ///
    /// With `console_filter`, events passing that `EnvFilter` directive are
    /// also written to stderr.
    pub fn create(path: &Path, console_filter: Option<&str>) -> Result<Self, BenchError> {
        let file = File::create(path).map_err(|source| BenchError::LogSetupFailed {
            path: path.to_path_buf(),
            source,
        })?;

        let file_layer = fmt::layer()
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .with_target(false)
            .with_filter(LevelFilter::INFO);

        let console_layer = match console_filter {
            Some(directives) => {
                let filter = EnvFilter::try_new(directives).map_err(|e| {
                    BenchError::InvalidConfig(format!("console log filter '{directives}': {e}"))
                })?;
                Some(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(false)
                        .with_filter(filter),
                )
            }
            None => None,
        };

        let subscriber = Registry::default().with(file_layer).with(console_layer);

        Ok(Self {
            path: path.to_path_buf(),
            dispatch: Dispatch::new(subscriber),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }
}

impl std::fmt::Debug for RunLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunLog").field("path", &self.path).finish()
    }
}
