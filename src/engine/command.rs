//! Child-process adapter for the document-conversion engine.
//!
//! ## Protocol
//!
//! ```text
//! argv   = <program> <args…> <input.pdf>
//! stdin  = PipelineConfig as JSON (closed after writing)
//! stdout = Markdown export of the converted document
//! exit 0 = success; anything else is a conversion failure
//! ```
//!
//! The program and its leading arguments come from the `converter_command`
//! settings key. A thin wrapper around the engine's Python API implements the
//! other side.
//!
//! ## Environment
//!
//! Tesseract locates its language data through `TESSDATA_PREFIX`. The data
//! directory travels inside the tesseract options and is exported to the child
//! only, and only when the operator has not already set the variable. The
//! harness's own environment is never modified.

use crate::config::ExperimentSettings;
use crate::convert::DocumentConverter;
use crate::error::{BenchError, EngineError};
use crate::ocr::OcrOptions;
use crate::pipeline::PipelineConfig;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Environment variable tesseract reads its data directory from.
pub const TESSDATA_ENV: &str = "TESSDATA_PREFIX";

/// Keep only this much of the child's stderr in error values.
const STDERR_TAIL_BYTES: usize = 2000;

/// Runs the conversion engine as a child process bound to one pipeline
/// configuration.
#[derive(Debug, Clone)]
pub struct CommandConverter {
    program: String,
    args: Vec<String>,
    pipeline_json: String,
    env: Vec<(OsString, OsString)>,
}

impl CommandConverter {
    /// Bind the configured converter command to `pipeline`.
    pub fn from_settings(
        settings: &ExperimentSettings,
        pipeline: &PipelineConfig,
    ) -> Result<Self, BenchError> {
        let (program, args) = settings.converter_command()?;
        Self::new(program, args, pipeline)
    }

    pub fn new(
        program: impl Into<String>,
        args: Vec<String>,
        pipeline: &PipelineConfig,
    ) -> Result<Self, BenchError> {
        let env = child_env(pipeline, |key| std::env::var_os(key).is_some());
        Ok(Self {
            program: program.into(),
            args,
            pipeline_json: pipeline.to_json()?,
            env,
        })
    }

    /// Variables exported to the child in addition to the inherited ones.
    pub fn extra_env(&self) -> &[(OsString, OsString)] {
        &self.env
    }
}

/// Environment defaults the engine needs for `pipeline`, skipping any the
/// operator already set (`is_set` answers for the current environment).
pub fn child_env(
    pipeline: &PipelineConfig,
    is_set: impl Fn(&str) -> bool,
) -> Vec<(OsString, OsString)> {
    let mut env = Vec::new();
    if let OcrOptions::Tesseract(opts) = pipeline.ocr_options() {
        match &opts.data_dir {
            Some(dir) if !is_set(TESSDATA_ENV) => {
                env.push((OsString::from(TESSDATA_ENV), dir.clone().into_os_string()));
            }
            Some(_) => debug!("{} already set; keeping the operator's value", TESSDATA_ENV),
            None => {}
        }
    }
    env
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.len() <= STDERR_TAIL_BYTES {
        return text.to_string();
    }
    let mut start = text.len() - STDERR_TAIL_BYTES;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("…{}", &text[start..])
}

#[async_trait]
impl DocumentConverter for CommandConverter {
    fn name(&self) -> &str {
        &self.program
    }

    async fn convert(&self, input: &Path) -> Result<String, EngineError> {
        info!("Launching {} for {}", self.program, input.display());

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(input)
            .envs(self.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| EngineError::Launch {
            program: self.program.clone(),
            detail: e.to_string(),
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            // A converter that ignores its stdin may exit before reading it;
            // the exit status decides the outcome in that case.
            if let Err(e) = stdin.write_all(self.pipeline_json.as_bytes()).await {
                warn!("Could not write pipeline config to {}: {}", self.program, e);
            }
            // Dropping stdin closes the pipe so the child sees EOF.
        }

        let output = child.wait_with_output().await.map_err(|e| EngineError::Io {
            path: input.to_path_buf(),
            detail: format!("waiting for {}: {e}", self.program),
        })?;

        if !output.status.success() {
            return Err(EngineError::ExitStatus {
                program: self.program.clone(),
                code: output.status.code(),
                stderr: stderr_tail(&output.stderr),
            });
        }

        if !output.stderr.is_empty() {
            debug!("{} stderr: {}", self.program, stderr_tail(&output.stderr));
        }

        String::from_utf8(output.stdout).map_err(|e| EngineError::InvalidOutput {
            detail: format!("stdout is not UTF-8: {e}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineConfigBuilder;
    use std::path::PathBuf;

    fn settings() -> ExperimentSettings {
        ExperimentSettings {
            num_threads: Some(2),
            tessdata_prefix: Some(PathBuf::from("/opt/tessdata")),
            tesseract_lang: Some(vec!["eng".into()]),
            easyocr_lang: Some(vec!["en".into()]),
            ..Default::default()
        }
    }

    fn pipeline(backend: &str) -> PipelineConfig {
        PipelineConfigBuilder::new(&settings())
            .build(backend, "cpu")
            .unwrap()
    }

    #[test]
    fn tessdata_default_applies_when_unset() {
        let env = child_env(&pipeline("tesseract"), |_| false);
        assert_eq!(
            env,
            vec![(OsString::from(TESSDATA_ENV), OsString::from("/opt/tessdata"))]
        );
    }

    #[test]
    fn tessdata_never_overrides_operator_value() {
        let env = child_env(&pipeline("tesseract"), |key| key == TESSDATA_ENV);
        assert!(env.is_empty());
    }

    #[test]
    fn other_backends_get_no_tessdata() {
        assert!(child_env(&pipeline("easyocr"), |_| false).is_empty());
    }

    #[test]
    fn stderr_tail_truncates_long_output() {
        let long = "é".repeat(STDERR_TAIL_BYTES);
        let tail = stderr_tail(long.as_bytes());
        assert!(tail.starts_with('…'));
        assert!(tail.len() <= STDERR_TAIL_BYTES + '…'.len_utf8());
        assert_eq!(stderr_tail(b"  short  \n"), "short");
    }

    #[tokio::test]
    async fn missing_program_is_launch_error() {
        let conv = CommandConverter::new(
            "/definitely/not/a/converter",
            vec![],
            &pipeline("easyocr"),
        )
        .unwrap();
        let err = conv.convert(Path::new("sample.pdf")).await.unwrap_err();
        assert!(matches!(err, EngineError::Launch { .. }), "got {err:?}");
    }

    #[cfg(unix)]
    fn sh(script: &str) -> CommandConverter {
        CommandConverter::new(
            "sh",
            vec!["-c".into(), script.into()],
            &pipeline("tesseract"),
        )
        .unwrap()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stdout_is_returned_as_markdown() {
        // `sh -c script <input>` binds the input path to $0.
        let conv = sh(r#"cat > /dev/null; printf '# %s\n' "$(basename "$0")""#);
        let md = conv.convert(Path::new("/tmp/sample.pdf")).await.unwrap();
        assert_eq!(md, "# sample.pdf\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn pipeline_json_arrives_on_stdin() {
        let conv = sh("cat");
        let echoed = conv.convert(Path::new("sample.pdf")).await.unwrap();
        let v: serde_json::Value = serde_json::from_str(&echoed).unwrap();
        assert_eq!(v["ocr_options"]["kind"], "tesseract");
        assert_eq!(v["accelerator_options"]["num_threads"], 2);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_exit_status_error() {
        let conv = sh("cat > /dev/null; echo 'model file missing' >&2; exit 3");
        match conv.convert(Path::new("sample.pdf")).await {
            Err(EngineError::ExitStatus { code, stderr, .. }) => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "model file missing");
            }
            other => panic!("expected ExitStatus, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_utf8_stdout_is_invalid_output() {
        let conv = sh(r#"cat > /dev/null; printf '\377\376'"#);
        assert!(matches!(
            conv.convert(Path::new("sample.pdf")).await,
            Err(EngineError::InvalidOutput { .. })
        ));
    }
}
