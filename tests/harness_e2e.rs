//! End-to-end tests for the run harness.
//!
//! Converters are stubs (or `sh` scripts speaking the engine protocol), so
//! these run without the conversion engine installed. Each test gets its own
//! temp directory holding the settings file and the output directory.

use async_trait::async_trait;
use pdf2md_bench::{
    BenchError, DocumentConverter, EngineError, HarnessConfig, OcrBackend, PipelineConfig,
    RunHarness, RunRequest,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// ── Test helpers ─────────────────────────────────────────────────────────────

const SETTINGS: &str = r#"{
    "num_threads": 4,
    "force_full_page_ocr": true,
    "tessdata_prefix": "/usr/share/tesseract-ocr/5/tessdata",
    "tesseract_lang": ["fra", "deu", "spa", "eng"],
    "easyocr_lang": ["en"],
    "suryaocr_lang": ["en"],
    "modelscope_model_cache_dir": "/models",
    "rapidocr_det_model_rel_path": "det.onnx",
    "rapidocr_rec_model_rel_path": "rec.onnx",
    "rapidocr_cls_model_rel_path": "cls.onnx"
}"#;

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        Self::with_settings(SETTINGS)
    }

    fn with_settings(json: &str) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("config.json"), json).expect("write settings");
        Self { dir }
    }

    fn config_path(&self) -> PathBuf {
        self.dir.path().join("config.json")
    }

    fn out(&self) -> PathBuf {
        self.dir.path().join("out")
    }

    fn harness(&self) -> RunHarness {
        RunHarness::new(
            HarnessConfig::builder()
                .config_path(self.config_path())
                .poll_interval_ms(2)
                .build()
                .expect("harness config"),
        )
    }

    fn request(&self, backend: &str, device: &str) -> RunRequest {
        RunRequest::new("sample.pdf", self.out(), backend, device)
    }
}

fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap_or_else(|e| panic!("read {}: {e}", path.display()))
}

enum Reply {
    Markdown(&'static str),
    Error,
}

struct StubConverter {
    reply: Reply,
}

#[async_trait]
impl DocumentConverter for StubConverter {
    fn name(&self) -> &str {
        "stub"
    }

    async fn convert(&self, input: &Path) -> Result<String, EngineError> {
        match self.reply {
            Reply::Markdown(text) => Ok(text.to_string()),
            Reply::Error => Err(EngineError::InvalidOutput {
                detail: format!("cannot parse {}", input.display()),
            }),
        }
    }
}

fn stub(
    reply: Reply,
) -> impl FnOnce(
    PipelineConfig,
    &pdf2md_bench::ExperimentSettings,
) -> Result<Box<dyn DocumentConverter>, BenchError> {
    move |_, _| Ok(Box::new(StubConverter { reply }) as Box<dyn DocumentConverter>)
}

// ── Scenarios ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn successful_run_writes_markdown_and_measurements() {
    let fx = Fixture::new();
    let report = fx
        .harness()
        .run_with(
            &fx.request("tesseract", "cpu"),
            stub(Reply::Markdown("# Title\n\nBody.")),
        )
        .await
        .expect("run");

    assert!(report.outcome.is_success());
    assert_eq!(report.markdown_path, fx.out().join("sample.md"));
    assert_eq!(report.log_path, fx.out().join("sample_cpu.log"));
    assert_eq!(read(&report.markdown_path), "# Title\n\nBody.");
    assert!(report.usage.peak_rss_bytes > 0);

    let log = read(&report.log_path);
    assert!(log.contains("Processing file: sample.pdf"), "{log}");
    assert!(log.contains("Peak RSS: "), "{log}");
    assert!(log.contains(" MB"), "{log}");
    assert!(log.contains("Processing completed. Time taken: "), "{log}");
    assert!(log.contains("Wrote markdown: "), "{log}");
}

#[tokio::test]
async fn failed_conversion_leaves_empty_markdown_and_logged_error() {
    let fx = Fixture::new();
    let report = fx
        .harness()
        .run_with(&fx.request("tesseract", "cpu"), stub(Reply::Error))
        .await
        .expect("contained failure is not fatal");

    assert!(!report.outcome.is_success());
    assert!(report.markdown_path.exists());
    assert_eq!(read(&report.markdown_path), "");

    let log = read(&report.log_path);
    assert!(log.contains("ERROR"), "{log}");
    assert!(log.contains("Failed to convert source sample.pdf"), "{log}");
    assert!(log.contains("Peak RSS: "), "{log}");
    assert!(log.contains("Processing completed. Time taken: "), "{log}");
}

#[tokio::test]
async fn unknown_backend_aborts_before_any_output() {
    let fx = Fixture::new();
    let err = fx
        .harness()
        .run_with(
            &fx.request("unknown-engine", "cpu"),
            stub(Reply::Markdown("never")),
        )
        .await
        .unwrap_err();

    assert!(
        matches!(&err, BenchError::InvalidBackend { id } if id == "unknown-engine"),
        "got {err:?}"
    );
    assert!(!fx.out().join("sample.md").exists());
    assert!(!fx.out().exists());
}

#[tokio::test]
async fn missing_settings_file_names_the_path() {
    let fx = Fixture::new();
    std::fs::remove_file(fx.config_path()).expect("remove settings");

    let err = fx
        .harness()
        .run_with(&fx.request("tesseract", "cpu"), stub(Reply::Markdown("never")))
        .await
        .unwrap_err();

    match &err {
        BenchError::ConfigNotFound { path } => assert_eq!(path, &fx.config_path()),
        other => panic!("expected ConfigNotFound, got {other:?}"),
    }
    assert!(err.to_string().contains("config.json"), "{err}");
    assert!(!fx.out().exists());
}

// ── Configuration edge cases ─────────────────────────────────────────────────

#[tokio::test]
async fn unknown_accelerator_aborts_before_any_output() {
    let fx = Fixture::new();
    let err = fx
        .harness()
        .run_with(&fx.request("easyocr", "tpu"), stub(Reply::Markdown("never")))
        .await
        .unwrap_err();

    assert!(matches!(err, BenchError::InvalidAccelerator { .. }), "got {err:?}");
    assert!(!fx.out().exists());
}

#[tokio::test]
async fn missing_backend_key_is_fatal_and_named() {
    let fx = Fixture::with_settings(r#"{"num_threads": 2, "easyocr_lang": ["en"]}"#);
    let err = fx
        .harness()
        .run_with(&fx.request("suryaocr", "mps"), stub(Reply::Markdown("never")))
        .await
        .unwrap_err();

    assert!(
        matches!(err, BenchError::MissingConfigKey { key: "suryaocr_lang" }),
        "got {err:?}"
    );
    assert!(!fx.out().exists());
}

#[tokio::test]
async fn converter_receives_requested_pipeline() {
    let fx = Fixture::new();
    let seen: Arc<Mutex<Option<PipelineConfig>>> = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&seen);

    let report = fx
        .harness()
        .run_with(&fx.request("RapidOCR", "cuda"), move |pipeline, _| {
            *sink.lock().unwrap() = Some(pipeline);
            Ok(Box::new(StubConverter {
                reply: Reply::Markdown("ok"),
            }) as Box<dyn DocumentConverter>)
        })
        .await
        .expect("run");

    let pipeline = seen.lock().unwrap().take().expect("bind was called");
    assert_eq!(pipeline.backend(), OcrBackend::RapidOcr);
    assert_eq!(pipeline.accelerator().num_threads, 4);
    assert!(pipeline.ocr_options().force_full_page_ocr());
    assert_eq!(report.log_path, fx.out().join("sample_cuda.log"));
}

#[tokio::test]
async fn accelerator_alias_uses_canonical_log_name() {
    let fx = Fixture::new();
    let report = fx
        .harness()
        .run_with(&fx.request("tesseract", "gpu-metal"), stub(Reply::Markdown("ok")))
        .await
        .expect("run");

    assert_eq!(report.log_path, fx.out().join("sample_mps.log"));
    assert!(report.log_path.exists());
    assert!(!fx.out().join("sample_gpu-metal.log").exists());
}

#[tokio::test]
async fn rerun_overwrites_previous_outputs() {
    let fx = Fixture::new();
    let harness = fx.harness();
    let request = fx.request("easyocr", "cpu");

    harness
        .run_with(&request, stub(Reply::Markdown("first")))
        .await
        .expect("first run");
    let report = harness
        .run_with(&request, stub(Reply::Markdown("second")))
        .await
        .expect("second run");

    assert_eq!(read(&report.markdown_path), "second");
    assert_eq!(read(&report.log_path).matches("Processing file:").count(), 1);
}

// ── Child-process engine ─────────────────────────────────────────────────────

#[cfg(unix)]
#[tokio::test]
async fn command_engine_runs_through_harness() {
    let settings = SETTINGS.replacen(
        "\"num_threads\": 4,",
        r#""num_threads": 4,
    "converter_command": ["sh", "-c", "cat > /dev/null; printf '# %s\\n' \"$(basename \"$0\")\""],"#,
        1,
    );
    let fx = Fixture::with_settings(&settings);

    let report = fx
        .harness()
        .run(&fx.request("tesseract", "cpu"))
        .await
        .expect("run");

    assert!(report.outcome.is_success(), "{:?}", report.outcome.error());
    assert_eq!(read(&report.markdown_path), "# sample.pdf\n");
}

#[cfg(unix)]
#[tokio::test]
async fn failing_command_engine_is_contained() {
    let settings = SETTINGS.replacen(
        "\"num_threads\": 4,",
        r#""num_threads": 4,
    "converter_command": ["sh", "-c", "cat > /dev/null; echo 'no models' >&2; exit 2"],"#,
        1,
    );
    let fx = Fixture::with_settings(&settings);

    let report = fx
        .harness()
        .run(&fx.request("easyocr", "cpu"))
        .await
        .expect("contained failure is not fatal");

    assert!(matches!(
        report.outcome.error(),
        Some(EngineError::ExitStatus { code: Some(2), .. })
    ));
    assert_eq!(read(&report.markdown_path), "");
    assert!(read(&report.log_path).contains("no models"));
}
