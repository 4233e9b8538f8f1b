//! OCR backend selection and option resolution.
//!
//! Four OCR engines can be plugged into the conversion engine. Exactly one is
//! active per run. [`OcrBackendRegistry`] turns a backend identifier plus the
//! settings file into a fully-populated [`OcrOptions`] value.
//!
//! [`OcrOptions`] is a tagged enum: the variant *is* the backend identity, so
//! nothing downstream needs to guess which engine is active from the shape of
//! the options. This matters for surya, which the engine only loads through its
//! plugin mechanism (see [`crate::pipeline`]).
//!
//! Resolution is pure: model paths are joined but never checked for
//! existence. The conversion engine reports missing files when it loads them.

use crate::config::{require, ExperimentSettings};
use crate::error::BenchError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// The closed set of OCR engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcrBackend {
    Tesseract,
    EasyOcr,
    RapidOcr,
    SuryaOcr,
}

impl OcrBackend {
    pub const ALL: [OcrBackend; 4] = [
        OcrBackend::Tesseract,
        OcrBackend::EasyOcr,
        OcrBackend::RapidOcr,
        OcrBackend::SuryaOcr,
    ];

    /// Canonical identifier, as accepted on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            OcrBackend::Tesseract => "tesseract",
            OcrBackend::EasyOcr => "easyocr",
            OcrBackend::RapidOcr => "rapidocr",
            OcrBackend::SuryaOcr => "suryaocr",
        }
    }
}

impl fmt::Display for OcrBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OcrBackend {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tesseract" => Ok(OcrBackend::Tesseract),
            "easyocr" | "easy-ocr" => Ok(OcrBackend::EasyOcr),
            "rapidocr" | "rapid-ocr" => Ok(OcrBackend::RapidOcr),
            "suryaocr" | "surya-ocr" => Ok(OcrBackend::SuryaOcr),
            _ => Err(BenchError::InvalidBackend { id: s.to_string() }),
        }
    }
}

// ── Options ──────────────────────────────────────────────────────────────

/// Tesseract options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TesseractOptions {
    pub force_full_page_ocr: bool,
    pub lang: Vec<String>,
    /// Data directory handed to the engine process as `TESSDATA_PREFIX`.
    /// Not part of the engine's option model, so never serialised.
    #[serde(skip)]
    pub data_dir: Option<PathBuf>,
}

/// Options shared by the language-list engines (EasyOCR, Surya).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageOcrOptions {
    pub force_full_page_ocr: bool,
    pub lang: Vec<String>,
}

/// RapidOCR options: three ONNX model files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RapidOcrOptions {
    pub force_full_page_ocr: bool,
    pub det_model_path: PathBuf,
    pub rec_model_path: PathBuf,
    pub cls_model_path: PathBuf,
}

/// Engine-specific OCR options. Serialised with a `kind` discriminator, the
/// layout the conversion engine's option model expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum OcrOptions {
    #[serde(rename = "tesseract")]
    Tesseract(TesseractOptions),
    #[serde(rename = "easyocr")]
    EasyOcr(LanguageOcrOptions),
    #[serde(rename = "rapidocr")]
    RapidOcr(RapidOcrOptions),
    #[serde(rename = "suryaocr")]
    SuryaOcr(LanguageOcrOptions),
}

impl OcrOptions {
    /// The backend these options configure.
    pub fn backend(&self) -> OcrBackend {
        match self {
            OcrOptions::Tesseract(_) => OcrBackend::Tesseract,
            OcrOptions::EasyOcr(_) => OcrBackend::EasyOcr,
            OcrOptions::RapidOcr(_) => OcrBackend::RapidOcr,
            OcrOptions::SuryaOcr(_) => OcrBackend::SuryaOcr,
        }
    }

    pub fn force_full_page_ocr(&self) -> bool {
        match self {
            OcrOptions::Tesseract(o) => o.force_full_page_ocr,
            OcrOptions::EasyOcr(o) | OcrOptions::SuryaOcr(o) => o.force_full_page_ocr,
            OcrOptions::RapidOcr(o) => o.force_full_page_ocr,
        }
    }

    /// Language hints, for the engines that take them.
    pub fn languages(&self) -> Option<&[String]> {
        match self {
            OcrOptions::Tesseract(o) => Some(&o.lang),
            OcrOptions::EasyOcr(o) | OcrOptions::SuryaOcr(o) => Some(&o.lang),
            OcrOptions::RapidOcr(_) => None,
        }
    }
}

// ── Registry ─────────────────────────────────────────────────────────────

/// Maps a backend identifier to its resolved options.
#[derive(Debug, Clone, Copy)]
pub struct OcrBackendRegistry<'a> {
    settings: &'a ExperimentSettings,
}

impl<'a> OcrBackendRegistry<'a> {
    pub fn new(settings: &'a ExperimentSettings) -> Self {
        Self { settings }
    }

    /// Resolve a backend identifier such as `"tesseract"` or `"rapid-ocr"`.
    ///
    /// # Errors
    /// - [`BenchError::InvalidBackend`] for identifiers outside the closed set
    /// - [`BenchError::MissingConfigKey`] when the backend's keys are absent
    pub fn resolve(&self, backend_id: &str) -> Result<OcrOptions, BenchError> {
        self.resolve_backend(backend_id.parse()?)
    }

    /// Resolve an already-parsed backend.
    pub fn resolve_backend(&self, backend: OcrBackend) -> Result<OcrOptions, BenchError> {
        let s = self.settings;
        let force_full_page_ocr = s.force_full_page_ocr();

        let options = match backend {
            OcrBackend::Tesseract => OcrOptions::Tesseract(TesseractOptions {
                force_full_page_ocr,
                lang: require(&s.tesseract_lang, "tesseract_lang")?.clone(),
                data_dir: Some(require(&s.tessdata_prefix, "tessdata_prefix")?.clone()),
            }),
            OcrBackend::EasyOcr => OcrOptions::EasyOcr(LanguageOcrOptions {
                force_full_page_ocr,
                lang: require(&s.easyocr_lang, "easyocr_lang")?.clone(),
            }),
            OcrBackend::SuryaOcr => OcrOptions::SuryaOcr(LanguageOcrOptions {
                force_full_page_ocr,
                lang: require(&s.suryaocr_lang, "suryaocr_lang")?.clone(),
            }),
            OcrBackend::RapidOcr => {
                let base = require(&s.modelscope_model_cache_dir, "modelscope_model_cache_dir")?;
                OcrOptions::RapidOcr(RapidOcrOptions {
                    force_full_page_ocr,
                    det_model_path: base.join(require(
                        &s.rapidocr_det_model_rel_path,
                        "rapidocr_det_model_rel_path",
                    )?),
                    rec_model_path: base.join(require(
                        &s.rapidocr_rec_model_rel_path,
                        "rapidocr_rec_model_rel_path",
                    )?),
                    cls_model_path: base.join(require(
                        &s.rapidocr_cls_model_rel_path,
                        "rapidocr_cls_model_rel_path",
                    )?),
                })
            }
        };

        Ok(options)
    }
}
