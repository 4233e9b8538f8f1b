//! Client for the cloud document-intelligence layout service.
//!
//! The service exposes conversion as a long-running operation:
//!
//! ```text
//! POST …/prebuilt-layout:analyze   {"base64Source": …}
//!   └─▶ 202 Accepted, Operation-Location: <poll url>
//! GET <poll url>                   (repeat while notStarted / running)
//!   └─▶ {"status": "succeeded", "analyzeResult": {"content": "<markdown>"}}
//! ```
//!
//! Request bodies and the status document are handled by small pure helpers
//! ([`analyze_url`], [`parse_operation`], [`retry_after`]) so the protocol can
//! be tested without a network.

use crate::config::{require, ExperimentSettings};
use crate::convert::DocumentConverter;
use crate::error::{BenchError, EngineError};
use async_trait::async_trait;
use base64::Engine as _;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// REST API version the client speaks.
pub const API_VERSION: &str = "2024-11-30";

/// Prebuilt model that returns the document layout.
pub const LAYOUT_MODEL: &str = "prebuilt-layout";

const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";
const OPERATION_LOCATION_HEADER: &str = "Operation-Location";

/// Poll interval when the service does not send `Retry-After`.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Per-request HTTP timeout. The operation as a whole has no deadline.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Converts PDFs through the service's layout model with Markdown output.
#[derive(Clone)]
pub struct DocIntelligenceClient {
    http: reqwest::Client,
    endpoint: String,
    key: String,
    poll_interval: Duration,
}

impl DocIntelligenceClient {
    /// Build a client from `document_intelligence_endpoint` and
    /// `document_intelligence_key`.
    pub fn from_settings(settings: &ExperimentSettings) -> Result<Self, BenchError> {
        let endpoint = require(
            &settings.document_intelligence_endpoint,
            "document_intelligence_endpoint",
        )?;
        let key = require(&settings.document_intelligence_key, "document_intelligence_key")?;
        Self::new(endpoint, key)
    }

    pub fn new(endpoint: impl Into<String>, key: impl Into<String>) -> Result<Self, BenchError> {
        let endpoint = endpoint.into();
        let key = key.into();
        if !(endpoint.starts_with("https://") || endpoint.starts_with("http://")) {
            return Err(BenchError::InvalidConfig(format!(
                "document_intelligence_endpoint must be an http(s) URL, got '{endpoint}'"
            )));
        }
        if key.trim().is_empty() {
            return Err(BenchError::InvalidConfig(
                "document_intelligence_key is empty".to_string(),
            ));
        }

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BenchError::Internal(format!("HTTP client: {e}")))?;

        Ok(Self {
            http,
            endpoint,
            key,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    /// Override the fallback poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn submit(&self, input: &Path) -> Result<String, EngineError> {
        let bytes = tokio::fs::read(input).await.map_err(|e| EngineError::Io {
            path: input.to_path_buf(),
            detail: e.to_string(),
        })?;
        let body = serde_json::json!({
            "base64Source": base64::engine::general_purpose::STANDARD.encode(&bytes),
        });

        let url = analyze_url(&self.endpoint);
        debug!("Submitting {} bytes to {}", bytes.len(), url);

        let response = self
            .http
            .post(&url)
            .header(SUBSCRIPTION_KEY_HEADER, &self.key)
            .json(&body)
            .send()
            .await
            .map_err(http_error)?;

        if response.status() != StatusCode::ACCEPTED {
            return Err(unexpected_status(response).await);
        }

        response
            .headers()
            .get(OPERATION_LOCATION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| EngineError::InvalidOutput {
                detail: format!("analyze response has no {OPERATION_LOCATION_HEADER} header"),
            })
    }

    async fn poll(&self, operation_url: &str) -> Result<String, EngineError> {
        loop {
            let response = self
                .http
                .get(operation_url)
                .header(SUBSCRIPTION_KEY_HEADER, &self.key)
                .send()
                .await
                .map_err(http_error)?;

            if !response.status().is_success() {
                return Err(unexpected_status(response).await);
            }

            let wait = retry_after(response.headers()).unwrap_or(self.poll_interval);
            let body = response.text().await.map_err(http_error)?;

            match parse_operation(&body)? {
                OperationState::Running(status) => {
                    debug!("Analyze operation {}; next poll in {:?}", status, wait);
                    tokio::time::sleep(wait).await;
                }
                OperationState::Succeeded(markdown) => return Ok(markdown),
                OperationState::Failed { status, detail } => {
                    return Err(EngineError::ServiceFailed { status, detail });
                }
            }
        }
    }
}

impl std::fmt::Debug for DocIntelligenceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocIntelligenceClient")
            .field("endpoint", &self.endpoint)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DocumentConverter for DocIntelligenceClient {
    fn name(&self) -> &str {
        LAYOUT_MODEL
    }

    async fn convert(&self, input: &Path) -> Result<String, EngineError> {
        info!("Uploading {} to {}", input.display(), self.endpoint);
        let operation_url = self.submit(input).await?;
        self.poll(&operation_url).await
    }
}

// ── Protocol helpers ─────────────────────────────────────────────────────────

/// Analyze endpoint for the layout model with Markdown output.
pub fn analyze_url(endpoint: &str) -> String {
    format!(
        "{}/documentintelligence/documentModels/{LAYOUT_MODEL}:analyze?api-version={API_VERSION}&outputContentFormat=markdown",
        endpoint.trim_end_matches('/')
    )
}

/// Where a long-running analyze operation stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationState {
    /// `notStarted` or `running`; carries the raw status.
    Running(String),
    /// Finished; carries `analyzeResult.content`.
    Succeeded(String),
    /// `failed`, `canceled`, or any status the client does not know.
    Failed { status: String, detail: String },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationBody {
    status: String,
    #[serde(default)]
    analyze_result: Option<AnalyzeResult>,
    #[serde(default)]
    error: Option<ServiceErrorBody>,
}

#[derive(Deserialize)]
struct AnalyzeResult {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct ServiceErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl ServiceErrorBody {
    fn describe(&self) -> String {
        match (&self.code, &self.message) {
            (Some(code), Some(msg)) => format!("{code}: {msg}"),
            (Some(code), None) => code.clone(),
            (None, Some(msg)) => msg.clone(),
            (None, None) => "no error detail".to_string(),
        }
    }
}

/// Interpret one poll response body.
pub fn parse_operation(body: &str) -> Result<OperationState, EngineError> {
    let parsed: OperationBody =
        serde_json::from_str(body).map_err(|e| EngineError::InvalidOutput {
            detail: format!("unreadable operation status: {e}"),
        })?;

    let detail = || {
        parsed
            .error
            .as_ref()
            .map(ServiceErrorBody::describe)
            .unwrap_or_else(|| "no error detail".to_string())
    };

    match parsed.status.as_str() {
        "notStarted" | "running" => Ok(OperationState::Running(parsed.status.clone())),
        "succeeded" => match &parsed.analyze_result {
            Some(result) => Ok(OperationState::Succeeded(result.content.clone())),
            None => Err(EngineError::InvalidOutput {
                detail: "succeeded operation has no analyzeResult".to_string(),
            }),
        },
        "failed" | "canceled" => Ok(OperationState::Failed {
            status: parsed.status.clone(),
            detail: detail(),
        }),
        other => Ok(OperationState::Failed {
            status: other.to_string(),
            detail: format!("unknown operation status; {}", detail()),
        }),
    }
}

/// `Retry-After` as a delay, when sent in delta-seconds form.
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn http_error(e: reqwest::Error) -> EngineError {
    EngineError::Http {
        detail: e.to_string(),
    }
}

async fn unexpected_status(response: reqwest::Response) -> EngineError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or(body);
    EngineError::ServiceFailed {
        status: status.to_string(),
        detail,
    }
}
