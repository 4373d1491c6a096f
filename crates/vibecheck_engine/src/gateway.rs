use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::io::ReaderStream;
use vibecheck_logging::{host_debug, host_info, host_warn};

use crate::{AnalysisFailureKind, AnalysisResult, FileAccessError, FileSelection};

/// Port the analysis service listens on.
pub const DEFAULT_SIDECAR_PORT: u16 = 5001;

#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub base_url: String,
    pub analyze_path: String,
    /// Health endpoint polled before the first upload. `None` disables the probe.
    pub health_path: Option<String>,
    pub connect_timeout: Duration,
    /// Upper bound for one upload round-trip, including the analysis itself.
    pub request_timeout: Duration,
    pub probe_timeout: Duration,
    pub ready_timeout: Duration,
    pub ready_poll_interval: Duration,
    /// Largest upload the service accepts.
    pub max_upload_bytes: u64,
}

impl GatewaySettings {
    pub fn for_port(port: u16) -> Self {
        Self {
            base_url: format!("http://localhost:{port}"),
            ..Self::default()
        }
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            base_url: format!("http://localhost:{DEFAULT_SIDECAR_PORT}"),
            analyze_path: "/analyze".to_string(),
            health_path: Some("/api/health".to_string()),
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(300),
            probe_timeout: Duration::from_secs(2),
            ready_timeout: Duration::from_secs(30),
            ready_poll_interval: Duration::from_millis(250),
            max_upload_bytes: 100 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("could not build http client: {0}")]
    Client(String),
    #[error("analysis service unreachable: {0}")]
    Unreachable(String),
    #[error("analysis service did not become ready")]
    NotReady,
    #[error("analysis request timed out")]
    Timeout,
    #[error("analysis service returned http status {0}")]
    HttpStatus(u16),
    #[error("unexpected response from analysis service: {0}")]
    InvalidResponse(String),
    #[error("file is too large to analyze ({size} bytes, limit {limit})")]
    TooLarge { size: u64, limit: u64 },
    #[error(transparent)]
    FileAccess(#[from] FileAccessError),
}

impl GatewayError {
    /// Maps the error to what the UI is allowed to see.
    fn into_result(self) -> AnalysisResult {
        let (kind, message) = match &self {
            GatewayError::Client(_) | GatewayError::Unreachable(_) => (
                AnalysisFailureKind::ServiceUnreachable,
                "The analysis service could not be reached. Please try again.".to_string(),
            ),
            GatewayError::NotReady => (
                AnalysisFailureKind::ServiceUnreachable,
                "The analysis service is not ready yet. Please try again shortly.".to_string(),
            ),
            GatewayError::Timeout => (
                AnalysisFailureKind::Timeout,
                "The analysis service did not respond in time.".to_string(),
            ),
            GatewayError::HttpStatus(code) => (
                AnalysisFailureKind::ServiceUnreachable,
                format!("The analysis service returned HTTP {code}."),
            ),
            GatewayError::InvalidResponse(_) => (
                AnalysisFailureKind::InvalidResponse,
                "The analysis service returned an unexpected response.".to_string(),
            ),
            GatewayError::TooLarge { .. } => (AnalysisFailureKind::TooLarge, self.to_string()),
            GatewayError::FileAccess(err) => (AnalysisFailureKind::FileAccess, err.to_string()),
        };
        AnalysisResult::failure(kind, message)
    }
}

/// Sends one file to the analysis service and normalizes the answer.
#[async_trait::async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, selection: &FileSelection) -> AnalysisResult;
}

#[derive(Debug, Deserialize)]
struct ServiceResponse {
    success: Option<bool>,
    #[serde(rename = "reportPath")]
    report_path: Option<String>,
    error: Option<String>,
}

#[derive(Debug)]
pub struct ReqwestAnalyzer {
    settings: GatewaySettings,
    client: reqwest::Client,
    ready: AtomicBool,
}

impl ReqwestAnalyzer {
    pub fn new(settings: GatewaySettings) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| GatewayError::Client(err.to_string()))?;
        Ok(Self {
            settings,
            client,
            ready: AtomicBool::new(false),
        })
    }

    /// One health request. Succeeds only on a 2xx answer.
    pub async fn probe(&self) -> Result<(), GatewayError> {
        let Some(health_path) = self.settings.health_path.as_deref() else {
            return Ok(());
        };
        let response = self
            .client
            .get(self.settings.url(health_path))
            .timeout(self.settings.probe_timeout)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(GatewayError::HttpStatus(status.as_u16()))
        }
    }

    /// Polls the health endpoint until it answers or the ready timeout runs out.
    ///
    /// Success is remembered, so only the first upload pays for the wait.
    pub async fn ensure_ready(&self) -> Result<(), GatewayError> {
        if self.ready.load(Ordering::Acquire) {
            return Ok(());
        }
        let deadline = Instant::now() + self.settings.ready_timeout;
        loop {
            match self.probe().await {
                Ok(()) => {
                    host_info!("Analysis service is ready");
                    self.ready.store(true, Ordering::Release);
                    return Ok(());
                }
                Err(err) if Instant::now() >= deadline => {
                    host_warn!("Analysis service readiness probe gave up: {}", err);
                    return Err(GatewayError::NotReady);
                }
                Err(err) => {
                    host_debug!("Analysis service not ready yet: {}", err);
                    tokio::time::sleep(self.settings.ready_poll_interval).await;
                }
            }
        }
    }

    async fn upload(&self, selection: &FileSelection) -> Result<AnalysisResult, GatewayError> {
        let path = &selection.absolute_path;
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|err| FileAccessError::from_io(path, err))?;
        let size = file
            .metadata()
            .await
            .map_err(|err| FileAccessError::from_io(path, err))?
            .len();
        if size > self.settings.max_upload_bytes {
            return Err(GatewayError::TooLarge {
                size,
                limit: self.settings.max_upload_bytes,
            });
        }

        self.ensure_ready().await?;

        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
        let part = Part::stream_with_length(body, size).file_name(selection.display_name.clone());
        let form = Form::new().part("file", part);

        host_info!(
            "Uploading {:?} ({} bytes) for analysis",
            selection.display_name,
            size
        );
        let response = self
            .client
            .post(self.settings.url(&self.settings.analyze_path))
            .multipart(form)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(map_reqwest_error)?;
        interpret_response(status, &body)
    }
}

#[async_trait::async_trait]
impl Analyzer for ReqwestAnalyzer {
    async fn analyze(&self, selection: &FileSelection) -> AnalysisResult {
        match self.upload(selection).await {
            Ok(result) => result,
            Err(err) => {
                host_warn!("Analysis of {:?} failed: {}", selection.display_name, err);
                err.into_result()
            }
        }
    }
}

fn interpret_response(status: u16, body: &[u8]) -> Result<AnalysisResult, GatewayError> {
    let success_status = (200..300).contains(&status);
    let parsed: ServiceResponse = match serde_json::from_slice(body) {
        Ok(parsed) => parsed,
        Err(_) if !success_status => return Err(GatewayError::HttpStatus(status)),
        Err(err) => return Err(GatewayError::InvalidResponse(err.to_string())),
    };

    match parsed {
        ServiceResponse {
            success: Some(true),
            report_path: Some(report_path),
            ..
        } if success_status && !report_path.is_empty() => Ok(AnalysisResult::success(report_path)),
        ServiceResponse {
            success: Some(false) | None,
            error: Some(error),
            ..
        } if !error.trim().is_empty() => Ok(AnalysisResult::failure(
            AnalysisFailureKind::Rejected,
            error,
        )),
        ServiceResponse {
            success: Some(false),
            ..
        } => Ok(AnalysisResult::failure(
            AnalysisFailureKind::Rejected,
            "The analysis service could not process the file.",
        )),
        _ if !success_status => Err(GatewayError::HttpStatus(status)),
        other => Err(GatewayError::InvalidResponse(format!("{other:?}"))),
    }
}

fn map_reqwest_error(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        return GatewayError::Timeout;
    }
    GatewayError::Unreachable(err.to_string())
}
