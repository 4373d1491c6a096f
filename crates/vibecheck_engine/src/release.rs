use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use vibecheck_logging::{host_debug, host_info, host_warn};

use crate::persist::{ensure_dir, PersistError};

#[derive(Debug, Clone)]
pub struct ReleaseSettings {
    /// URL of the JSON manifest describing the latest release.
    pub manifest_url: String,
    pub connect_timeout: Duration,
    pub manifest_timeout: Duration,
    pub download_timeout: Duration,
    /// Where downloaded installers are kept until they are run.
    pub staging_dir: PathBuf,
}

impl ReleaseSettings {
    pub fn new(manifest_url: impl Into<String>, staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            manifest_url: manifest_url.into(),
            connect_timeout: Duration::from_secs(10),
            manifest_timeout: Duration::from_secs(30),
            download_timeout: Duration::from_secs(30 * 60),
            staging_dir: staging_dir.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReleaseManifest {
    pub version: String,
    pub url: String,
    #[serde(default)]
    pub sha256: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    pub bytes_transferred: u64,
    pub bytes_total: Option<u64>,
}

pub trait ProgressSink: Send + Sync {
    fn emit(&self, progress: TransferProgress);
}

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("release feed request failed: {0}")]
    Network(String),
    #[error("release feed request timed out")]
    Timeout,
    #[error("release feed returned http status {0}")]
    HttpStatus(u16),
    #[error("release manifest is invalid: {0}")]
    InvalidManifest(String),
    #[error("downloaded update failed verification (expected {expected}, got {actual})")]
    ChecksumMismatch { expected: String, actual: String },
    #[error("could not stage update: {0}")]
    Staging(#[from] PersistError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("could not launch installer: {0}")]
    Install(String),
}

#[async_trait::async_trait]
pub trait ReleaseFeed: Send + Sync {
    async fn latest(&self) -> Result<ReleaseManifest, UpdateError>;

    /// Downloads the release installer into the staging directory and returns its path.
    async fn download(
        &self,
        release: &ReleaseManifest,
        sink: &dyn ProgressSink,
    ) -> Result<PathBuf, UpdateError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestReleaseFeed {
    settings: ReleaseSettings,
    client: reqwest::Client,
}

impl ReqwestReleaseFeed {
    pub fn new(settings: ReleaseSettings) -> Result<Self, UpdateError> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .build()
            .map_err(|err| UpdateError::Network(err.to_string()))?;
        Ok(Self { settings, client })
    }

    async fn stream_to_file(
        &self,
        response: reqwest::Response,
        partial: &Path,
        expected_sha256: Option<&str>,
        sink: &dyn ProgressSink,
    ) -> Result<(), UpdateError> {
        let bytes_total = response.content_length();
        let mut file = tokio::fs::File::create(partial).await?;
        let mut hasher = Sha256::new();
        let mut bytes_transferred = 0u64;

        sink.emit(TransferProgress {
            bytes_transferred,
            bytes_total,
        });

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            hasher.update(&chunk);
            file.write_all(&chunk).await?;
            bytes_transferred += chunk.len() as u64;
            sink.emit(TransferProgress {
                bytes_transferred,
                bytes_total,
            });
        }
        file.flush().await?;
        file.sync_all().await?;

        if let Some(expected) = expected_sha256 {
            let actual = to_hex(&hasher.finalize());
            if !actual.eq_ignore_ascii_case(expected.trim()) {
                return Err(UpdateError::ChecksumMismatch {
                    expected: expected.trim().to_string(),
                    actual,
                });
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ReleaseFeed for ReqwestReleaseFeed {
    async fn latest(&self) -> Result<ReleaseManifest, UpdateError> {
        host_debug!("Fetching release manifest from {}", self.settings.manifest_url);
        let response = self
            .client
            .get(&self.settings.manifest_url)
            .timeout(self.settings.manifest_timeout)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpdateError::HttpStatus(status.as_u16()));
        }
        let body = response.bytes().await.map_err(map_reqwest_error)?;
        let manifest: ReleaseManifest = serde_json::from_slice(&body)
            .map_err(|err| UpdateError::InvalidManifest(err.to_string()))?;
        if manifest.version.trim().is_empty() || manifest.url.trim().is_empty() {
            return Err(UpdateError::InvalidManifest(
                "version and url are required".to_string(),
            ));
        }
        Ok(manifest)
    }

    async fn download(
        &self,
        release: &ReleaseManifest,
        sink: &dyn ProgressSink,
    ) -> Result<PathBuf, UpdateError> {
        let response = self
            .client
            .get(&release.url)
            .timeout(self.settings.download_timeout)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(UpdateError::HttpStatus(status.as_u16()));
        }

        ensure_dir(&self.settings.staging_dir)?;
        let file_name = artifact_file_name(&release.url, &release.version);
        let target = self.settings.staging_dir.join(&file_name);
        let partial = self.settings.staging_dir.join(format!("{file_name}.part"));

        if let Err(err) = self
            .stream_to_file(response, &partial, release.sha256.as_deref(), sink)
            .await
        {
            if let Err(cleanup) = tokio::fs::remove_file(&partial).await {
                host_warn!("Could not remove partial download {:?}: {}", partial, cleanup);
            }
            return Err(err);
        }

        tokio::fs::rename(&partial, &target).await?;
        host_info!("Update v{} staged at {:?}", release.version, target);
        Ok(target)
    }
}

/// Last URL path segment with unsafe characters replaced, or a versioned fallback.
fn artifact_file_name(url: &str, version: &str) -> String {
    let from_url = reqwest::Url::parse(url).ok().and_then(|parsed| {
        parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back().map(str::to_string))
    });
    let cleaned: String = from_url
        .unwrap_or_default()
        .chars()
        .map(|c| if is_forbidden(c) { '_' } else { c })
        .collect();
    let cleaned = cleaned.trim_matches(&['_', ' ', '.'][..]);
    if cleaned.is_empty() {
        format!("vibecheck-{}-setup", version.trim())
    } else {
        cleaned.to_string()
    }
}

fn is_forbidden(c: char) -> bool {
    matches!(c,
        '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0'..='\u{1F}'
    )
}

fn to_hex(digest: &[u8]) -> String {
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(&mut hex, "{byte:02x}");
    }
    hex
}

fn map_reqwest_error(err: reqwest::Error) -> UpdateError {
    if err.is_timeout() {
        return UpdateError::Timeout;
    }
    UpdateError::Network(err.to_string())
}
