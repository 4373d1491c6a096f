use std::fmt;

use crate::DownloadProgress;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum UpdateStatus {
    #[default]
    Idle,
    Checking,
    Available,
    Downloading(DownloadProgress),
    Downloaded,
    Installing,
    NotAvailable,
    Error(String),
}

/// Snapshot of the update lifecycle as the UI sees it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UpdateInfo {
    pub current_version: String,
    /// Version the current status refers to, once a check has returned one.
    pub version: Option<String>,
    pub status: UpdateStatus,
    pub pending_install: bool,
}

impl UpdateInfo {
    pub fn status_line(&self) -> String {
        let version = self.version.as_deref().unwrap_or("?");
        match &self.status {
            UpdateStatus::Idle => "No update activity.".to_string(),
            UpdateStatus::Checking => "Checking for updates...".to_string(),
            UpdateStatus::Available => format!("Update v{version} is available."),
            UpdateStatus::Downloading(progress) => {
                format!("Downloading update v{version}: {}%", progress.percent())
            }
            UpdateStatus::Downloaded if self.pending_install => {
                format!("Update v{version} will be installed when you quit.")
            }
            UpdateStatus::Downloaded => format!("Update v{version} downloaded."),
            UpdateStatus::Installing => format!("Installing update v{version}..."),
            UpdateStatus::NotAvailable => {
                format!("VibeCheck is up to date (v{}).", self.current_version)
            }
            UpdateStatus::Error(message) => format!("Update error: {message}"),
        }
    }
}

impl fmt::Display for UpdateInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.status_line())
    }
}
