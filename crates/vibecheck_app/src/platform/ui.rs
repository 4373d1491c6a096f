//! Boundary between the host and whatever renders it.

use std::path::PathBuf;

use vibecheck_engine::SENSOR_FILE_EXTENSION;

/// Fire-and-forget notifications for the UI. Sending never waits on the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    UpdateStatus(String),
    UpdateProgress {
        percent: u8,
        bytes_transferred: u64,
        bytes_total: Option<u64>,
    },
    /// Human-readable analysis service state, e.g. "running".
    ServiceState(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileFilter {
    pub name: &'static str,
    pub extensions: &'static [&'static str],
}

impl FileFilter {
    pub const SENSOR_FILES: FileFilter = FileFilter {
        name: "Sensor Data",
        extensions: &[SENSOR_FILE_EXTENSION],
    };
}

/// A yes/no question. Dismissing the prompt counts as declining.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub title: String,
    pub message: String,
    pub accept_label: String,
    pub decline_label: String,
}

impl Prompt {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            accept_label: "Yes".to_string(),
            decline_label: "No".to_string(),
        }
    }

    pub fn labels(mut self, accept: impl Into<String>, decline: impl Into<String>) -> Self {
        self.accept_label = accept.into();
        self.decline_label = decline.into();
        self
    }
}

/// Blocking dialogs the host may raise. Implementations decide how they look.
#[async_trait::async_trait]
pub trait UiSurface: Send + Sync {
    /// Native file chooser. `None` when the user cancels.
    async fn choose_file(&self, filter: FileFilter) -> Option<PathBuf>;

    async fn confirm(&self, prompt: Prompt) -> bool;

    async fn alert(&self, title: &str, message: &str);
}
