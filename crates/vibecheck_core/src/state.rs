use std::path::PathBuf;

use crate::view_model::{UpdateInfo, UpdateStatus};

/// A release as published on the release feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseInfo {
    pub version: String,
    pub url: String,
    pub sha256: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DownloadProgress {
    pub bytes_transferred: u64,
    pub bytes_total: Option<u64>,
}

impl DownloadProgress {
    pub fn new(bytes_transferred: u64, bytes_total: Option<u64>) -> Self {
        Self {
            bytes_transferred,
            bytes_total,
        }
    }

    /// Whole percent in `0..=100`; zero while the total size is unknown.
    pub fn percent(&self) -> u8 {
        match self.bytes_total {
            Some(total) if total > 0 => {
                let pct = self.bytes_transferred.saturating_mul(100) / total;
                pct.min(100) as u8
            }
            _ => 0,
        }
    }
}

/// A downloaded update the user chose not to install immediately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingInstall {
    pub version: String,
    pub artifact: PathBuf,
}

/// Where the update lifecycle currently is. Only `update()` moves between phases.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum UpdatePhase {
    #[default]
    Idle,
    Checking {
        origin: crate::CheckOrigin,
    },
    /// Waiting for the user to accept or decline the download.
    Available {
        release: ReleaseInfo,
    },
    Downloading {
        release: ReleaseInfo,
        progress: DownloadProgress,
    },
    /// Waiting for the user to accept or decline the install.
    Downloaded {
        release: ReleaseInfo,
        artifact: PathBuf,
    },
    Installing {
        version: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateState {
    current_version: String,
    phase: UpdatePhase,
    status: UpdateStatus,
    subject_version: Option<String>,
    pending: Option<PendingInstall>,
    auto_update: bool,
    dirty: bool,
}

impl UpdateState {
    pub fn new(current_version: impl Into<String>) -> Self {
        Self {
            current_version: current_version.into(),
            phase: UpdatePhase::Idle,
            status: UpdateStatus::Idle,
            subject_version: None,
            pending: None,
            auto_update: true,
            dirty: false,
        }
    }

    pub fn with_auto_update(mut self, enabled: bool) -> Self {
        self.auto_update = enabled;
        self
    }

    pub fn current_version(&self) -> &str {
        &self.current_version
    }

    pub fn phase(&self) -> &UpdatePhase {
        &self.phase
    }

    pub fn auto_update(&self) -> bool {
        self.auto_update
    }

    pub fn pending(&self) -> Option<&PendingInstall> {
        self.pending.as_ref()
    }

    pub fn view(&self) -> UpdateInfo {
        UpdateInfo {
            current_version: self.current_version.clone(),
            version: self.subject_version.clone(),
            status: self.status.clone(),
            pending_install: self.pending.is_some(),
        }
    }

    /// Returns whether anything observable changed since the last call, and clears the flag.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub(crate) fn transition(
        &mut self,
        phase: UpdatePhase,
        status: UpdateStatus,
        subject_version: Option<String>,
    ) {
        self.phase = phase;
        self.status = status;
        if subject_version.is_some() {
            self.subject_version = subject_version;
        }
        self.dirty = true;
    }

    pub(crate) fn set_progress(&mut self, next: DownloadProgress) {
        if let UpdatePhase::Downloading { progress, .. } = &mut self.phase {
            *progress = next;
            self.status = UpdateStatus::Downloading(next);
            self.dirty = true;
        }
    }

    pub(crate) fn set_pending(&mut self, pending: Option<PendingInstall>) {
        self.pending = pending;
        self.dirty = true;
    }

    pub(crate) fn set_auto_update(&mut self, enabled: bool) {
        if self.auto_update != enabled {
            self.auto_update = enabled;
            self.dirty = true;
        }
    }
}
