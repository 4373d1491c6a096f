use std::path::PathBuf;

use crate::{DownloadProgress, ReleaseInfo};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Query the release feed for the latest published version.
    FetchManifest,
    /// Ask the user whether the release should be downloaded.
    PromptDownload { release: ReleaseInfo },
    StartDownload { release: ReleaseInfo },
    /// Ask the user whether the downloaded release should be installed now.
    PromptInstall { version: String },
    Progress(DownloadProgress),
    /// Human-readable status line for the UI. Advisory only.
    Notify(String),
    Install { artifact: PathBuf, policy: InstallPolicy },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallPolicy {
    /// Quit the application and run the installer interactively.
    RestartNow,
    /// Run the installer silently while the application exits.
    OnQuit,
}
