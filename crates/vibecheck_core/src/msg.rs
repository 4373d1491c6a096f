use std::path::PathBuf;

use crate::{DownloadProgress, ReleaseInfo};

/// What triggered an update check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOrigin {
    Startup,
    Timer,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    /// A check was requested by the startup sequence, the hourly timer or the user.
    CheckRequested { origin: CheckOrigin },
    /// The release feed answered with its latest release.
    CheckCompleted { latest: ReleaseInfo },
    CheckFailed { message: String },
    /// User answered the download prompt.
    DownloadAnswered { accepted: bool },
    DownloadProgressed(DownloadProgress),
    DownloadCompleted { artifact: PathBuf },
    DownloadFailed { message: String },
    /// User answered the install prompt.
    InstallAnswered { accepted: bool },
    /// The installer could not be launched.
    InstallFailed { message: String },
    /// Auto-update preference toggled.
    AutoUpdateChanged(bool),
    /// The application is about to exit.
    QuitRequested,
}
