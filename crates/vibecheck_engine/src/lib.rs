//! VibeCheck engine: sidecar supervision, analysis uploads, and release downloads.
mod gateway;
mod installer;
mod persist;
mod release;
mod selection;
mod supervisor;
mod types;

pub use gateway::{Analyzer, GatewayError, GatewaySettings, ReqwestAnalyzer, DEFAULT_SIDECAR_PORT};
pub use installer::{InstallMode, Installer, ProcessInstaller};
pub use persist::{ensure_dir, read_optional, AtomicFileWriter, PersistError};
pub use release::{
    ProgressSink, ReleaseFeed, ReleaseManifest, ReleaseSettings, ReqwestReleaseFeed,
    TransferProgress, UpdateError,
};
pub use selection::{is_sensor_file, FileAccessError, FileSelection, SENSOR_FILE_EXTENSION};
pub use supervisor::{
    default_interpreter, LaunchMode, ProcessSupervisor, SidecarLaunch, SupervisorError,
    APP_DIR_ENV,
};
pub use types::{AnalysisFailureKind, AnalysisResult, ServiceProcessState, SupervisorEvent};
pub use vibecheck_logging::SidecarStream;
