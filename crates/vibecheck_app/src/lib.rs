//! VibeCheck desktop host: supervises the analysis service, forwards analysis
//! requests to it, and keeps the application up to date.
pub mod platform;

pub use platform::config::{AdmissionPolicy, HostConfig};
pub use platform::host::{FileInfo, HostOrchestrator, HostParts};
pub use platform::persistence::{Preferences, PreferencesStore};
pub use platform::ui::{FileFilter, Prompt, UiEvent, UiSurface};
pub use platform::updates::{UpdateController, UpdateHandle, UpdateSettings};
