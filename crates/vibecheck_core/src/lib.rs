//! VibeCheck core: pure update-lifecycle state machine and view-model helpers.
mod effect;
mod msg;
mod state;
mod update;
mod version;
mod view_model;

pub use effect::{Effect, InstallPolicy};
pub use msg::{CheckOrigin, Msg};
pub use state::{DownloadProgress, PendingInstall, ReleaseInfo, UpdatePhase, UpdateState};
pub use update::update;
pub use version::{is_newer, parse_version};
pub use view_model::{UpdateInfo, UpdateStatus};
