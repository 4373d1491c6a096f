use std::path::Path;
use std::process::{Command, Stdio};

use vibecheck_logging::host_info;

use crate::UpdateError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallMode {
    /// The user confirmed; the installer may show its own UI.
    Interactive,
    /// Applied while the application quits; no installer UI.
    Silent,
}

/// Runs a downloaded installer. Implementations must not wait for it to finish.
pub trait Installer: Send + Sync {
    fn launch(&self, artifact: &Path, mode: InstallMode) -> Result<(), UpdateError>;
}

/// Starts the installer as a detached child process.
#[derive(Debug, Clone)]
pub struct ProcessInstaller {
    silent_args: Vec<String>,
}

impl ProcessInstaller {
    pub fn new(silent_args: Vec<String>) -> Self {
        Self { silent_args }
    }
}

impl Default for ProcessInstaller {
    fn default() -> Self {
        let silent_args = if cfg!(windows) {
            vec!["/S".to_string()]
        } else {
            Vec::new()
        };
        Self { silent_args }
    }
}

impl Installer for ProcessInstaller {
    fn launch(&self, artifact: &Path, mode: InstallMode) -> Result<(), UpdateError> {
        if !artifact.is_file() {
            return Err(UpdateError::Install(format!(
                "installer missing at {}",
                artifact.display()
            )));
        }
        mark_executable(artifact)?;

        let mut command = Command::new(artifact);
        if mode == InstallMode::Silent {
            command.args(&self.silent_args);
        }
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        // Dropping the handle leaves the installer running after we exit.
        let child = command
            .spawn()
            .map_err(|err| UpdateError::Install(err.to_string()))?;
        host_info!(
            "Launched installer {:?} pid={} mode={:?}",
            artifact,
            child.id(),
            mode
        );
        Ok(())
    }
}

#[cfg(unix)]
fn mark_executable(path: &Path) -> Result<(), UpdateError> {
    use std::os::unix::fs::PermissionsExt;

    let mut permissions = std::fs::metadata(path)?.permissions();
    permissions.set_mode(permissions.mode() | 0o755);
    std::fs::set_permissions(path, permissions)?;
    Ok(())
}

#[cfg(not(unix))]
fn mark_executable(_path: &Path) -> Result<(), UpdateError> {
    Ok(())
}
