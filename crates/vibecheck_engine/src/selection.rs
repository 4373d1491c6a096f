use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use thiserror::Error;

/// Extension of the sensor recordings the analysis service accepts.
pub const SENSOR_FILE_EXTENSION: &str = "ide";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FileAccessError {
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("permission denied: {}", .0.display())]
    PermissionDenied(PathBuf),
    #[error("not a regular file: {}", .0.display())]
    NotAFile(PathBuf),
    #[error("cannot access {}: {message}", path.display())]
    Io { path: PathBuf, message: String },
}

impl FileAccessError {
    pub(crate) fn from_io(path: &Path, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => FileAccessError::NotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => FileAccessError::PermissionDenied(path.to_path_buf()),
            _ => FileAccessError::Io {
                path: path.to_path_buf(),
                message: err.to_string(),
            },
        }
    }
}

/// A file the user picked for analysis. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSelection {
    pub absolute_path: PathBuf,
    pub display_name: String,
    pub size_bytes: u64,
    pub last_modified: Option<SystemTime>,
}

impl FileSelection {
    /// Stats `path` and captures the fields the UI shows. Never returns a partial selection.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, FileAccessError> {
        let path = path.as_ref();
        let absolute_path =
            std::path::absolute(path).map_err(|err| FileAccessError::from_io(path, err))?;
        let metadata = tokio::fs::metadata(&absolute_path)
            .await
            .map_err(|err| FileAccessError::from_io(&absolute_path, err))?;
        if !metadata.is_file() {
            return Err(FileAccessError::NotAFile(absolute_path));
        }

        let display_name = absolute_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| absolute_path.to_string_lossy().into_owned());

        Ok(Self {
            display_name,
            size_bytes: metadata.len(),
            last_modified: metadata.modified().ok(),
            absolute_path,
        })
    }

    /// Milliseconds since the Unix epoch, the unit the UI layer works in.
    pub fn last_modified_ms(&self) -> Option<u64> {
        self.last_modified
            .and_then(|time| time.duration_since(SystemTime::UNIX_EPOCH).ok())
            .map(|elapsed| elapsed.as_millis() as u64)
    }
}

/// True for paths ending in `.ide`, compared case-insensitively.
pub fn is_sensor_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(SENSOR_FILE_EXTENSION))
}
