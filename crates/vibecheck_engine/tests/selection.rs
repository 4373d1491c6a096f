use std::path::Path;

use tempfile::TempDir;
use vibecheck_engine::{FileAccessError, FileSelection};

#[tokio::test]
async fn selection_reports_base_name_and_byte_length() {
    let temp = TempDir::new().unwrap();
    for (name, len) in [("sample.ide", 1024usize), ("empty.ide", 0), ("big.IDE", 70_000)] {
        let file = temp.path().join(name);
        std::fs::write(&file, vec![7u8; len]).unwrap();

        let selection = FileSelection::from_path(&file).await.unwrap();
        assert_eq!(selection.display_name, name);
        assert_eq!(selection.size_bytes, len as u64);
        assert!(selection.absolute_path.is_absolute());
        assert!(selection.last_modified_ms().is_some());
    }
}

#[tokio::test]
async fn missing_file_is_not_found() {
    let temp = TempDir::new().unwrap();
    let missing = temp.path().join("nope.ide");

    let err = FileSelection::from_path(&missing).await.unwrap_err();
    assert_eq!(err, FileAccessError::NotFound(missing));
}

#[tokio::test]
async fn directory_is_not_a_file() {
    let temp = TempDir::new().unwrap();
    let err = FileSelection::from_path(temp.path()).await.unwrap_err();
    assert!(matches!(err, FileAccessError::NotAFile(_)));
}

#[cfg(unix)]
#[tokio::test]
async fn unreadable_parent_is_permission_denied() {
    use std::os::unix::fs::PermissionsExt;

    let temp = TempDir::new().unwrap();
    let locked = temp.path().join("locked");
    std::fs::create_dir(&locked).unwrap();
    std::fs::write(locked.join("run.ide"), b"x").unwrap();
    std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();

    let result = FileSelection::from_path(Path::new(&locked).join("run.ide")).await;
    std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();

    // Root ignores directory permissions, so only assert when access was actually denied.
    if let Err(err) = result {
        assert!(matches!(err, FileAccessError::PermissionDenied(_)));
    }
}
