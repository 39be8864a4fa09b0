//! Loading and saving the JSON data file.

use std::io::Write;
use std::path::{Path, PathBuf};

use lure_storage::{parse_dump, MemoryStorage, StorageError};

#[derive(Debug, thiserror::Error)]
pub(crate) enum StoreError {
    #[error("could not read '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("could not write '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("'{}': {source}", path.display())]
    Storage {
        path: PathBuf,
        source: StorageError,
    },
}

/// Load the store from `path`. A missing file gives an empty store.
pub(crate) fn open_store(path: &Path) -> Result<MemoryStorage, StoreError> {
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(MemoryStorage::new()),
        Err(source) => {
            return Err(StoreError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    let storage_err = |source| StoreError::Storage {
        path: path.to_path_buf(),
        source,
    };
    let dump = parse_dump(&text).map_err(storage_err)?;
    MemoryStorage::from_dump(dump).map_err(storage_err)
}

/// The file contents `storage` would be saved as.
pub(crate) fn render_store(storage: &MemoryStorage, path: &Path) -> Result<String, StoreError> {
    let storage_err = |source| StoreError::Storage {
        path: path.to_path_buf(),
        source,
    };
    storage.dump().map_err(storage_err)?.to_json_pretty().map_err(storage_err)
}

/// Write the committed contents of `storage` to `path`.
pub(crate) fn save_store(storage: &MemoryStorage, path: &Path) -> Result<(), StoreError> {
    write_atomic(path, render_store(storage, path)?.as_bytes())
}

/// Write `storage` to `path` only if it changed since `last`, the contents
/// of the previous write. Returns whether the file was written.
pub(crate) fn flush_store(
    storage: &MemoryStorage,
    path: &Path,
    last: &mut Option<String>,
) -> Result<bool, StoreError> {
    let text = render_store(storage, path)?;
    if last.as_deref() == Some(text.as_str()) {
        return Ok(false);
    }
    write_atomic(path, text.as_bytes())?;
    *last = Some(text);
    Ok(true)
}

/// Replace `path` with `contents` via a temp file in the same directory, so a
/// crash never leaves a half-written file behind.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StoreError> {
    let write_err = |source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(contents).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use lure_storage::{Recipient, TrackingStorage};
    use lure_tracker::ResultTracker;

    use super::*;

    #[test]
    fn missing_file_opens_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = open_store(&dir.path().join("absent.json")).unwrap();
        assert!(storage.dump().unwrap().results.is_empty());
    }

    #[tokio::test]
    async fn save_then_open_keeps_results_and_events() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");

        let tracker = ResultTracker::new(Arc::new(MemoryStorage::new()));
        let r = tracker
            .create_result(4, Recipient::new("bob@example.com"))
            .await
            .unwrap();
        tracker.email_sent(&r.rid).await.unwrap();
        save_store(tracker.storage(), &path).unwrap();

        let reopened = open_store(&path).unwrap();
        let loaded = reopened.get_result(&r.rid).await.unwrap();
        assert_eq!(loaded, tracker.result(&r.rid).await.unwrap());
        assert_eq!(reopened.list_events(4).await.unwrap().len(), 1);
    }

    #[test]
    fn legacy_file_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.json");
        std::fs::write(&path, r#"{"results": [], "events": []}"#).unwrap();
        let Err(err) = open_store(&path) else {
            panic!("legacy dump opened without migration");
        };
        assert!(err.to_string().contains("lure migrate"), "{err}");
    }

    #[tokio::test]
    async fn flush_writes_only_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        let tracker = ResultTracker::new(Arc::new(MemoryStorage::new()));
        let mut last = None;

        assert!(flush_store(tracker.storage(), &path, &mut last).unwrap());
        assert!(!flush_store(tracker.storage(), &path, &mut last).unwrap());

        let r = tracker
            .create_result(2, Recipient::new("carol@example.com"))
            .await
            .unwrap();
        assert!(flush_store(tracker.storage(), &path, &mut last).unwrap());
        assert!(std::fs::read_to_string(&path).unwrap().contains(&r.rid));
        assert_eq!(last.as_deref(), Some(std::fs::read_to_string(&path).unwrap().as_str()));
    }

    #[test]
    fn write_atomic_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.json");
        write_atomic(&path, b"one").unwrap();
        write_atomic(&path, b"two").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "two");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
