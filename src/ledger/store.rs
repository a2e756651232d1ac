// src/ledger/store.rs

use crate::error::OpklError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Persistence seam for the ledger.
///
/// All paths are relative to the ledger root. Every write replaces the whole
/// document; there are no partial writes.
pub trait LedgerStore {
    /// Reads and decodes a JSON document. A missing file is `Ok(None)`.
    fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>, OpklError>;

    /// Encodes and durably writes a JSON document, creating parent directories as needed.
    fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), OpklError>;
}

/// File-based ledger storage rooted at a directory.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        self.root.join(path)
    }
}

impl LedgerStore for FsStore {
    fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>, OpklError> {
        let full = self.resolve(path);
        let data = match fs::read(&full) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(OpklError::io(full, e)),
        };
        serde_json::from_slice(&data)
            .map(Some)
            .map_err(|e| OpklError::json(full, e))
    }

    fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), OpklError> {
        let full = self.resolve(path);
        let mut data = serde_json::to_vec_pretty(value).map_err(|e| OpklError::json(&full, e))?;
        data.push(b'\n');

        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).map_err(|e| OpklError::io(parent, e))?;
        }

        // Write next to the target and rename over it so readers never see a torn file.
        let tmp = full.with_extension("json.tmp");
        if let Err(e) = write_synced(&tmp, &data).and_then(|()| fs::rename(&tmp, &full)) {
            let _ = fs::remove_file(&tmp);
            return Err(OpklError::io(full, e));
        }

        debug!(path = %full.display(), bytes = data.len(), "wrote ledger file");
        Ok(())
    }
}

fn write_synced(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(data)?;
    file.sync_all()
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashSet;

    /// Wraps an `FsStore`, recording writes and optionally failing some of them.
    #[derive(Debug)]
    pub(crate) struct RecordingStore {
        pub(crate) inner: FsStore,
        pub(crate) writes: RefCell<Vec<PathBuf>>,
        pub(crate) fail_writes: HashSet<PathBuf>,
    }

    impl RecordingStore {
        pub(crate) fn new(root: &Path) -> Self {
            Self {
                inner: FsStore::new(root),
                writes: RefCell::new(Vec::new()),
                fail_writes: HashSet::new(),
            }
        }

        pub(crate) fn writes_to(&self, path: &Path) -> usize {
            self.writes.borrow().iter().filter(|p| p.as_path() == path).count()
        }

        pub(crate) fn reset(&self) {
            self.writes.borrow_mut().clear();
        }
    }

    impl LedgerStore for RecordingStore {
        fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>, OpklError> {
            self.inner.read_json(path)
        }

        fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), OpklError> {
            if self.fail_writes.contains(path) {
                return Err(OpklError::io(
                    path,
                    std::io::Error::new(ErrorKind::PermissionDenied, "injected failure"),
                ));
            }
            self.writes.borrow_mut().push(path.to_path_buf());
            self.inner.write_json(path, value)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    #[test]
    fn missing_file_reads_as_none() {
        let dir = TempDir::new().unwrap();
        let store = FsStore::new(dir.path());
        let value: Option<Value> = store.read_json(Path::new("nope.json")).unwrap();
        assert!(value.is_none());
    }

    #[test]
    fn write_creates_parents_and_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let store = FsStore::new(dir.path());
        let path = Path::new("issuer.example/keys/abc.json");

        store.write_json(path, &json!({"a": 1})).unwrap();

        let back: Value = store.read_json(path).unwrap().unwrap();
        assert_eq!(back, json!({"a": 1}));
        assert!(!dir.path().join("issuer.example/keys/abc.json.tmp").exists());
    }

    #[test]
    fn failed_replace_removes_temp_file() {
        let dir = TempDir::new().unwrap();
        // A directory in the way makes the final rename fail.
        std::fs::create_dir_all(dir.path().join("taken.json")).unwrap();
        let store = FsStore::new(dir.path());

        let result = store.write_json(Path::new("taken.json"), &json!({"a": 1}));

        assert!(matches!(result, Err(OpklError::Io { .. })));
        assert!(!dir.path().join("taken.json.tmp").exists());
    }

    #[test]
    fn corrupt_file_is_a_json_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("bad.json"), "{not json").unwrap();
        let store = FsStore::new(dir.path());
        let result: Result<Option<Value>, _> = store.read_json(Path::new("bad.json"));
        assert!(matches!(result, Err(OpklError::Json { .. })));
    }
}
