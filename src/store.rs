//! Small-file state storage for PID files and the pool record.
//!
//! Callers always pass an explicit path; nothing here keeps ambient global state.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Read/modify/write access to small text state files.
pub trait StateStore {
    /// Contents of `path`, or `None` when the file does not exist.
    fn read(&self, path: &Path) -> Result<Option<String>>;

    /// Replace the contents of `path`, creating parent directories as needed.
    fn write(&self, path: &Path, contents: &str) -> Result<()>;

    /// Remove `path`. Returns whether a file was actually removed.
    fn remove(&self, path: &Path) -> Result<bool>;
}

/// Filesystem-backed store.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsStore;

impl StateStore for FsStore {
    fn read(&self, path: &Path) -> Result<Option<String>> {
        match fs::read_to_string(path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    fn write(&self, path: &Path, contents: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))
    }

    fn remove(&self, path: &Path) -> Result<bool> {
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
        }
    }
}

/// In-memory store for tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryStore {
    files: std::sync::Mutex<std::collections::HashMap<std::path::PathBuf, String>>,
}

#[cfg(test)]
impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.files.lock().unwrap().contains_key(path)
    }
}

#[cfg(test)]
impl StateStore for MemoryStore {
    fn read(&self, path: &Path) -> Result<Option<String>> {
        Ok(self.files.lock().unwrap().get(path).cloned())
    }

    fn write(&self, path: &Path, contents: &str) -> Result<()> {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), contents.to_string());
        Ok(())
    }

    fn remove(&self, path: &Path) -> Result<bool> {
        Ok(self.files.lock().unwrap().remove(path).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_fs_store_roundtrip_creates_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run").join("server.pid");
        let store = FsStore;

        assert_eq!(store.read(&path).unwrap(), None);
        store.write(&path, "1234").unwrap();
        assert_eq!(store.read(&path).unwrap().as_deref(), Some("1234"));
    }

    #[test]
    fn test_fs_store_remove_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        let store = FsStore;

        store.write(&path, "{}").unwrap();
        assert!(store.remove(&path).unwrap());
        assert!(!store.remove(&path).unwrap());
    }

    #[test]
    fn test_memory_store_behaves_like_fs() {
        let store = MemoryStore::new();
        let path = Path::new("/virtual/pool-state.json");

        assert_eq!(store.read(path).unwrap(), None);
        store.write(path, "{}").unwrap();
        assert!(store.contains(path));
        assert!(store.remove(path).unwrap());
        assert!(!store.remove(path).unwrap());
    }
}
