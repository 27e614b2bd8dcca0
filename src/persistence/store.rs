use crate::error::{Result, TrackerError};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Durable key/value storage for serialized snapshots
pub trait SnapshotStore {
    /// Read the value under `key`; `Ok(None)` when nothing was stored yet
    fn read(&self, key: &str) -> Result<Option<String>>;

    fn write(&mut self, key: &str, contents: &str) -> Result<()>;

    fn remove(&mut self, key: &str) -> Result<()>;
}

/// One JSON file per key inside a directory
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(FileStore { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", safe))
    }
}

impl SnapshotStore for FileStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&mut self, key: &str, contents: &str) -> Result<()> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        // Write then rename so a crash never leaves a half-written snapshot
        fs::write(&tmp, contents)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        let _ = fs::remove_file(path.with_extension("json.tmp"));
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory store for tests and hosts without durable storage
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
    failing_writes: usize,
    write_count: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` writes fail with a storage error
    pub fn fail_next_writes(&mut self, count: usize) {
        self.failing_writes = count;
    }

    pub fn insert(&mut self, key: &str, contents: &str) {
        self.entries.insert(key.to_string(), contents.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Successful writes so far
    pub fn write_count(&self) -> usize {
        self.write_count
    }
}

impl SnapshotStore for MemoryStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn write(&mut self, key: &str, contents: &str) -> Result<()> {
        if self.failing_writes > 0 {
            self.failing_writes -= 1;
            return Err(TrackerError::Storage("quota exceeded".to_string()));
        }
        self.entries.insert(key.to_string(), contents.to_string());
        self.write_count += 1;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("trip_odometer_{}_{}", name, std::process::id()))
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = temp_dir("store_round_trip");
        let mut store = FileStore::new(&dir).unwrap();
        assert_eq!(store.read("state").unwrap(), None);

        store.write("state", "{\"a\":1}").unwrap();
        assert_eq!(store.read("state").unwrap().as_deref(), Some("{\"a\":1}"));

        store.remove("state").unwrap();
        assert_eq!(store.read("state").unwrap(), None);
        // Removing twice is fine
        store.remove("state").unwrap();
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_file_store_sanitizes_keys() {
        let dir = temp_dir("store_keys");
        let store = FileStore::new(&dir).unwrap();
        let path = store.path_for("../evil/key");
        assert_eq!(path.parent().unwrap(), dir.as_path());
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_memory_store_failures() {
        let mut store = MemoryStore::new();
        store.fail_next_writes(1);
        assert!(store.write("k", "v").is_err());
        assert!(store.write("k", "v").is_ok());
        assert_eq!(store.get("k"), Some("v"));
        assert_eq!(store.write_count(), 1);
    }
}
