//! File-based store implementation.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::store::{SessionStore, Versioned};

const LOCK_ATTEMPTS: u32 = 50;
const LOCK_BACKOFF: Duration = Duration::from_millis(10);
/// A lock file older than this was left behind by a writer that died holding it.
const LOCK_STALE_AFTER: Duration = Duration::from_secs(30);

/// File-based implementation of `SessionStore`.
///
/// Each key is stored as `<key>.json` in the base directory, with `/` written as `~`.
/// Writes go to a temp file first and are renamed into place. A compare-and-set holds
/// `<key>.lock` (created exclusively) for the read-check-write sequence, so it also
/// holds across processes sharing the directory. The lock file holds the owner's pid
/// and is broken once it is older than `LOCK_STALE_AFTER`.
pub struct FileStore {
    base_dir: PathBuf,
}

#[derive(Serialize, Deserialize)]
struct FileEntry {
    version: u64,
    value: String,
}

/// Removes the lock file when dropped.
struct LockGuard {
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!("failed to release lock {}: {}", self.path.display(), e);
        }
    }
}

impl FileStore {
    pub fn new(base_dir: impl AsRef<Path>) -> StoreResult<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    fn entry_path(&self, key: &str) -> StoreResult<PathBuf> {
        let valid = !key.is_empty()
            && !key.contains("..")
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '/' | '-'));
        if !valid {
            return Err(StoreError::InvalidKeyName(key.to_string()));
        }
        Ok(self.base_dir.join(format!("{}.json", key.replace('/', "~"))))
    }

    fn read_entry(path: &Path) -> StoreResult<Option<FileEntry>> {
        match fs::read_to_string(path) {
            Ok(contents) => {
                let entry: FileEntry = serde_json::from_str(&contents).map_err(|e| {
                    StoreError::Corrupted(format!("{}: {}", path.display(), e))
                })?;
                Ok(Some(entry))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    fn acquire_lock(&self, key: &str, path: &Path) -> StoreResult<LockGuard> {
        let lock_path = path.with_extension("lock");
        for _ in 0..LOCK_ATTEMPTS {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_path)
            {
                Ok(mut file) => {
                    if let Err(e) = writeln!(file, "{}", std::process::id()) {
                        tracing::warn!("failed to record owner of {}: {}", lock_path.display(), e);
                    }
                    return Ok(LockGuard { path: lock_path });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if Self::lock_is_stale(&lock_path) {
                        tracing::warn!(
                            "breaking stale lock {} (owner {})",
                            lock_path.display(),
                            fs::read_to_string(&lock_path).unwrap_or_default().trim()
                        );
                        match fs::remove_file(&lock_path) {
                            Ok(()) => continue,
                            Err(e) if e.kind() == ErrorKind::NotFound => continue,
                            Err(e) => return Err(StoreError::Io(e)),
                        }
                    }
                    thread::sleep(LOCK_BACKOFF);
                }
                Err(e) => return Err(StoreError::Io(e)),
            }
        }
        Err(StoreError::Busy(key.to_string()))
    }

    fn lock_is_stale(lock_path: &Path) -> bool {
        fs::metadata(lock_path)
            .and_then(|meta| meta.modified())
            .ok()
            .and_then(|modified| modified.elapsed().ok())
            .map_or(false, |age| age > LOCK_STALE_AFTER)
    }
}

impl SessionStore for FileStore {
    fn get(&self, key: &str) -> StoreResult<Option<Versioned>> {
        let path = self.entry_path(key)?;
        Ok(Self::read_entry(&path)?.map(|entry| Versioned {
            value: entry.value,
            version: entry.version,
        }))
    }

    fn put(&self, key: &str, value: String, expected: Option<u64>) -> StoreResult<u64> {
        let path = self.entry_path(key)?;
        let _lock = self.acquire_lock(key, &path)?;

        let current = Self::read_entry(&path)?.map(|e| e.version).unwrap_or(0);
        if let Some(expected) = expected {
            if expected != current {
                return Err(StoreError::VersionConflict {
                    key: key.to_string(),
                    expected,
                    actual: current,
                });
            }
        }

        let version = current + 1;
        let bytes = serde_json::to_vec(&FileEntry { version, value })?;

        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, bytes)?;
        fs::rename(&temp_path, &path)?;

        tracing::debug!("saved {} (version {}) to {}", key, version, path.display());
        Ok(version)
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        let path = self.entry_path(key)?;
        let _lock = self.acquire_lock(key, &path)?;
        if path.exists() {
            fs::remove_file(&path)?;
            tracing::debug!("deleted {}", key);
        }
        Ok(())
    }

    fn keys(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.base_dir)? {
            let path = entry?.path();
            let key = path
                .file_name()
                .and_then(|s| s.to_str())
                .and_then(|name| name.strip_suffix(".json"))
                .map(|stem| stem.replace('~', "/"));
            if let Some(key) = key {
                if key.starts_with(prefix) {
                    keys.push(key);
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    #[test]
    fn values_survive_a_new_instance() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileStore::new(dir.path()).unwrap();
            store
                .put("booking/tennis", "{\"grid\":[]}".into(), Some(0))
                .unwrap();
        }

        let store = FileStore::new(dir.path()).unwrap();
        let entry = store.get("booking/tennis").unwrap().unwrap();
        assert_eq!(entry.version, 1);
        assert_eq!(entry.value, "{\"grid\":[]}");
        assert_eq!(store.keys("booking/").unwrap(), vec!["booking/tennis"]);
        assert!(dir.path().join("booking~tennis.json").exists());
        assert!(!dir.path().join("booking~tennis.lock").exists());
    }

    #[test]
    fn stale_write_is_rejected_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        store.put("users", "[]".into(), None).unwrap();
        store.put("users", "[1]".into(), Some(1)).unwrap();

        let err = store.put("users", "[2]".into(), Some(1)).unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict { actual: 2, .. }));
        assert_eq!(store.get("users").unwrap().unwrap().value, "[1]");
    }

    #[test]
    fn lock_left_by_a_dead_writer_is_broken() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        let lock_path = dir.path().join("booking~tennis.lock");
        let lock = fs::File::create(&lock_path).unwrap();
        lock.set_modified(SystemTime::now() - Duration::from_secs(120))
            .unwrap();
        drop(lock);

        assert_eq!(store.put("booking/tennis", "{}".into(), None).unwrap(), 1);
        assert!(!lock_path.exists());
    }

    #[test]
    fn held_lock_reports_busy() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        fs::write(dir.path().join("users.lock"), b"").unwrap();

        let err = store.put("users", "[]".into(), None).unwrap_err();
        assert!(matches!(err, StoreError::Busy(_)));
    }

    #[test]
    fn rejects_unsafe_key_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        assert!(matches!(
            store.get("../etc/passwd"),
            Err(StoreError::InvalidKeyName(_))
        ));
        assert!(matches!(
            store.put("history/a b", "[]".into(), None),
            Err(StoreError::InvalidKeyName(_))
        ));
    }
}
