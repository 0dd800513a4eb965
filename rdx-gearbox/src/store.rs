//! Gear persistence.
//!
//! A registry saves each controller's gear under `gearbox_<name>` and reads it
//! back as the initial gear when an instance of the same name is created
//! again. Every entry carries an expiry; expired entries read as absent.

use crate::error::{GearboxError, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

const KEY_PREFIX: &str = "gearbox_";

/// The store key for a named instance.
pub fn store_key(name: &str) -> String {
    format!("{KEY_PREFIX}{name}")
}

/// A string-keyed store for gear values.
pub trait GearStore: Send + Sync {
    /// Reads a gear, or `None` if it is absent or expired.
    fn load(&self, key: &str) -> Result<Option<u32>>;

    /// Writes a gear that should be forgotten after `expires_in`.
    fn save(&self, key: &str, gear: u32, expires_in: Duration) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct StoredGear {
    gear: u32,
    expires_at: DateTime<Utc>,
}

impl StoredGear {
    fn live(self, now: DateTime<Utc>) -> Option<u32> {
        (self.expires_at > now).then_some(self.gear)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| GearboxError::Store("store lock poisoned".to_string()))
}

/// Keeps gears in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, StoredGear>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GearStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<u32>> {
        let entries = lock(&self.entries)?;
        Ok(entries.get(key).and_then(|entry| entry.live(Utc::now())))
    }

    fn save(&self, key: &str, gear: u32, expires_in: Duration) -> Result<()> {
        let entry = StoredGear {
            gear,
            expires_at: Utc::now() + expires_in,
        };
        lock(&self.entries)?.insert(key.to_string(), entry);
        Ok(())
    }
}

/// Keeps gears in a JSON file, rewritten on every save.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sibling file the next snapshot is written to before it replaces the
    /// store, so readers never see a partial write.
    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn read_entries(&self) -> Result<HashMap<String, StoredGear>> {
        match fs::read_to_string(&self.path) {
            Ok(text) if text.trim().is_empty() => Ok(HashMap::new()),
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(HashMap::new()),
            Err(err) => Err(err.into()),
        }
    }
}

impl GearStore for FileStore {
    fn load(&self, key: &str) -> Result<Option<u32>> {
        let entries = self.read_entries()?;
        Ok(entries.get(key).and_then(|entry| entry.live(Utc::now())))
    }

    fn save(&self, key: &str, gear: u32, expires_in: Duration) -> Result<()> {
        let _guard = lock(&self.write_lock)?;
        let now = Utc::now();
        let mut entries = self.read_entries()?;
        entries.retain(|_, entry| entry.expires_at > now);
        entries.insert(
            key.to_string(),
            StoredGear {
                gear,
                expires_at: now + expires_in,
            },
        );
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let staging = self.staging_path();
        fs::write(&staging, serde_json::to_string_pretty(&entries)?)?;
        fs::rename(&staging, &self.path)?;
        debug!(path = %self.path.display(), key, gear, "gear saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_namespaced() {
        assert_eq!(store_key("poller"), "gearbox_poller");
    }

    #[test]
    fn memory_store_round_trips_live_entries() {
        let store = MemoryStore::new();
        assert_eq!(store.load("gearbox_a").unwrap(), None);
        store.save("gearbox_a", 4, Duration::days(1)).unwrap();
        assert_eq!(store.load("gearbox_a").unwrap(), Some(4));
        store.save("gearbox_a", 6, Duration::days(1)).unwrap();
        assert_eq!(store.load("gearbox_a").unwrap(), Some(6));
    }

    #[test]
    fn expired_entries_read_as_absent() {
        let store = MemoryStore::new();
        store.save("gearbox_old", 3, Duration::seconds(-1)).unwrap();
        assert_eq!(store.load("gearbox_old").unwrap(), None);
    }

    #[test]
    fn file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("gears.json");

        let first = FileStore::new(&path);
        assert_eq!(first.load("gearbox_x").unwrap(), None);
        first.save("gearbox_x", 7, Duration::days(365)).unwrap();
        first.save("gearbox_y", 2, Duration::days(365)).unwrap();

        let second = FileStore::new(&path);
        assert_eq!(second.load("gearbox_x").unwrap(), Some(7));
        assert_eq!(second.load("gearbox_y").unwrap(), Some(2));
    }

    #[test]
    fn file_store_replaces_the_file_in_one_step() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gears.json");
        let store = FileStore::new(&path);
        store.save("gearbox_a", 3, Duration::days(1)).unwrap();
        store.save("gearbox_b", 5, Duration::days(1)).unwrap();

        assert!(!dir.path().join("gears.json.tmp").exists());
        let files: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
        let on_disk: HashMap<String, StoredGear> =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk["gearbox_b"].gear, 5);
    }

    #[test]
    fn file_store_reports_corrupt_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gears.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(
            FileStore::new(&path).load("gearbox_x"),
            Err(GearboxError::Json(_))
        ));
    }
}
