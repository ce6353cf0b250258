//! Keyed settings persistence.
//!
//! Each setting lives under its own key; values are JSON. The file-backed
//! store keeps the whole map in one file, written atomically on every
//! change with proper file locking.

use crate::{Error, Result};
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Keys under which the tracker persists its state
pub mod keys {
    pub const SCHEMA_VERSION: &str = "schemaVersion";
    pub const LESSONS: &str = "lessons";
    pub const COLLECTIONS: &str = "collections";
    pub const APP_TITLE: &str = "appTitle";
    pub const THEME: &str = "theme";
    pub const STREAK: &str = "streakData";
    pub const HIDE_COMPLETED: &str = "hideCompleted";
    pub const REVIEW_MODE: &str = "reviewModeEnabled";
    pub const CUSTOM_ARTWORK: &str = "customArtwork";
    pub const COMPLETION_SOUND: &str = "completionSound";
    pub const COLLECTIONS_VIEW: &str = "useCollectionsView";
    pub const PLAY_ON_NAVIGATE: &str = "playOnNavigate";
}

/// Typed get-with-default / set persistence
pub trait SettingsStore {
    fn get_raw(&self, key: &str) -> Option<Value>;
    fn set_raw(&mut self, key: &str, value: Value) -> Result<()>;
    fn remove(&mut self, key: &str) -> Result<()>;
    fn is_empty(&self) -> bool;

    /// Write several keys; stores that can batch override this
    fn set_many(&mut self, entries: Vec<(&str, Value)>) -> Result<()> {
        for (key, value) in entries {
            self.set_raw(key, value)?;
        }
        Ok(())
    }

    fn contains(&self, key: &str) -> bool {
        self.get_raw(key).is_some()
    }

    /// Read a value, falling back to `default` when absent or unparsable
    fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> T
    where
        Self: Sized,
    {
        match self.get_raw(key) {
            None => default,
            Some(value) => match serde_json::from_value(value) {
                Ok(parsed) => parsed,
                Err(e) => {
                    tracing::warn!("Ignoring unparsable setting {}: {}", key, e);
                    default
                }
            },
        }
    }

    fn set<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> Result<()>
    where
        Self: Sized,
    {
        let value = serde_json::to_value(value)?;
        self.set_raw(key, value)
    }
}

/// Settings persisted to a single JSON file
#[derive(Debug)]
pub struct JsonSettingsStore {
    path: PathBuf,
    entries: Map<String, Value>,
}

impl JsonSettingsStore {
    /// Open the store at `path`
    ///
    /// A missing file yields an empty store. A corrupted file is logged and
    /// treated as empty; it is replaced on the next write.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = Self::read_entries(&path)?;
        tracing::debug!("Opened settings store {:?} ({} keys)", path, entries.len());
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(path: &Path) -> Result<Map<String, Value>> {
        if !path.exists() {
            tracing::info!("No settings file found, starting empty");
            return Ok(Map::new());
        }

        let file = File::open(path)?;
        file.lock_shared()?;

        let mut contents = String::new();
        let read = std::io::BufReader::new(&file).read_to_string(&mut contents);
        file.unlock()?;
        read?;

        match serde_json::from_str::<Value>(&contents) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => {
                tracing::warn!("Settings file {:?} is not an object. Using defaults.", path);
                Ok(Map::new())
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to parse settings file {:?}: {}. Using defaults.",
                    path,
                    e
                );
                Ok(Map::new())
            }
        }
    }

    /// Atomically replace the settings file with the current map
    fn save(&self) -> Result<()> {
        let parent = self.path.parent().ok_or_else(|| {
            Error::Storage(format!("settings path {:?} has no parent", self.path))
        })?;
        std::fs::create_dir_all(parent)?;

        let temp = NamedTempFile::new_in(parent)?;
        temp.as_file().lock_exclusive()?;
        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            serde_json::to_writer(&mut writer, &self.entries)?;
            writer.flush()?;
        }
        temp.as_file().sync_all()?;
        temp.as_file().unlock()?;

        temp.persist(&self.path).map_err(|e| Error::Io(e.error))?;
        tracing::debug!("Saved settings to {:?}", self.path);
        Ok(())
    }
}

impl SettingsStore for JsonSettingsStore {
    fn get_raw(&self, key: &str) -> Option<Value> {
        self.entries.get(key).cloned()
    }

    fn set_raw(&mut self, key: &str, value: Value) -> Result<()> {
        self.entries.insert(key.to_string(), value);
        self.save()
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        if self.entries.remove(key).is_some() {
            self.save()?;
        }
        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn set_many(&mut self, entries: Vec<(&str, Value)>) -> Result<()> {
        for (key, value) in entries {
            self.entries.insert(key.to_string(), value);
        }
        self.save()
    }
}

/// In-memory settings with optional write failures
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    entries: Map<String, Value>,
    pub fail_writes: bool,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn get_raw(&self, key: &str) -> Option<Value> {
        self.entries.get(key).cloned()
    }

    fn set_raw(&mut self, key: &str, value: Value) -> Result<()> {
        // The value is kept even when the write "fails", matching a store
        // whose in-memory cache is ahead of disk.
        self.entries.insert(key.to_string(), value);
        if self.fail_writes {
            return Err(Error::Storage(format!("write of {} rejected", key)));
        }
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        if self.fail_writes {
            return Err(Error::Storage(format!("removal of {} rejected", key)));
        }
        self.entries.remove(key);
        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_reopen_roundtrip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("settings.json");

        let mut store = JsonSettingsStore::open(&path).unwrap();
        store.set(keys::APP_TITLE, "Spanish").unwrap();
        store.set(keys::HIDE_COMPLETED, &true).unwrap();

        let reopened = JsonSettingsStore::open(&path).unwrap();
        assert_eq!(reopened.get(keys::APP_TITLE, String::new()), "Spanish");
        assert!(reopened.get(keys::HIDE_COMPLETED, false));
    }

    #[test]
    fn test_missing_and_unparsable_fall_back_to_default() {
        let mut store = MemorySettingsStore::new();
        assert_eq!(store.get(keys::THEME, "dark".to_string()), "dark");

        store.set_raw(keys::HIDE_COMPLETED, Value::from("yes")).unwrap();
        assert!(!store.get(keys::HIDE_COMPLETED, false));
    }

    #[test]
    fn test_corrupted_file_opens_empty() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("settings.json");
        std::fs::write(&path, "{ invalid json }").unwrap();

        let mut store = JsonSettingsStore::open(&path).unwrap();
        assert!(store.is_empty());

        // Next write replaces the corrupted file
        store.set(keys::THEME, "light").unwrap();
        let reopened = JsonSettingsStore::open(&path).unwrap();
        assert_eq!(reopened.get(keys::THEME, String::new()), "light");
    }

    #[test]
    fn test_set_many_writes_once_and_leaves_no_temp_files() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("settings.json");

        let mut store = JsonSettingsStore::open(&path).unwrap();
        store
            .set_many(vec![
                (keys::THEME, Value::from("light")),
                (keys::REVIEW_MODE, Value::from(true)),
            ])
            .unwrap();

        let extras: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name() != "settings.json")
            .collect();
        assert!(extras.is_empty(), "unexpected files: {:?}", extras);

        let reopened = JsonSettingsStore::open(&path).unwrap();
        assert!(reopened.get(keys::REVIEW_MODE, false));
    }

    #[test]
    fn test_remove_key() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("settings.json");
        let mut store = JsonSettingsStore::open(&path).unwrap();
        store.set(keys::THEME, "light").unwrap();
        store.remove(keys::THEME).unwrap();
        assert!(!store.contains(keys::THEME));
        assert!(!JsonSettingsStore::open(&path).unwrap().contains(keys::THEME));
    }
}
