//! JSON file backed store.
//!
//! The whole store is one JSON object on disk, mirrored in memory. Every
//! mutation rewrites the file through a temp file and rename, so readers
//! never see a half-written document.

use crate::error::{StoreError, StoreResult};
use crate::store::KeyValueStore;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub struct JsonFileStore {
    path: PathBuf,
    entries: RwLock<Map<String, Value>>,
}

impl JsonFileStore {
    /// Open the store at `path`, starting empty if the file does not exist.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();

        let entries = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            if raw.trim().is_empty() {
                Map::new()
            } else {
                match serde_json::from_str::<Value>(&raw) {
                    Ok(Value::Object(map)) => map,
                    Ok(_) => {
                        return Err(StoreError::Corrupt(format!(
                            "{} does not contain a JSON object",
                            path.display()
                        )))
                    }
                    Err(e) => {
                        return Err(StoreError::Corrupt(format!("{}: {e}", path.display())))
                    }
                }
            }
        } else {
            Map::new()
        };

        info!(path = %path.display(), keys = entries.len(), "Settings store opened");
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &Map<String, Value>) -> StoreResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), keys = entries.len(), "Settings store persisted");
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> StoreResult<()> {
        let mut entries = self.entries.write();
        let previous = entries.insert(key.to_string(), value);
        if let Err(e) = self.persist(&entries) {
            // Keep memory consistent with disk
            match previous {
                Some(previous) => entries.insert(key.to_string(), previous),
                None => entries.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut entries = self.entries.write();
        let Some(previous) = entries.remove(key) else {
            return Ok(false);
        };
        if let Err(e) = self.persist(&entries) {
            entries.insert(key.to_string(), previous);
            return Err(e);
        }
        Ok(true)
    }

    fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.read().keys().cloned().collect();
        keys.sort();
        keys
    }
}
