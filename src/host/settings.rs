//! JSON-file backed global settings.
//!
//! Settings are a flat JSON object of keys to arbitrary values. Mounts may be
//! kept here as well, under [`MOUNTS_KEY`], as a mapping of item id to mount.

use crate::error::{MountError, MountResult};
use crate::host::items::write_atomically;
use crate::models::MountConfig;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Settings key holding item id → mount.
pub const MOUNTS_KEY: &str = "mongo_reader.mounts";

#[derive(Debug)]
pub struct SettingsStore {
    path: Option<PathBuf>,
    values: RwLock<Map<String, Value>>,
}

impl Default for SettingsStore {
    fn default() -> Self {
        Self::in_memory(Map::new())
    }
}

impl SettingsStore {
    pub fn in_memory(values: Map<String, Value>) -> Self {
        Self {
            path: None,
            values: RwLock::new(values),
        }
    }

    /// Load settings from `path`; a missing file is empty.
    pub async fn load(path: impl Into<PathBuf>) -> MountResult<Self> {
        let path = path.into();
        let values = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<Map<String, Value>>(&bytes).map_err(|e| {
                MountError::internal(format!(
                    "Invalid settings file {}: {}",
                    path.display(),
                    e
                ))
            })?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %path.display(), "Settings file not found, starting empty");
                Map::new()
            }
            Err(e) => {
                return Err(MountError::internal(format!(
                    "Failed to read settings file {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        Ok(Self {
            path: Some(path),
            values: RwLock::new(values),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        let values = self.values.read().await;
        values.get(key).cloned()
    }

    /// Set `key` and persist.
    pub async fn set(&self, key: impl Into<String>, value: Value) -> MountResult<()> {
        let mut values = self.values.write().await;
        values.insert(key.into(), value);
        self.persist(&values).await
    }

    /// Mounts stored under [`MOUNTS_KEY`]; empty if the key is absent.
    pub async fn mounts(&self) -> MountResult<HashMap<String, MountConfig>> {
        match self.get(MOUNTS_KEY).await {
            None | Some(Value::Null) => Ok(HashMap::new()),
            Some(value) => serde_json::from_value(value).map_err(|e| {
                MountError::internal(format!("Invalid {} setting: {}", MOUNTS_KEY, e))
            }),
        }
    }

    /// Add or replace one entry under [`MOUNTS_KEY`] and persist.
    pub async fn set_mount(&self, item_id: impl Into<String>, mount: MountConfig) -> MountResult<()> {
        let mut mounts = self.mounts().await?;
        mounts.insert(item_id.into(), mount);
        let value = serde_json::to_value(&mounts)
            .map_err(|e| MountError::internal(format!("Failed to encode mounts: {}", e)))?;
        self.set(MOUNTS_KEY, value).await
    }

    async fn persist(&self, values: &Map<String, Value>) -> MountResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let json = serde_json::to_vec_pretty(values)
            .map_err(|e| MountError::internal(format!("Failed to encode settings: {}", e)))?;
        write_atomically(path, &json).await?;
        debug!(path = %path.display(), "Persisted settings");
        Ok(())
    }
}
