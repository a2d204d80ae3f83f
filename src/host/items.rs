//! JSON-file backed item store.
//!
//! The file holds a JSON array of items. A missing file is an empty store;
//! writes replace the file through a temporary sibling.

use crate::auth::Principal;
use crate::error::{MountError, MountResult};
use crate::models::{AccessLevel, Item, MountConfig};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Debug)]
pub struct ItemStore {
    path: Option<PathBuf>,
    items: RwLock<HashMap<String, Item>>,
}

impl ItemStore {
    /// A store that is never written to disk.
    pub fn in_memory(items: impl IntoIterator<Item = Item>) -> Self {
        Self {
            path: None,
            items: RwLock::new(index(items)),
        }
    }

    /// Load the store from `path`.
    pub async fn load(path: impl Into<PathBuf>) -> MountResult<Self> {
        let path = path.into();
        let items = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<Vec<Item>>(&bytes).map_err(|e| {
                MountError::internal(format!(
                    "Invalid items file {}: {}",
                    path.display(),
                    e
                ))
            })?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %path.display(), "Items file not found, starting empty");
                Vec::new()
            }
            Err(e) => {
                return Err(MountError::internal(format!(
                    "Failed to read items file {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        debug!(path = %path.display(), count = items.len(), "Loaded items");

        Ok(Self {
            path: Some(path),
            items: RwLock::new(index(items)),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Get an item by id.
    pub async fn get(&self, id: &str) -> MountResult<Item> {
        let items = self.items.read().await;
        items.get(id).cloned().ok_or_else(|| MountError::not_found(id))
    }

    /// All items, ordered by id.
    pub async fn list(&self) -> Vec<Item> {
        let items = self.items.read().await;
        let mut all: Vec<Item> = items.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Insert or replace an item and persist the store.
    pub async fn insert(&self, item: Item) -> MountResult<()> {
        let mut items = self.items.write().await;
        items.insert(item.id.clone(), item);
        self.persist(&items).await
    }

    /// Attach `mount` to an item and persist the store.
    ///
    /// Returns the updated item and the mount it replaced, if any.
    pub async fn set_mount(
        &self,
        id: &str,
        mount: MountConfig,
    ) -> MountResult<(Item, Option<MountConfig>)> {
        let mut items = self.items.write().await;
        let item = items.get_mut(id).ok_or_else(|| MountError::not_found(id))?;
        let previous = item.mongo_mount.replace(mount);
        let updated = item.clone();

        if let Err(e) = self.persist(&items).await {
            // Keep memory consistent with the file
            if let Some(item) = items.get_mut(id) {
                item.mongo_mount = previous;
            }
            return Err(e);
        }

        Ok((updated, previous))
    }

    /// Check that `principal` may access `item` at `level`.
    pub fn check_access(
        &self,
        item: &Item,
        principal: Principal,
        level: AccessLevel,
    ) -> MountResult<()> {
        if principal.allows(level, item.public) {
            Ok(())
        } else {
            Err(MountError::permission(
                format!("{} item {}", level, item.id),
                format!("{} access required", level),
            ))
        }
    }

    async fn persist(&self, items: &HashMap<String, Item>) -> MountResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let mut ordered: Vec<&Item> = items.values().collect();
        ordered.sort_by(|a, b| a.id.cmp(&b.id));
        let json = serde_json::to_vec_pretty(&ordered)
            .map_err(|e| MountError::internal(format!("Failed to encode items: {}", e)))?;

        write_atomically(path, &json).await?;
        debug!(path = %path.display(), count = ordered.len(), "Persisted items");
        Ok(())
    }
}

fn index(items: impl IntoIterator<Item = Item>) -> HashMap<String, Item> {
    items
        .into_iter()
        .map(|item| (item.id.clone(), item))
        .collect()
}

/// Write `contents` to a temporary sibling of `path`, then rename it over `path`.
pub(crate) async fn write_atomically(path: &Path, contents: &[u8]) -> MountResult<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, contents).await.map_err(|e| {
        MountError::internal(format!("Failed to write {}: {}", tmp.display(), e))
    })?;
    tokio::fs::rename(&tmp, path).await.map_err(|e| {
        MountError::internal(format!("Failed to replace {}: {}", path.display(), e))
    })
}
