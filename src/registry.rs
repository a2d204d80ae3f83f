//! Mapping of item id to mount configuration.
//!
//! The registry is what the download interceptor consults to decide whether a
//! request is its to answer. It is filled at startup from three sources, later
//! ones overriding earlier ones:
//!
//! 1. the `mongo_reader.mounts` settings entry
//! 2. the `mongo_mount` attribute of each item
//! 3. `--mount` arguments
//!
//! and updated by the mount creation endpoint afterwards.

use crate::config::MountSpec;
use crate::error::MountResult;
use crate::host::{ItemStore, SettingsStore};
use crate::models::MountConfig;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
pub struct MountRegistry {
    mounts: RwLock<HashMap<String, MountConfig>>,
}

impl MountRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry from persisted configuration and startup mounts.
    ///
    /// Mounts naming an item that does not exist are skipped with a warning.
    pub async fn load(
        items: &ItemStore,
        settings: &SettingsStore,
        startup: &[MountSpec],
    ) -> MountResult<Self> {
        let mut mounts = HashMap::new();

        for (item_id, mount) in settings.mounts().await? {
            if items.get(&item_id).await.is_err() {
                warn!(item_id = %item_id, "Skipping settings mount for unknown item");
                continue;
            }
            debug!(item_id = %item_id, mount = %mount, "Mount from settings");
            mounts.insert(item_id, mount);
        }

        for item in items.list().await {
            if let Some(mount) = item.mongo_mount {
                if let Some(previous) = mounts.insert(item.id.clone(), mount) {
                    debug!(item_id = %item.id, overridden = %previous, "Item attribute overrides settings mount");
                }
            }
        }

        for spec in startup {
            if items.get(&spec.item_id).await.is_err() {
                warn!(item_id = %spec.item_id, "Skipping startup mount for unknown item");
                continue;
            }
            debug!(item_id = %spec.item_id, mount = %spec.mount, "Mount from command line");
            mounts.insert(spec.item_id.clone(), spec.mount.clone());
        }

        info!(count = mounts.len(), "Mount registry loaded");

        Ok(Self {
            mounts: RwLock::new(mounts),
        })
    }

    /// Look up the mount for an item.
    pub async fn get(&self, item_id: &str) -> Option<MountConfig> {
        let mounts = self.mounts.read().await;
        mounts.get(item_id).cloned()
    }

    /// Register or replace a mount, returning the one it replaced.
    pub async fn insert(&self, item_id: impl Into<String>, mount: MountConfig) -> Option<MountConfig> {
        let mut mounts = self.mounts.write().await;
        mounts.insert(item_id.into(), mount)
    }

    pub async fn remove(&self, item_id: &str) -> Option<MountConfig> {
        let mut mounts = self.mounts.write().await;
        mounts.remove(item_id)
    }

    pub async fn len(&self) -> usize {
        self.mounts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
