//! Process-wide cache of collection handles keyed by resource identifier.
//!
//! # Design Decisions
//!
//! - **`OnceCell` per resource id**: single-flight creation. Concurrent first
//!   requests for the same resource wait for one connection attempt instead of
//!   racing and leaking duplicate clients.
//! - **Failed creation leaves the cell empty**: the next request retries.
//! - **Reuse is unconditional**: a cached handle is returned even when the
//!   caller's mount differs from the one it was created with. Replacing a
//!   mount must go through [`ConnectionCache::invalidate`].
//!
//! # Concurrency Safety
//!
//! - The map lock is never held across the connection attempt.
//! - Read lock for lookups, write lock only to insert a new empty cell, with a
//!   double-check after acquiring it.
//! - An invalidated handle stays alive for streams that already hold it and is
//!   dropped when the last of them finishes.

use crate::db::connector::{Connector, SharedHandle};
use crate::error::{MountError, MountResult};
use crate::models::MountConfig;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info, warn};

/// A cached handle and the mount it was created for.
struct CachedHandle {
    handle: SharedHandle,
    mount: MountConfig,
    created_at: Instant,
}

impl std::fmt::Debug for CachedHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedHandle")
            .field("namespace", &self.handle.namespace())
            .field("mount", &self.mount)
            .field("created_at", &self.created_at)
            .finish()
    }
}

pub struct ConnectionCache {
    connector: Arc<dyn Connector>,
    handles: RwLock<HashMap<String, Arc<OnceCell<CachedHandle>>>>,
}

impl std::fmt::Debug for ConnectionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionCache").finish_non_exhaustive()
    }
}

impl ConnectionCache {
    /// Create an empty cache that opens handles with `connector`.
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            handles: RwLock::new(HashMap::new()),
        }
    }

    /// Get the handle for `resource_id`, creating it from `mount` on first use.
    pub async fn get_collection_handle(
        &self,
        resource_id: &str,
        mount: &MountConfig,
    ) -> MountResult<SharedHandle> {
        let cell = self.cell_for(resource_id).await;

        let entry = cell
            .get_or_try_init(|| async {
                debug!(resource_id = %resource_id, mount = %mount, "Creating collection handle");
                let handle = self.connector.connect(mount).await?;
                info!(
                    resource_id = %resource_id,
                    namespace = %handle.namespace(),
                    "Collection handle cached"
                );
                Ok::<_, MountError>(CachedHandle {
                    handle,
                    mount: mount.clone(),
                    created_at: Instant::now(),
                })
            })
            .await?;

        if entry.mount != *mount {
            warn!(
                resource_id = %resource_id,
                cached = %entry.mount,
                requested = %mount,
                "Mount changed since the handle was cached; reusing cached handle"
            );
        }

        Ok(Arc::clone(&entry.handle))
    }

    /// Get or insert the cell for a resource id.
    async fn cell_for(&self, resource_id: &str) -> Arc<OnceCell<CachedHandle>> {
        {
            let handles = self.handles.read().await;
            if let Some(cell) = handles.get(resource_id) {
                return Arc::clone(cell);
            }
        }

        let mut handles = self.handles.write().await;
        // Double-check after acquiring write lock
        Arc::clone(
            handles
                .entry(resource_id.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new())),
        )
    }

    /// Forget the handle for `resource_id` so the next request reconnects.
    ///
    /// Returns true if an open handle was dropped from the cache.
    pub async fn invalidate(&self, resource_id: &str) -> bool {
        let removed = {
            let mut handles = self.handles.write().await;
            handles.remove(resource_id)
        };

        let had_handle = removed.is_some_and(|cell| cell.initialized());
        if had_handle {
            info!(resource_id = %resource_id, "Invalidated cached collection handle");
        }
        had_handle
    }

    /// Check whether an open handle is cached for `resource_id`.
    pub async fn contains(&self, resource_id: &str) -> bool {
        let handles = self.handles.read().await;
        handles
            .get(resource_id)
            .is_some_and(|cell| cell.initialized())
    }

    /// Number of open handles (initialized cells).
    pub async fn handle_count(&self) -> usize {
        let handles = self.handles.read().await;
        handles.values().filter(|cell| cell.initialized()).count()
    }

    /// Drop every cached handle.
    pub async fn close_all(&self) {
        let drained: Vec<_> = {
            let mut handles = self.handles.write().await;
            handles.drain().collect()
        };

        for (resource_id, cell) in drained {
            if let Some(entry) = cell.get() {
                info!(
                    resource_id = %resource_id,
                    namespace = %entry.handle.namespace(),
                    "Closing collection handle"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connector::{CollectionHandle, RecordStream};
    use crate::models::QueryDescriptor;
    use futures_util::future::BoxFuture;
    use futures_util::stream::{self, StreamExt};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct EmptyHandle(String);

    impl CollectionHandle for EmptyHandle {
        fn find<'a>(
            &'a self,
            _query: &'a QueryDescriptor,
        ) -> BoxFuture<'a, MountResult<RecordStream>> {
            Box::pin(async { Ok(stream::empty().boxed()) })
        }

        fn namespace(&self) -> String {
            self.0.clone()
        }
    }

    #[derive(Default)]
    struct CountingConnector {
        connects: AtomicUsize,
        fail: bool,
    }

    impl Connector for CountingConnector {
        fn connect<'a>(
            &'a self,
            mount: &'a MountConfig,
        ) -> BoxFuture<'a, MountResult<SharedHandle>> {
            Box::pin(async move {
                self.connects.fetch_add(1, Ordering::SeqCst);
                if self.fail {
                    return Err(MountError::connection("refused", "start the server"));
                }
                let namespace = format!("{}.{}", mount.database, mount.collection);
                Ok(Arc::new(EmptyHandle(namespace)) as SharedHandle)
            })
        }
    }

    fn mount(collection: &str) -> MountConfig {
        MountConfig::new("localhost", 27017, "healthMap", collection)
    }

    #[tokio::test]
    async fn test_cache_creation() {
        let cache = ConnectionCache::new(Arc::new(CountingConnector::default()));
        assert_eq!(cache.handle_count().await, 0);
        assert!(!cache.contains("item").await);
    }

    #[tokio::test]
    async fn test_handle_reused() {
        let connector = Arc::new(CountingConnector::default());
        let cache = ConnectionCache::new(connector.clone());

        let first = cache.get_collection_handle("item", &mount("records")).await.unwrap();
        let second = cache.get_collection_handle("item", &mount("records")).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stale_mount_returns_cached_handle() {
        let connector = Arc::new(CountingConnector::default());
        let cache = ConnectionCache::new(connector.clone());

        cache.get_collection_handle("item", &mount("records")).await.unwrap();
        let handle = cache.get_collection_handle("item", &mount("other")).await.unwrap();

        assert_eq!(handle.namespace(), "healthMap.records");
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_reconnect() {
        let connector = Arc::new(CountingConnector::default());
        let cache = ConnectionCache::new(connector.clone());

        cache.get_collection_handle("item", &mount("records")).await.unwrap();
        assert!(cache.invalidate("item").await);
        assert!(!cache.invalidate("item").await);

        let handle = cache.get_collection_handle("item", &mount("other")).await.unwrap();
        assert_eq!(handle.namespace(), "healthMap.other");
        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_connect_is_not_cached() {
        let connector = Arc::new(CountingConnector {
            fail: true,
            ..CountingConnector::default()
        });
        let cache = ConnectionCache::new(connector.clone());

        for _ in 0..2 {
            let result = cache.get_collection_handle("item", &mount("records")).await;
            assert!(matches!(result, Err(MountError::Connection { .. })));
        }
        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
        assert_eq!(cache.handle_count().await, 0);
    }

    #[tokio::test]
    async fn test_close_all() {
        let cache = ConnectionCache::new(Arc::new(CountingConnector::default()));
        cache.get_collection_handle("a", &mount("records")).await.unwrap();
        cache.get_collection_handle("b", &mount("records")).await.unwrap();
        assert_eq!(cache.handle_count().await, 2);

        cache.close_all().await;
        assert_eq!(cache.handle_count().await, 0);
    }
}
