//! Mount creation.
//!
//! Attaches a MongoDB collection to an item. The mount is persisted as the
//! item's `mongo_mount` attribute and registered for download interception
//! immediately. Connecting is deferred to the first download unless the
//! caller asks for verification.

use crate::auth::Principal;
use crate::db::{ConnectionCache, Connector};
use crate::error::MountResult;
use crate::host::ItemStore;
use crate::models::{AccessLevel, CreateMountInput, Item};
use crate::registry::MountRegistry;
use std::sync::Arc;
use tracing::{debug, info};

pub struct MountHandler {
    items: Arc<ItemStore>,
    registry: Arc<MountRegistry>,
    cache: Arc<ConnectionCache>,
    connector: Arc<dyn Connector>,
}

impl MountHandler {
    /// Create a new mount handler.
    ///
    /// `connector` is only used to verify mounts on request; cached
    /// connections come from `cache`.
    pub fn new(
        items: Arc<ItemStore>,
        registry: Arc<MountRegistry>,
        cache: Arc<ConnectionCache>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            items,
            registry,
            cache,
            connector,
        }
    }

    /// Attach a mount to `resource_id` and return the updated item.
    ///
    /// Requires admin access to the item. All four mount fields must be
    /// present. Replacing a different mount drops the cached connection for
    /// the item so the next download uses the new configuration.
    pub async fn create_mount(
        &self,
        resource_id: &str,
        principal: Principal,
        input: CreateMountInput,
    ) -> MountResult<Item> {
        let item = self.items.get(resource_id).await?;
        self.items
            .check_access(&item, principal, AccessLevel::Admin)?;

        let verify = input.verify;
        let mount = input.into_config()?;

        if verify {
            // Connect once without caching
            let handle = self.connector.connect(&mount).await?;
            debug!(resource_id = %resource_id, namespace = %handle.namespace(), "Mount verified");
        }

        let (updated, previous) = self.items.set_mount(resource_id, mount.clone()).await?;
        let registered = self.registry.insert(resource_id, mount.clone()).await;

        let replaced = previous.iter().chain(registered.iter()).any(|old| *old != mount);
        if replaced && self.cache.invalidate(resource_id).await {
            info!(resource_id = %resource_id, "Dropped cached connection for replaced mount");
        }

        info!(
            resource_id = %resource_id,
            mount = %mount,
            verified = verify,
            "Mount created"
        );

        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{CollectionHandle, RecordStream, SharedHandle};
    use crate::error::MountError;
    use crate::models::{MountConfig, PortInput, QueryDescriptor};
    use futures_util::future::BoxFuture;
    use futures_util::stream::{self, StreamExt};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NullHandle;

    impl CollectionHandle for NullHandle {
        fn find<'a>(
            &'a self,
            _query: &'a QueryDescriptor,
        ) -> BoxFuture<'a, MountResult<RecordStream>> {
            Box::pin(async { Ok(stream::empty().boxed()) })
        }

        fn namespace(&self) -> String {
            "healthMap.records".to_string()
        }
    }

    #[derive(Default)]
    struct StubConnector {
        connects: AtomicUsize,
        missing_database: bool,
    }

    impl Connector for StubConnector {
        fn connect<'a>(
            &'a self,
            mount: &'a MountConfig,
        ) -> BoxFuture<'a, MountResult<SharedHandle>> {
            Box::pin(async move {
                self.connects.fetch_add(1, Ordering::SeqCst);
                if self.missing_database {
                    return Err(MountError::configuration(&mount.database, "no such database"));
                }
                Ok(Arc::new(NullHandle) as SharedHandle)
            })
        }
    }

    struct Fixture {
        handler: MountHandler,
        items: Arc<ItemStore>,
        registry: Arc<MountRegistry>,
        cache: Arc<ConnectionCache>,
        connector: Arc<StubConnector>,
    }

    fn fixture(connector: StubConnector) -> Fixture {
        let items = Arc::new(ItemStore::in_memory(vec![Item::new("a", "records")]));
        let registry = Arc::new(MountRegistry::new());
        let connector = Arc::new(connector);
        let cache = Arc::new(ConnectionCache::new(connector.clone()));
        let handler = MountHandler::new(
            items.clone(),
            registry.clone(),
            cache.clone(),
            connector.clone(),
        );
        Fixture {
            handler,
            items,
            registry,
            cache,
            connector,
        }
    }

    fn input(collection: &str) -> CreateMountInput {
        CreateMountInput {
            host: Some("localhost".to_string()),
            port: Some(PortInput::Number(27017)),
            database: Some("healthMap".to_string()),
            collection: Some(collection.to_string()),
            verify: false,
        }
    }

    #[tokio::test]
    async fn test_create_mount() {
        let f = fixture(StubConnector::default());
        let item = f
            .handler
            .create_mount("a", Principal::Admin, input("records"))
            .await
            .unwrap();

        let expected = MountConfig::new("localhost", 27017, "healthMap", "records");
        assert_eq!(item.mongo_mount, Some(expected.clone()));
        assert_eq!(f.registry.get("a").await, Some(expected.clone()));
        assert_eq!(f.items.get("a").await.unwrap().mongo_mount, Some(expected));
        assert_eq!(f.connector.connects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_requires_admin() {
        let f = fixture(StubConnector::default());
        let err = f
            .handler
            .create_mount("a", Principal::Anonymous, input("records"))
            .await
            .unwrap_err();
        assert!(matches!(err, MountError::Permission { .. }));
        assert_eq!(f.registry.get("a").await, None);
    }

    #[tokio::test]
    async fn test_missing_field() {
        let f = fixture(StubConnector::default());
        let mut body = input("records");
        body.database = None;

        let err = f
            .handler
            .create_mount("a", Principal::Admin, body)
            .await
            .unwrap_err();
        assert!(matches!(err, MountError::Validation { ref field, .. } if field == "database"));
    }

    #[tokio::test]
    async fn test_unknown_item() {
        let f = fixture(StubConnector::default());
        let err = f
            .handler
            .create_mount("missing", Principal::Admin, input("records"))
            .await
            .unwrap_err();
        assert!(matches!(err, MountError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_verify_failure_not_persisted() {
        let f = fixture(StubConnector {
            missing_database: true,
            ..StubConnector::default()
        });
        let mut body = input("records");
        body.verify = true;

        let err = f
            .handler
            .create_mount("a", Principal::Admin, body)
            .await
            .unwrap_err();
        assert!(matches!(err, MountError::Configuration { .. }));
        assert_eq!(f.items.get("a").await.unwrap().mongo_mount, None);
        assert_eq!(f.cache.handle_count().await, 0);
    }

    #[tokio::test]
    async fn test_replacing_mount_invalidates_cache() {
        let f = fixture(StubConnector::default());
        let first = MountConfig::new("localhost", 27017, "healthMap", "records");
        f.handler
            .create_mount("a", Principal::Admin, input("records"))
            .await
            .unwrap();
        f.cache.get_collection_handle("a", &first).await.unwrap();

        // Same mount again keeps the connection
        f.handler
            .create_mount("a", Principal::Admin, input("records"))
            .await
            .unwrap();
        assert!(f.cache.contains("a").await);

        f.handler
            .create_mount("a", Principal::Admin, input("other"))
            .await
            .unwrap();
        assert!(!f.cache.contains("a").await);
    }
}
