//! Connections to mounted MongoDB servers.
//!
//! [`Connector`] opens a handle for a mount and [`CollectionHandle`] issues
//! read-only cursors against it. The MongoDB implementations live here; the
//! traits are the seam the connection cache and the interception handler are
//! written against.

use crate::error::{MountError, MountResult};
use crate::models::{MountConfig, QueryDescriptor};
use bson::Document;
use futures_util::future::BoxFuture;
use futures_util::stream::{BoxStream, StreamExt, TryStreamExt};
use mongodb::{Client, Collection};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Records produced by an open server-side cursor, in cursor order.
pub type RecordStream = BoxStream<'static, MountResult<Document>>;

/// Handle shared by every request for one mounted resource.
pub type SharedHandle = Arc<dyn CollectionHandle>;

/// An open handle to one external collection.
///
/// Implementations must allow independent concurrent reads.
pub trait CollectionHandle: Send + Sync {
    /// Open a cursor for the query. The returned stream owns the cursor.
    fn find<'a>(&'a self, query: &'a QueryDescriptor) -> BoxFuture<'a, MountResult<RecordStream>>;

    /// `database.collection`, for log lines.
    fn namespace(&self) -> String;
}

/// Opens collection handles for mounts.
pub trait Connector: Send + Sync {
    /// Connect to the mount's server, verify its database and select its collection.
    fn connect<'a>(&'a self, mount: &'a MountConfig) -> BoxFuture<'a, MountResult<SharedHandle>>;
}

/// Connector backed by the official MongoDB driver.
#[derive(Debug, Clone)]
pub struct MongoConnector {
    connect_timeout: Duration,
}

impl MongoConnector {
    /// Create a connector. `connect_timeout` bounds server selection.
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    async fn open(&self, mount: &MountConfig) -> MountResult<SharedHandle> {
        let uri = mount.connection_uri(self.connect_timeout)?;

        info!(address = %mount.address(), database = %mount.database, "Connecting to MongoDB");

        let client = Client::with_uri_str(&uri).await.map_err(|e| {
            MountError::connection(
                format!("Invalid connection settings for {}: {}", mount.address(), e),
                "Check the mount host and port",
            )
        })?;

        // The driver connects lazily, so listing databases is the reachability check.
        let databases = client.list_database_names().await.map_err(|e| {
            MountError::connection(
                format!(
                    "Could not connect to MongoDB server at {}: {}",
                    mount.address(),
                    e
                ),
                "Check that the MongoDB server is running and reachable",
            )
        })?;

        if !databases.iter().any(|name| name == &mount.database) {
            return Err(MountError::configuration(
                &mount.database,
                format!(
                    "Verify the database name exists on the server at {}",
                    mount.address()
                ),
            ));
        }

        // Collections are not verified; a missing one yields empty results.
        let collection = client
            .database(&mount.database)
            .collection::<Document>(&mount.collection);

        debug!(namespace = %collection.namespace(), "Selected collection");

        Ok(Arc::new(MongoCollectionHandle { collection }))
    }
}

impl Connector for MongoConnector {
    fn connect<'a>(&'a self, mount: &'a MountConfig) -> BoxFuture<'a, MountResult<SharedHandle>> {
        Box::pin(self.open(mount))
    }
}

/// Collection handle backed by the official MongoDB driver.
#[derive(Debug, Clone)]
pub struct MongoCollectionHandle {
    collection: Collection<Document>,
}

impl MongoCollectionHandle {
    /// Get the underlying collection for advanced operations
    pub fn inner(&self) -> &Collection<Document> {
        &self.collection
    }
}

impl CollectionHandle for MongoCollectionHandle {
    fn find<'a>(&'a self, query: &'a QueryDescriptor) -> BoxFuture<'a, MountResult<RecordStream>> {
        Box::pin(async move {
            debug!(
                namespace = %self.namespace(),
                filter = %query.filter,
                sort = %query.sort_document(),
                skip = query.skip,
                limit = query.limit,
                "Opening cursor"
            );

            let cursor = self
                .collection
                .find(query.filter.clone())
                .with_options(query.find_options())
                .await?;

            Ok(cursor.map_err(MountError::from).boxed())
        })
    }

    fn namespace(&self) -> String {
        self.collection.namespace().to_string()
    }
}
