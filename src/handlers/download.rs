//! Download interception for mounted items.
//!
//! Bound to [`DOWNLOAD_BEFORE`](crate::host::DOWNLOAD_BEFORE). For an item
//! with a mount, the download body is replaced by the mounted collection
//! streamed as a JSON array, filtered and paged by the request parameters.
//! For any other item the handler defers without side effects.

use crate::db::{ConnectionCache, JsonArrayStream, OpenStreams, stream_results};
use crate::error::MountResult;
use crate::host::{DownloadEvent, DownloadHandler, Interception};
use crate::registry::MountRegistry;
use crate::translator::parse_query;
use futures_util::future::BoxFuture;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Handler name used when binding to the download event.
pub const HANDLER_NAME: &str = "mongo_reader.download";

pub struct DownloadInterceptor {
    registry: Arc<MountRegistry>,
    cache: Arc<ConnectionCache>,
    streams: OpenStreams,
}

impl DownloadInterceptor {
    /// Create a new download interceptor.
    pub fn new(registry: Arc<MountRegistry>, cache: Arc<ConnectionCache>) -> Self {
        Self {
            registry,
            cache,
            streams: OpenStreams::new(),
        }
    }

    /// Gauge of result streams this interceptor has produced and that are still open.
    pub fn open_streams(&self) -> &OpenStreams {
        &self.streams
    }

    /// Run the pipeline for `event`.
    ///
    /// Returns `Ok(None)` when the item has no mount. The caller's parameters
    /// are not modified.
    pub async fn try_intercept(&self, event: &DownloadEvent) -> MountResult<Option<JsonArrayStream>> {
        let Some(mount) = self.registry.get(&event.resource_id).await else {
            return Ok(None);
        };

        let query = parse_query(&event.params)?;
        debug!(
            resource_id = %event.resource_id,
            filter = %query.filter,
            skip = query.skip,
            limit = query.limit,
            "Translated download parameters"
        );

        let handle = self
            .cache
            .get_collection_handle(&event.resource_id, &mount)
            .await?;
        let records = handle.find(&query).await?;

        info!(
            resource_id = %event.resource_id,
            namespace = %handle.namespace(),
            "Streaming mounted collection"
        );

        Ok(Some(
            self.streams
                .track(event.resource_id.clone(), stream_results(records)),
        ))
    }

    /// Run the pipeline, turning every failure into [`Interception::Deferred`].
    pub async fn intercept(&self, event: &DownloadEvent) -> Interception {
        match self.try_intercept(event).await {
            Ok(Some(body)) => Interception::Handled(body),
            Ok(None) => Interception::Deferred,
            Err(e) => {
                error!(
                    resource_id = %event.resource_id,
                    code = e.code(),
                    error = %e,
                    "Mounted download failed, falling back to default handler"
                );
                Interception::Deferred
            }
        }
    }
}

impl DownloadHandler for DownloadInterceptor {
    fn handle<'a>(&'a self, event: &'a DownloadEvent) -> BoxFuture<'a, Interception> {
        Box::pin(self.intercept(event))
    }
}
