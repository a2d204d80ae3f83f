//! HTTP transport for the item API.
//!
//! Routes:
//! - `GET /item/{id}`: item metadata
//! - `GET /item/{id}/download`: download event, then the stored file unless a
//!   handler took over
//! - `PUT /item/{id}/mount`: attach a MongoDB collection to the item

use crate::auth::{AuthConfig, Principal, auth_middleware};
use crate::db::{ConnectionCache, JsonArrayStream};
use crate::error::{MountError, MountResult};
use crate::handlers::MountHandler;
use crate::host::{DOWNLOAD_BEFORE, DownloadEvent, EventDispatcher, Interception, ItemStore};
use crate::models::{AccessLevel, CreateMountInput, Item};
use crate::transport::Transport;
use axum::{
    Extension, Json, Router,
    body::{Body, Bytes},
    extract::{Path, Query, State},
    http::header,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, put},
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{debug, error, info, warn};

/// Shared state of the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub items: Arc<ItemStore>,
    pub dispatcher: Arc<EventDispatcher>,
    pub mounts: Arc<MountHandler>,
}

/// Build the router with authentication applied to every route.
pub fn router(state: AppState, auth: Arc<AuthConfig>) -> Router {
    Router::new()
        .route("/item/{id}", get(get_item))
        .route("/item/{id}/download", get(download_item))
        .route("/item/{id}/mount", put(create_mount))
        .layer(middleware::from_fn_with_state(auth, auth_middleware))
        .with_state(state)
}

/// `GET /item/{id}`
pub async fn get_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Extension(principal): Extension<Principal>,
) -> MountResult<Json<Item>> {
    let item = state.items.get(&id).await?;
    state
        .items
        .check_access(&item, principal, AccessLevel::Read)?;
    Ok(Json(item))
}

/// `GET /item/{id}/download`
pub async fn download_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Extension(principal): Extension<Principal>,
    Query(params): Query<HashMap<String, String>>,
) -> MountResult<Response> {
    let item = state.items.get(&id).await?;
    state
        .items
        .check_access(&item, principal, AccessLevel::Read)?;

    let event = DownloadEvent::new(id, params);
    match state.dispatcher.dispatch(DOWNLOAD_BEFORE, &event).await {
        Interception::Handled(body) => Ok(json_stream_response(body)),
        Interception::Deferred => default_download(&item).await,
    }
}

/// `PUT /item/{id}/mount`
pub async fn create_mount(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Extension(principal): Extension<Principal>,
    body: Bytes,
) -> MountResult<Json<Item>> {
    let input: CreateMountInput = serde_json::from_slice(&body).map_err(|e| {
        MountError::validation(
            "body",
            String::from_utf8_lossy(&body),
            format!("invalid mount body: {}", e),
        )
    })?;

    let item = state.mounts.create_mount(&id, principal, input).await?;
    Ok(Json(item))
}

fn json_stream_response(body: JsonArrayStream) -> Response {
    (
        [(header::CONTENT_TYPE, "application/json")],
        Body::from_stream(body),
    )
        .into_response()
}

/// Serve the item's stored file.
async fn default_download(item: &Item) -> MountResult<Response> {
    let Some(file) = &item.file else {
        return Err(MountError::not_found(format!("{}/file", item.id)));
    };

    let contents = tokio::fs::read(&file.path).await.map_err(|e| {
        error!(item_id = %item.id, path = %file.path.display(), error = %e, "Failed to read stored file");
        MountError::internal(format!("Failed to read file for item {}", item.id))
    })?;

    debug!(item_id = %item.id, bytes = contents.len(), "Serving stored file");

    let disposition = format!(
        "attachment; filename=\"{}\"",
        file.name.replace(['"', '\\'], "_")
    );
    Ok((
        [
            (header::CONTENT_TYPE, file.mime_type.clone()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        contents,
    )
        .into_response())
}

/// HTTP transport implementation.
pub struct HttpTransport {
    state: AppState,
    auth: Arc<AuthConfig>,
    cache: Arc<ConnectionCache>,
    /// Host to bind to
    host: String,
    /// Port to bind to
    port: u16,
}

impl HttpTransport {
    /// Create a new HTTP transport.
    ///
    /// `cache` is closed once the server has stopped.
    pub fn new(
        state: AppState,
        auth: Arc<AuthConfig>,
        cache: Arc<ConnectionCache>,
        host: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            state,
            auth,
            cache,
            host: host.into(),
            port,
        }
    }

    /// Get the bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Transport for HttpTransport {
    async fn run(&self) -> MountResult<()> {
        let bind_addr = self.bind_addr();
        info!("Starting HTTP server on {}", bind_addr);

        let app = router(self.state.clone(), Arc::clone(&self.auth));

        let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
            MountError::connection(
                format!("Failed to bind to {}: {}", bind_addr, e),
                "Check that the port is available",
            )
        })?;

        // Slow clients can hold result streams open indefinitely, so force exit
        // after a timeout once shutdown is requested
        const GRACEFUL_TIMEOUT: Duration = Duration::from_secs(30);

        let shutdown_notify = Arc::new(tokio::sync::Notify::new());
        let shutdown_notify_clone = shutdown_notify.clone();

        let shutdown_signal = async move {
            wait_for_signal().await;
            shutdown_notify_clone.notify_one();
        };

        let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal);

        tokio::select! {
            result = server => {
                match result {
                    Ok(()) => info!("HTTP server stopped"),
                    Err(e) => {
                        error!(error = %e, "HTTP server error");
                        return Err(MountError::internal(format!("HTTP server error: {}", e)));
                    }
                }
            }
            _ = async {
                shutdown_notify.notified().await;
                info!(
                    timeout_secs = GRACEFUL_TIMEOUT.as_secs(),
                    "Waiting for downloads to finish (send signal again to force exit)..."
                );

                tokio::select! {
                    _ = tokio::time::sleep(GRACEFUL_TIMEOUT) => {
                        warn!("Graceful shutdown timeout, forcing exit");
                    }
                    _ = wait_for_signal() => {
                        warn!("Received second signal, forcing immediate exit");
                    }
                }
            } => {}
        }

        info!("Closing MongoDB connections");
        self.cache.close_all().await;

        Ok(())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Wait for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_signal() {
    let ctrl_c = signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{CollectionHandle, Connector, MongoConnector, RecordStream, SharedHandle};
    use crate::handlers::{DownloadInterceptor, HANDLER_NAME};
    use crate::models::{MountConfig, QueryDescriptor, StoredFile};
    use crate::registry::MountRegistry;
    use axum::http::StatusCode;
    use bson::doc;
    use futures_util::future::BoxFuture;
    use futures_util::stream::{self, StreamExt};
    use tempfile::TempDir;

    struct FixedHandle;

    impl CollectionHandle for FixedHandle {
        fn find<'a>(
            &'a self,
            _query: &'a QueryDescriptor,
        ) -> BoxFuture<'a, MountResult<RecordStream>> {
            Box::pin(async { Ok(stream::iter(vec![Ok(doc! { "name": "A" })]).boxed()) })
        }

        fn namespace(&self) -> String {
            "healthMap.records".to_string()
        }
    }

    struct FixedConnector;

    impl Connector for FixedConnector {
        fn connect<'a>(
            &'a self,
            _mount: &'a MountConfig,
        ) -> BoxFuture<'a, MountResult<SharedHandle>> {
            Box::pin(async { Ok(Arc::new(FixedHandle) as SharedHandle) })
        }
    }

    async fn state(items: Vec<Item>) -> AppState {
        let items = Arc::new(ItemStore::in_memory(items));
        let registry = Arc::new(MountRegistry::new());
        let connector: Arc<dyn Connector> = Arc::new(FixedConnector);
        let cache = Arc::new(ConnectionCache::new(connector.clone()));
        let dispatcher = Arc::new(EventDispatcher::new());
        dispatcher
            .bind(
                DOWNLOAD_BEFORE,
                HANDLER_NAME,
                Arc::new(DownloadInterceptor::new(registry.clone(), cache.clone())),
            )
            .await;
        let mounts = Arc::new(MountHandler::new(items.clone(), registry, cache, connector));
        AppState {
            items,
            dispatcher,
            mounts,
        }
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_http_transport_bind_addr() {
        let connector: Arc<dyn Connector> = Arc::new(MongoConnector::new(Duration::from_secs(1)));
        let cache = Arc::new(ConnectionCache::new(connector.clone()));
        let items = Arc::new(ItemStore::in_memory(vec![]));
        let registry = Arc::new(MountRegistry::new());
        let state = AppState {
            items: items.clone(),
            dispatcher: Arc::new(EventDispatcher::new()),
            mounts: Arc::new(MountHandler::new(items, registry, cache.clone(), connector)),
        };
        let transport = HttpTransport::new(state, Arc::new(AuthConfig::disabled()), cache, "0.0.0.0", 3000);
        assert_eq!(transport.name(), "http");
        assert_eq!(transport.bind_addr(), "0.0.0.0:3000");
    }

    #[tokio::test]
    async fn test_download_default_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.csv");
        tokio::fs::write(&path, b"a,b\n1,2\n").await.unwrap();
        let item = Item::new("a", "data").with_file(StoredFile {
            name: "data.csv".to_string(),
            mime_type: "text/csv".to_string(),
            path,
        });
        let state = state(vec![item]).await;

        let response = download_item(
            State(state),
            Path("a".to_string()),
            Extension(Principal::Admin),
            Query(HashMap::new()),
        )
        .await
        .unwrap();

        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/csv");
        assert_eq!(body_text(response).await, "a,b\n1,2\n");
    }

    #[tokio::test]
    async fn test_download_without_file() {
        let state = state(vec![Item::new("a", "empty")]).await;
        let err = download_item(
            State(state),
            Path("a".to_string()),
            Extension(Principal::Admin),
            Query(HashMap::new()),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_mount_then_download() {
        let state = state(vec![Item::new("a", "records")]).await;

        let body = Bytes::from_static(
            br#"{"host": "localhost", "port": "27017", "database": "healthMap", "collection": "records"}"#,
        );
        let Json(item) = create_mount(
            State(state.clone()),
            Path("a".to_string()),
            Extension(Principal::Admin),
            body,
        )
        .await
        .unwrap();
        assert!(item.mongo_mount.is_some());

        let response = download_item(
            State(state),
            Path("a".to_string()),
            Extension(Principal::Admin),
            Query(HashMap::new()),
        )
        .await
        .unwrap();
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        assert_eq!(body_text(response).await, "[\n{\"name\":\"A\"}\n]");
    }

    #[tokio::test]
    async fn test_mount_invalid_body() {
        let state = state(vec![Item::new("a", "records")]).await;
        let err = create_mount(
            State(state),
            Path("a".to_string()),
            Extension(Principal::Admin),
            Bytes::from_static(b"{not json"),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_private_item_hidden_from_anonymous() {
        let state = state(vec![Item::new("a", "private")]).await;
        let err = get_item(
            State(state),
            Path("a".to_string()),
            Extension(Principal::Anonymous),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
    }
}
