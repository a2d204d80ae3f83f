//! Mongo reader - Main entry point.
//!
//! Serves content items over HTTP. Downloads of items with a MongoDB mount
//! stream the mounted collection as a JSON array instead of the stored file.

use clap::Parser;
use mongo_reader::auth::AuthConfig;
use mongo_reader::config::Config;
use mongo_reader::db::{ConnectionCache, Connector, MongoConnector};
use mongo_reader::handlers::{DownloadInterceptor, HANDLER_NAME, MountHandler};
use mongo_reader::host::{DOWNLOAD_BEFORE, EventDispatcher, ItemStore, SettingsStore};
use mongo_reader::registry::MountRegistry;
use mongo_reader::transport::{AppState, HttpTransport, Transport};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration from command line and environment
    let config = Config::parse();

    // Initialize logging
    init_tracing(&config);

    info!(
        items = %config.items_file.display(),
        settings = %config.settings_file.display(),
        "Starting mongo reader v{}",
        env!("CARGO_PKG_VERSION")
    );

    let startup_mounts = config.parse_mounts()?;
    let auth = AuthConfig::from_tokens(config.auth_tokens.clone())?;
    if auth.is_enabled() {
        info!(tokens = auth.token_count(), "Bearer authentication enabled");
    } else {
        info!("No auth tokens configured, every caller is an administrator");
    }

    let items = Arc::new(ItemStore::load(&config.items_file).await?);
    let settings = SettingsStore::load(&config.settings_file).await?;
    let registry = Arc::new(MountRegistry::load(&items, &settings, &startup_mounts).await?);

    let connector: Arc<dyn Connector> =
        Arc::new(MongoConnector::new(config.connect_timeout_duration()));
    let cache = Arc::new(ConnectionCache::new(connector.clone()));

    let interceptor = DownloadInterceptor::new(registry.clone(), cache.clone());
    let dispatcher = Arc::new(EventDispatcher::new());
    dispatcher
        .bind(DOWNLOAD_BEFORE, HANDLER_NAME, Arc::new(interceptor))
        .await;

    let mounts = Arc::new(MountHandler::new(
        items.clone(),
        registry,
        cache.clone(),
        connector,
    ));

    let state = AppState {
        items,
        dispatcher,
        mounts,
    };

    info!(
        host = %config.http_host,
        port = config.http_port,
        "Using HTTP transport"
    );
    let transport = HttpTransport::new(
        state,
        Arc::new(auth),
        cache,
        &config.http_host,
        config.http_port,
    );

    if let Err(e) = transport.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}
