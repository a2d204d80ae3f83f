//! Add a mount to the global `mongo_reader.mounts` setting.
//!
//! Item attributes are the primary place mounts live; this writes the
//! settings form, which the server also reads at startup.

use clap::Parser;
use mongo_reader::config::DEFAULT_SETTINGS_FILE;
use mongo_reader::host::SettingsStore;
use mongo_reader::models::{CreateMountInput, PortInput};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "mount-database",
    about = "Register a MongoDB collection as the content of an item",
    version
)]
struct Args {
    /// Id of the item to mount the collection on
    item_id: String,

    /// MongoDB host
    #[arg(long, default_value = "localhost")]
    host: String,

    /// MongoDB port
    #[arg(long, default_value = "27017")]
    port: String,

    /// Database name
    #[arg(long)]
    database: String,

    /// Collection name
    #[arg(long)]
    collection: String,

    /// JSON file holding global settings
    #[arg(long, default_value = DEFAULT_SETTINGS_FILE, env = "MONGO_READER_SETTINGS_FILE")]
    settings_file: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mount = CreateMountInput {
        host: Some(args.host),
        port: Some(PortInput::Text(args.port)),
        database: Some(args.database),
        collection: Some(args.collection),
        verify: false,
    }
    .into_config()?;

    let settings = SettingsStore::load(&args.settings_file).await?;
    settings.set_mount(&args.item_id, mount.clone()).await?;

    info!(
        item_id = %args.item_id,
        mount = %mount,
        settings = %args.settings_file.display(),
        "Mount registered"
    );
    Ok(())
}
