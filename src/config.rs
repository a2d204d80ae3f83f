//! Configuration handling for the mongo reader.
//!
//! This module provides configuration management via CLI arguments and environment variables.

use crate::models::{DEFAULT_MONGO_HOST, DEFAULT_MONGO_PORT, MountConfig};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

pub const DEFAULT_HTTP_HOST: &str = "127.0.0.1";
pub const DEFAULT_HTTP_PORT: u16 = 8080;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_ITEMS_FILE: &str = "items.json";
pub const DEFAULT_SETTINGS_FILE: &str = "settings.json";

/// A mount supplied on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountSpec {
    pub item_id: String,
    pub mount: MountConfig,
}

impl MountSpec {
    /// Parse a mount from a CLI argument.
    ///
    /// # Format
    ///
    /// `item_id=mongodb://host[:port]/database/collection`
    ///
    /// The port defaults to 27017. The collection is everything after the
    /// database segment, so names containing `/` are not supported.
    ///
    /// # Examples
    ///
    /// ```text
    /// 53161aa9=mongodb://localhost:27017/healthMap/records
    /// 53161aa9=mongodb://db.internal/healthMap/records
    /// ```
    pub fn parse(s: &str) -> Result<Self, String> {
        let (item_id, url_str) = s
            .split_once('=')
            .ok_or_else(|| format!("Expected item_id=mongodb://host:port/database/collection, got '{s}'"))?;

        let item_id = item_id.trim();
        if item_id.is_empty() {
            return Err("Mount item id must not be empty".to_string());
        }

        let url = Url::parse(url_str.trim()).map_err(|e| format!("Invalid URL: {e}"))?;
        if url.scheme() != "mongodb" {
            return Err(format!(
                "Unsupported scheme '{}', expected 'mongodb'",
                url.scheme()
            ));
        }

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .map(|h| h.trim_start_matches('[').trim_end_matches(']').to_string())
            .unwrap_or_else(|| DEFAULT_MONGO_HOST.to_string());
        let port = url.port().unwrap_or(DEFAULT_MONGO_PORT);

        let mut segments = url
            .path_segments()
            .map(|segments| segments.filter(|s| !s.is_empty()).collect::<Vec<_>>())
            .unwrap_or_default()
            .into_iter();

        let (Some(database), Some(collection), None) =
            (segments.next(), segments.next(), segments.next())
        else {
            return Err(format!(
                "Mount URL must name exactly a database and a collection: '{url_str}'"
            ));
        };

        Ok(Self {
            item_id: item_id.to_string(),
            mount: MountConfig::new(host, port, database, collection),
        })
    }
}

/// Configuration for the mongo reader server.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "mongo-reader",
    about = "Serve mounted MongoDB collections as streamed JSON item downloads",
    version,
    author
)]
pub struct Config {
    /// HTTP host to bind to
    #[arg(long, default_value = DEFAULT_HTTP_HOST, env = "MONGO_READER_HTTP_HOST")]
    pub http_host: String,

    /// HTTP port to bind to
    #[arg(long, default_value_t = DEFAULT_HTTP_PORT, env = "MONGO_READER_HTTP_PORT")]
    pub http_port: u16,

    /// JSON file holding the items
    #[arg(long, default_value = DEFAULT_ITEMS_FILE, env = "MONGO_READER_ITEMS_FILE")]
    pub items_file: PathBuf,

    /// JSON file holding global settings
    #[arg(long, default_value = DEFAULT_SETTINGS_FILE, env = "MONGO_READER_SETTINGS_FILE")]
    pub settings_file: PathBuf,

    /// Mounts applied at startup, overriding persisted ones.
    /// Format: "item_id=mongodb://host:port/database/collection"
    /// Can be specified multiple times.
    #[arg(
        short = 'm',
        long = "mount",
        value_name = "MOUNT",
        env = "MONGO_READER_MOUNTS",
        value_delimiter = ','
    )]
    pub mounts: Vec<String>,

    /// Server selection timeout for MongoDB connections, in seconds
    #[arg(
        long,
        default_value_t = DEFAULT_CONNECT_TIMEOUT_SECS,
        env = "MONGO_READER_CONNECT_TIMEOUT"
    )]
    pub connect_timeout: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "MONGO_READER_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "MONGO_READER_JSON_LOGS")]
    pub json_logs: bool,

    /// Admin tokens for the HTTP API.
    /// Can be specified multiple times or as comma-separated values.
    /// When unset, every caller is treated as an administrator.
    #[arg(
        long = "auth-token",
        value_name = "TOKEN",
        env = "MONGO_READER_AUTH_TOKENS",
        value_delimiter = ','
    )]
    pub auth_tokens: Vec<String>,
}

impl Config {
    /// Parse configuration from command line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Create a default configuration (useful for testing).
    pub fn default_config() -> Self {
        Self {
            http_host: DEFAULT_HTTP_HOST.to_string(),
            http_port: DEFAULT_HTTP_PORT,
            items_file: PathBuf::from(DEFAULT_ITEMS_FILE),
            settings_file: PathBuf::from(DEFAULT_SETTINGS_FILE),
            mounts: Vec::new(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT_SECS,
            log_level: "info".to_string(),
            json_logs: false,
            auth_tokens: Vec::new(),
        }
    }

    /// Parse all startup mounts.
    pub fn parse_mounts(&self) -> Result<Vec<MountSpec>, String> {
        self.mounts.iter().map(|s| MountSpec::parse(s)).collect()
    }

    /// Get the HTTP bind address.
    pub fn http_bind_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }

    /// Get the connection timeout as a Duration.
    pub fn connect_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}
