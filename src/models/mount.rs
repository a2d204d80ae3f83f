//! Mount configuration models.
//!
//! A mount ties one content item to one external MongoDB collection.

use crate::error::{MountError, MountResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

pub const DEFAULT_MONGO_HOST: &str = "localhost";
pub const DEFAULT_MONGO_PORT: u16 = 27017;

fn default_host() -> String {
    DEFAULT_MONGO_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_MONGO_PORT
}

/// Identifies one external database collection.
///
/// Host and port fall back to `localhost:27017` when a persisted entry omits
/// them. Database and collection are always required.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MountConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub database: String,
    pub collection: String,
}

impl MountConfig {
    /// Create a mount configuration.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        database: impl Into<String>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            database: database.into(),
            collection: collection.into(),
        }
    }

    /// `host:port` for log lines.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Build the driver connection string for this mount's server.
    ///
    /// The server selection timeout bounds how long an unreachable host blocks
    /// the first request.
    pub fn connection_uri(&self, connect_timeout: Duration) -> MountResult<String> {
        let host = if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };

        let mut url = Url::parse(&format!("mongodb://{}:{}/", host, self.port)).map_err(|e| {
            MountError::validation("host", &self.host, format!("not a valid host: {}", e))
        })?;

        let millis = connect_timeout.as_millis().to_string();
        url.query_pairs_mut()
            .append_pair("serverSelectionTimeoutMS", &millis)
            .append_pair("connectTimeoutMS", &millis);

        Ok(url.to_string())
    }
}

impl std::fmt::Display for MountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}/{}/{}",
            self.host, self.port, self.database, self.collection
        )
    }
}

/// Port as supplied by a client: a JSON number or a numeric string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PortInput {
    Number(i64),
    Text(String),
}

impl PortInput {
    fn raw(&self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s.clone(),
        }
    }

    /// Validate the port into the TCP range.
    pub fn resolve(&self) -> MountResult<u16> {
        let parsed = match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse::<i64>().ok(),
        };

        match parsed {
            Some(n) if (1..=i64::from(u16::MAX)).contains(&n) => Ok(n as u16),
            Some(_) => Err(MountError::validation(
                "port",
                self.raw(),
                "port must be between 1 and 65535",
            )),
            None => Err(MountError::validation(
                "port",
                self.raw(),
                "port must be an integer",
            )),
        }
    }
}

/// Body of a mount creation request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateMountInput {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<PortInput>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub collection: Option<String>,
    /// Connect once before persisting to catch unreachable hosts and missing databases.
    #[serde(default)]
    pub verify: bool,
}

impl CreateMountInput {
    /// Validate that all four fields are present and well formed.
    pub fn into_config(self) -> MountResult<MountConfig> {
        let host = required_text("host", self.host)?;
        let port = self
            .port
            .ok_or_else(|| MountError::missing_field("port"))?
            .resolve()?;
        let database = required_text("database", self.database)?;
        let collection = required_text("collection", self.collection)?;

        Ok(MountConfig {
            host,
            port,
            database,
            collection,
        })
    }
}

fn required_text(field: &str, value: Option<String>) -> MountResult<String> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(MountError::missing_field(field)),
    }
}
