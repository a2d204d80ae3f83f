//! Host content items.

use crate::models::MountConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// File content stored on an item, served by the default download handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFile {
    pub name: String,
    #[serde(default = "default_mime_type")]
    pub mime_type: String,
    pub path: PathBuf,
}

fn default_mime_type() -> String {
    "application/octet-stream".to_string()
}

/// A content item of the host application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub name: String,
    /// Anonymous callers may read public items.
    #[serde(default)]
    pub public: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<StoredFile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mongo_mount: Option<MountConfig>,
}

impl Item {
    /// Create a private item without content.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            public: false,
            file: None,
            mongo_mount: None,
        }
    }

    pub fn with_public(mut self, public: bool) -> Self {
        self.public = public;
        self
    }

    pub fn with_file(mut self, file: StoredFile) -> Self {
        self.file = Some(file);
        self
    }

    pub fn with_mount(mut self, mount: MountConfig) -> Self {
        self.mongo_mount = Some(mount);
        self
    }
}

/// Access level required by an operation on an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AccessLevel {
    Read,
    Admin,
}

impl std::fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Admin => write!(f, "admin"),
        }
    }
}
