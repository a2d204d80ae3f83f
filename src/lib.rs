//! Mongo Reader Library
//!
//! This library mounts external MongoDB collections onto content items and
//! serves them as streamed JSON arrays when the item is downloaded.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod host;
pub mod models;
pub mod registry;
pub mod translator;
pub mod transport;

pub use config::Config;
pub use error::{MountError, MountResult};
pub use registry::MountRegistry;
