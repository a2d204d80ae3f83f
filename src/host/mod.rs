//! Host application services the mount system plugs into.
//!
//! - Event dispatch for download requests
//! - Item storage and access checks
//! - Global settings

pub mod events;
pub mod items;
pub mod settings;

pub use events::{DOWNLOAD_BEFORE, DownloadEvent, DownloadHandler, EventDispatcher, Interception};
pub use items::ItemStore;
pub use settings::{MOUNTS_KEY, SettingsStore};
