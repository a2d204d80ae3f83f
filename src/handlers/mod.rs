//! Request handlers for mounted items.
//!
//! - `download`: intercepts item downloads and streams mounted collections
//! - `mount`: creates mounts on items

pub mod download;
pub mod mount;

pub use download::{DownloadInterceptor, HANDLER_NAME};
pub use mount::MountHandler;
