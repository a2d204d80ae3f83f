//! Transport layer.
//!
//! Serves the item API over HTTP.

pub mod http;

pub use http::{AppState, HttpTransport, router};

use crate::error::MountResult;
use std::future::Future;

/// Trait for server transports.
pub trait Transport: Send + Sync {
    /// Start the transport and begin handling requests.
    ///
    /// This method should block until the transport is shut down.
    fn run(&self) -> impl Future<Output = MountResult<()>> + Send;

    /// Get the name of this transport for logging.
    fn name(&self) -> &'static str;
}
