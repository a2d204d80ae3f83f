//! Named event bindings for download requests.
//!
//! Handlers bind to an event name under a unique handler name. Dispatch asks
//! each bound handler in binding order; the first one that returns
//! [`Interception::Handled`] produces the response and later handlers are not
//! consulted. If every handler defers, the caller runs its default behavior.

use crate::db::JsonArrayStream;
use futures_util::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Fired before the default item download handler runs.
pub const DOWNLOAD_BEFORE: &str = "rest.get.item/:id/download.before";

/// A download request for one item.
#[derive(Debug, Clone)]
pub struct DownloadEvent {
    pub resource_id: String,
    pub params: HashMap<String, String>,
}

impl DownloadEvent {
    pub fn new(resource_id: impl Into<String>, params: HashMap<String, String>) -> Self {
        Self {
            resource_id: resource_id.into(),
            params,
        }
    }
}

/// Outcome of offering an event to a handler.
///
/// `Handled` carries the replacement body, so suppressing the default handler
/// and supplying the response are one decision.
pub enum Interception {
    Deferred,
    Handled(JsonArrayStream),
}

impl Interception {
    pub fn is_handled(&self) -> bool {
        matches!(self, Self::Handled(_))
    }
}

impl std::fmt::Debug for Interception {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Deferred => write!(f, "Deferred"),
            Self::Handled(_) => write!(f, "Handled(..)"),
        }
    }
}

/// A handler for download events.
///
/// Handlers must not fail: errors are dealt with inside the handler and
/// surface as [`Interception::Deferred`].
pub trait DownloadHandler: Send + Sync {
    fn handle<'a>(&'a self, event: &'a DownloadEvent) -> BoxFuture<'a, Interception>;
}

struct Binding {
    name: String,
    handler: Arc<dyn DownloadHandler>,
}

/// Registry of handlers per event name.
#[derive(Default)]
pub struct EventDispatcher {
    bindings: RwLock<HashMap<String, Vec<Binding>>>,
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher").finish_non_exhaustive()
    }
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handler` to `event` under `name`, replacing any binding with the
    /// same name.
    pub async fn bind(
        &self,
        event: impl Into<String>,
        name: impl Into<String>,
        handler: Arc<dyn DownloadHandler>,
    ) {
        let event = event.into();
        let name = name.into();
        let mut bindings = self.bindings.write().await;
        let handlers = bindings.entry(event.clone()).or_default();

        match handlers.iter_mut().find(|binding| binding.name == name) {
            Some(existing) => existing.handler = handler,
            None => handlers.push(Binding {
                name: name.clone(),
                handler,
            }),
        }
        info!(event = %event, handler = %name, "Bound event handler");
    }

    /// Remove the binding named `name` from `event`.
    ///
    /// Returns true if a binding was removed.
    pub async fn unbind(&self, event: &str, name: &str) -> bool {
        let mut bindings = self.bindings.write().await;
        let Some(handlers) = bindings.get_mut(event) else {
            return false;
        };

        let before = handlers.len();
        handlers.retain(|binding| binding.name != name);
        let removed = handlers.len() != before;
        if handlers.is_empty() {
            bindings.remove(event);
        }
        if removed {
            info!(event = %event, handler = %name, "Unbound event handler");
        }
        removed
    }

    /// Names of the handlers bound to `event`, in dispatch order.
    pub async fn handler_names(&self, event: &str) -> Vec<String> {
        let bindings = self.bindings.read().await;
        bindings
            .get(event)
            .map(|handlers| handlers.iter().map(|b| b.name.clone()).collect())
            .unwrap_or_default()
    }

    /// Offer `payload` to the handlers bound to `event`.
    pub async fn dispatch(&self, event: &str, payload: &DownloadEvent) -> Interception {
        // Snapshot so handlers run without holding the lock
        let handlers: Vec<(String, Arc<dyn DownloadHandler>)> = {
            let bindings = self.bindings.read().await;
            bindings
                .get(event)
                .map(|handlers| {
                    handlers
                        .iter()
                        .map(|b| (b.name.clone(), Arc::clone(&b.handler)))
                        .collect()
                })
                .unwrap_or_default()
        };

        for (name, handler) in handlers {
            if let Interception::Handled(body) = handler.handle(payload).await {
                debug!(
                    event = %event,
                    handler = %name,
                    resource_id = %payload.resource_id,
                    "Event handled"
                );
                return Interception::Handled(body);
            }
        }

        Interception::Deferred
    }
}
