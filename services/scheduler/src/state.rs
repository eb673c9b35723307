//! Application state shared across request handlers.

use std::sync::Arc;

use crate::api::admission::ConcurrencyGate;
use crate::matcher::manager::ManagerHandle;

/// Shared application state.
///
/// This is passed to all request handlers via Axum's state extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    manager: ManagerHandle,
    admission: ConcurrencyGate,
}

impl AppState {
    /// Create a new application state.
    pub fn new(manager: ManagerHandle, admission: ConcurrencyGate) -> Self {
        Self {
            inner: Arc::new(AppStateInner { manager, admission }),
        }
    }

    /// Handle to the offer matcher manager.
    pub fn manager(&self) -> &ManagerHandle {
        &self.inner.manager
    }

    /// The admission gate protecting the management API.
    pub fn admission(&self) -> &ConcurrencyGate {
        &self.inner.admission
    }
}
