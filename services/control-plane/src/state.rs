//! Application state shared across request handlers.

use std::sync::Arc;

use crate::store::Store;

/// Shared application state, passed to handlers via Axum's state extractor.
#[derive(Debug, Clone, Default)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

#[derive(Debug, Default)]
struct AppStateInner {
    store: Store,
}

impl AppState {
    pub fn new(store: Store) -> Self {
        Self {
            inner: Arc::new(AppStateInner { store }),
        }
    }

    pub fn store(&self) -> &Store {
        &self.inner.store
    }
}
