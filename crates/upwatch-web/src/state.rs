//! Shared application state.

use std::sync::Arc;

use axum::extract::State;

use upwatch_core::storage::LogStore;
use upwatch_core::timezone::ZoneResolver;

pub(crate) struct WebAppInner {
    pub(crate) store: Arc<LogStore>,
    /// Partitions loaded per read request.
    pub(crate) days: usize,
}

impl WebAppInner {
    pub(crate) fn zone(&self) -> &ZoneResolver {
        self.store.zone()
    }
}

pub(crate) type SharedState = Arc<WebAppInner>;

pub(crate) type AppState = State<SharedState>;
