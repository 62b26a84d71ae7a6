//! Background work: the collector task and blocking log loads.

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::error;

use upwatch_core::aggregate::{AggregatedView, aggregate};
use upwatch_core::collector::{Collector, CollectorStats};
use upwatch_core::probe::Probe;

use crate::state::SharedState;

pub(crate) fn spawn_collector<P>(
    collector: Collector<P>,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<CollectorStats>
where
    P: Probe + 'static,
{
    tokio::spawn(collector.run(shutdown))
}

/// Loads the most recent partitions and regroups them by local date.
///
/// Corrupt partitions are skipped (the store logs them). A failure to list the log
/// directory yields an empty view rather than an error response.
pub(crate) async fn load_view(state: &SharedState) -> AggregatedView {
    let store = state.store.clone();
    let days = state.days;
    let loaded = tokio::task::spawn_blocking(move || store.load_recent(days)).await;

    let outcome = match loaded {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => {
            error!(dir = %state.store.base_path().display(), error = %e, "failed to list log partitions");
            return AggregatedView::default();
        }
        Err(e) => {
            error!(error = %e, "log load panicked in spawn_blocking");
            return AggregatedView::default();
        }
    };

    aggregate(&outcome.partitions, state.zone())
}
