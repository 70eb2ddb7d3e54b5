//! Span helpers for `map` runs and their workers.

use tracing::Span;
use uuid::Uuid;

/// Start the span covering one `map` invocation.
pub fn start_map_span(run_id: &Uuid, pool_size: usize, item_count: usize) -> Span {
    tracing::info_span!(
        "para.map",
        "map.run_id" = %run_id,
        "map.pool_size" = pool_size,
        "map.items" = item_count,
    )
}

/// Start a worker span as a child of the map span.
///
/// The `worker.state` field is declared empty and updated via
/// [`record_state_transition`].
pub fn start_worker_span(parent: &Span, worker: &str) -> Span {
    tracing::info_span!(
        parent: parent,
        "para.worker",
        "worker.name" = worker,
        "worker.state" = tracing::field::Empty,
    )
}

/// Record a worker state transition on its span.
pub fn record_state_transition(span: &Span, from: &str, to: &str) {
    span.record("worker.state", to);
    span.in_scope(|| {
        tracing::trace!(from = from, to = to, "state_transition");
    });
}
