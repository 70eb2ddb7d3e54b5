//! Metric instruments for pool workers.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! Without an OTLP endpoint the global provider is a no-op.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("para")
}

/// Counter: items a worker finished processing.
/// Labels: `result` ("ok" | "error").
pub fn items_processed() -> Counter<u64> {
    meter()
        .u64_counter("para.items.processed")
        .with_description("Number of items processed by pool workers")
        .build()
}

/// Counter: values forwarded to the output channel.
pub fn values_emitted() -> Counter<u64> {
    meter()
        .u64_counter("para.values.emitted")
        .with_description("Number of values emitted by processing routines")
        .build()
}

/// Histogram: time spent processing one item, in milliseconds.
pub fn item_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("para.item.duration_ms")
        .with_description("Item processing duration in milliseconds")
        .with_unit("ms")
        .build()
}

/// Counter: workers reaching a terminal state.
/// Labels: `state` ("drained" | "failed" | "cancelled").
pub fn worker_exits() -> Counter<u64> {
    meter()
        .u64_counter("para.worker.exits")
        .with_description("Number of workers reaching a terminal state")
        .build()
}
