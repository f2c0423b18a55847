//! Metrics recording for the distribution core.
//!
//! Uses the `metrics` crate facade for instrumentation; installing an
//! exporter is left to the embedding process.

use metrics::{counter, gauge, histogram};
use tracing::info;

/// Metric names.
pub mod names {
    pub const QUEUES_ALLOCATED_TOTAL: &str = "ripple_queues_allocated_total";
    pub const QUEUES_ACTIVE: &str = "ripple_queues_active";
    pub const QUEUES_SWEPT_TOTAL: &str = "ripple_queues_swept_total";
    pub const EVENTS_DISPATCHED_TOTAL: &str = "ripple_events_dispatched_total";
    pub const EVENTS_DELIVERED_TOTAL: &str = "ripple_events_delivered_total";
    pub const EVENTS_COLLAPSED_TOTAL: &str = "ripple_events_collapsed_total";
    pub const POLLS_TOTAL: &str = "ripple_polls_total";
    pub const POLL_WAIT_SECONDS: &str = "ripple_poll_wait_seconds";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::QUEUES_ALLOCATED_TOTAL,
        "Total number of event queues allocated since start"
    );
    metrics::describe_gauge!(names::QUEUES_ACTIVE, "Current number of registered queues");
    metrics::describe_counter!(
        names::QUEUES_SWEPT_TOTAL,
        "Total number of queues reclaimed by the idle sweep"
    );
    metrics::describe_counter!(
        names::EVENTS_DISPATCHED_TOTAL,
        "Total number of events handed to the dispatcher"
    );
    metrics::describe_counter!(
        names::EVENTS_DELIVERED_TOTAL,
        "Total number of events enqueued after filtering"
    );
    metrics::describe_counter!(
        names::EVENTS_COLLAPSED_TOTAL,
        "Total number of events absorbed by compaction"
    );
    metrics::describe_counter!(names::POLLS_TOTAL, "Total number of poll calls");
    metrics::describe_histogram!(
        names::POLL_WAIT_SECONDS,
        "Time poll calls spent suspended before resolving"
    );

    info!("Metrics initialized");
}

/// Record a queue allocation.
pub fn record_allocation() {
    counter!(names::QUEUES_ALLOCATED_TOTAL).increment(1);
}

/// Update the active queue gauge.
pub fn set_active_queues(count: usize) {
    gauge!(names::QUEUES_ACTIVE).set(count as f64);
}

/// Record queues reclaimed by a sweep pass.
pub fn record_swept(count: usize) {
    counter!(names::QUEUES_SWEPT_TOTAL).increment(count as u64);
}

/// Record events handed to the dispatcher.
pub fn record_dispatch(events: usize) {
    counter!(names::EVENTS_DISPATCHED_TOTAL).increment(events as u64);
}

/// Record events enqueued for one recipient queue.
pub fn record_delivery(delivered: usize, collapsed: usize) {
    counter!(names::EVENTS_DELIVERED_TOTAL).increment(delivered as u64);
    if collapsed > 0 {
        counter!(names::EVENTS_COLLAPSED_TOTAL).increment(collapsed as u64);
    }
}

/// Record a resolved poll call.
pub fn record_poll(result: &'static str, waited_secs: f64) {
    counter!(names::POLLS_TOTAL, "result" => result).increment(1);
    histogram!(names::POLL_WAIT_SECONDS).record(waited_secs);
}
