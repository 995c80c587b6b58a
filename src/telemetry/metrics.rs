//! Metric instrument factories.
//!
//! Instruments come from the global meter provider, which is a no-op
//! unless an OTLP endpoint was configured.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("ticketwatch")
}

/// Counter: completed monitor cycles.
/// Labels: `monitor`, `result` ("ok" | "error").
pub fn cycles() -> Counter<u64> {
    meter()
        .u64_counter("ticketwatch.cycles")
        .with_description("Number of monitor cycles run")
        .build()
}

/// Counter: violations found by the rule engine.
/// Labels: `kind`.
pub fn violations() -> Counter<u64> {
    meter()
        .u64_counter("ticketwatch.violations")
        .with_description("Compliance violations detected")
        .build()
}

/// Counter: alert dispatch attempts.
/// Labels: `monitor`, `result` ("delivered" | "failed").
pub fn alerts_dispatched() -> Counter<u64> {
    meter()
        .u64_counter("ticketwatch.alerts.dispatched")
        .with_description("Alerts handed to the dispatcher")
        .build()
}

/// Counter: alerts held back by a cool-down.
/// Labels: `monitor`.
pub fn alerts_suppressed() -> Counter<u64> {
    meter()
        .u64_counter("ticketwatch.alerts.suppressed")
        .with_description("Alerts suppressed by a cool-down window")
        .build()
}

/// Counter: source records dropped as malformed.
/// Labels: `reason`.
pub fn records_dropped() -> Counter<u64> {
    meter()
        .u64_counter("ticketwatch.records.dropped")
        .with_description("Malformed source records dropped")
        .build()
}

/// Histogram: cycle duration in milliseconds.
/// Labels: `monitor`.
pub fn cycle_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("ticketwatch.cycle.duration_ms")
        .with_description("Monitor cycle duration in milliseconds")
        .with_unit("ms")
        .build()
}
