//! Integration tests for telemetry initialization and span helpers.

use uuid::Uuid;

#[test]
fn telemetry_initializes_without_endpoint() {
    // Only one global subscriber per process; a second init may fail and
    // that is fine here.
    let config = ticketwatch::telemetry::TelemetryConfig {
        endpoint: None,
        service_name: "ticketwatch-test".to_string(),
        default_filter: "debug".to_string(),
    };
    let _guard = ticketwatch::telemetry::init_telemetry(config);
}

#[test]
fn cycle_span_creates_and_records_outcome() {
    let id = Uuid::new_v4();
    let span = ticketwatch::telemetry::cycle::start_cycle_span("compliance", &id);
    ticketwatch::telemetry::cycle::record_outcome(&span, "ok");
}

#[test]
fn ticket_span_creates_and_records_violations() {
    let span = ticketwatch::telemetry::cycle::start_ticket_span("42");
    ticketwatch::telemetry::cycle::record_violations(&span, 3);
}

#[test]
fn metric_instruments_build_without_provider() {
    use opentelemetry::KeyValue;

    ticketwatch::telemetry::metrics::cycles().add(1, &[KeyValue::new("monitor", "test")]);
    ticketwatch::telemetry::metrics::alerts_suppressed().add(1, &[]);
    ticketwatch::telemetry::metrics::cycle_duration_ms().record(1.5, &[]);
}
