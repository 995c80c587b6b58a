//! Span helpers for monitor cycles and per-ticket replays.

use tracing::Span;
use uuid::Uuid;

/// Start a span covering one monitor cycle.
///
/// `cycle.outcome` is declared empty and filled by [`record_outcome`].
pub fn start_cycle_span(monitor: &str, cycle_id: &Uuid) -> Span {
    tracing::info_span!(
        "monitor.cycle",
        "monitor.name" = monitor,
        "cycle.id" = %cycle_id,
        "cycle.outcome" = tracing::field::Empty,
    )
}

pub fn record_outcome(span: &Span, outcome: &str) {
    span.record("cycle.outcome", outcome);
}

/// Start a span for replaying one ticket.
///
/// `ticket.violations` is filled by [`record_violations`].
pub fn start_ticket_span(ticket_id: &str) -> Span {
    tracing::debug_span!(
        "ticket.replay",
        "ticket.id" = ticket_id,
        "ticket.violations" = tracing::field::Empty,
    )
}

pub fn record_violations(span: &Span, count: usize) {
    span.record("ticket.violations", count as u64);
}
