//! Integration tests for the event normalizer.

use chrono::{NaiveDate, NaiveDateTime};
use serde_json::json;
use ticketwatch::model::*;
use ticketwatch::normalize::{EventCodes, normalize};
use ticketwatch::source::RawMessage;

fn ts(raw: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT).unwrap()
}

fn messages(value: serde_json::Value) -> Vec<RawMessage> {
    serde_json::from_value(value).unwrap()
}

#[test]
fn sorts_by_timestamp_keeping_source_order_for_ties() {
    let raw = messages(json!([
        {"data": "2024-03-01 10:05:00", "id_operador": "1", "id_evento": "4", "id_tecnico": "2", "historico": "b"},
        {"data": "2024-03-01 10:00:00", "id_operador": "1", "id_evento": "0", "historico": "a"},
        {"data": "2024-03-01 10:05:00", "id_operador": "1", "id_evento": "4", "id_tecnico": "3", "historico": "c"},
    ]));

    let out = normalize(&raw, &EventCodes::default(), None);

    let order: Vec<&str> = out.events.iter().map(|e| e.annotation.as_str()).collect();
    assert_eq!(order, vec!["a", "b", "c"]);
    assert_eq!(out.events[1].seq, 0);
    assert_eq!(out.events[2].technician, Some(TechnicianId(3)));
}

#[test]
fn malformed_records_are_dropped_individually() {
    let raw = messages(json!([
        {"data": "yesterday", "id_operador": "1", "id_evento": "5"},
        {"data": "2024-03-01 10:00:00", "id_operador": "", "id_evento": "5"},
        {"data": "2024-03-01 11:00:00", "id_operador": 283, "id_evento": 5, "status": "AG"},
    ]));

    let out = normalize(&raw, &EventCodes::default(), None);

    assert_eq!(out.dropped, 2);
    assert_eq!(out.events.len(), 1);
    let event = &out.events[0];
    assert_eq!(event.operator, OperatorId(283));
    assert_eq!(event.event_type, EventType::SchedulingChange);
    assert_eq!(event.status.as_deref(), Some("AG"));
}

#[test]
fn events_at_or_before_cursor_are_excluded() {
    let raw = messages(json!([
        {"data": "2024-03-01 09:59:59", "id_operador": "1"},
        {"data": "2024-03-01 10:00:00", "id_operador": "1"},
        {"data": "2024-03-01 10:00:01", "id_operador": "1"},
    ]));

    let out = normalize(&raw, &EventCodes::default(), Some(ts("2024-03-01 10:00:00")));

    assert_eq!(out.already_seen, 2);
    assert_eq!(out.events.len(), 1);
    assert_eq!(out.events[0].timestamp, ts("2024-03-01 10:00:01"));
}

#[test]
fn scheduled_date_sentinel_and_garbage_mean_not_set() {
    let raw = messages(json!([
        {"data": "2024-03-01 10:00:00", "id_operador": "1", "id_evento": "5", "data_final": "0000-00-00 00:00:00"},
        {"data": "2024-03-01 10:01:00", "id_operador": "1", "id_evento": "5", "data_final": "soon"},
        {"data": "2024-03-01 10:02:00", "id_operador": "1", "id_evento": "5", "data_final": "2024-03-04 08:00:00"},
        {"data": "2024-03-01 10:03:00", "id_operador": "1", "id_evento": "5"},
    ]));

    let out = normalize(&raw, &EventCodes::default(), None);

    let scheduled: Vec<_> = out.events.iter().map(|e| e.scheduled).collect();
    assert_eq!(
        scheduled,
        vec![
            Some(ScheduledDate::NotSet),
            Some(ScheduledDate::NotSet),
            Some(ScheduledDate::At(ts("2024-03-04 08:00:00"))),
            None,
        ]
    );
    assert_eq!(out.events[2].scheduled_date(), NaiveDate::from_ymd_opt(2024, 3, 4));
}

#[test]
fn configured_reschedule_codes_are_classified() {
    let codes = EventCodes {
        reschedule: vec![12],
        ..EventCodes::default()
    };
    assert_eq!(codes.classify(4), EventType::TechnicianChange);
    assert_eq!(codes.classify(5), EventType::SchedulingChange);
    assert_eq!(codes.classify(12), EventType::Reschedule);
    assert_eq!(codes.classify(7), EventType::Other(7));
}
