//! Event record normalizer.
//!
//! Turns the raw message list of one ticket into a typed event sequence,
//! sorted ascending by timestamp. Sorting is stable, so messages sharing a
//! timestamp keep their source order. Records with an unparseable timestamp
//! or operator are dropped one by one; they never abort the sequence.

use chrono::NaiveDateTime;
use opentelemetry::KeyValue;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::model::{Event, EventType, OperatorId, ScheduledDate, UNSET_TIMESTAMP, parse_timestamp};
use crate::source::RawMessage;
use crate::telemetry::metrics;

/// Mapping from source event codes to [`EventType`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventCodes {
    pub technician_change: u32,
    pub scheduling_change: u32,
    /// Codes of the dedicated reschedule event. Empty until confirmed.
    pub reschedule: Vec<u32>,
}

impl Default for EventCodes {
    fn default() -> Self {
        Self {
            technician_change: 4,
            scheduling_change: 5,
            reschedule: Vec::new(),
        }
    }
}

impl EventCodes {
    pub fn classify(&self, code: u32) -> EventType {
        if code == self.technician_change {
            EventType::TechnicianChange
        } else if code == self.scheduling_change {
            EventType::SchedulingChange
        } else if self.reschedule.contains(&code) {
            EventType::Reschedule
        } else {
            EventType::Other(code)
        }
    }
}

/// Result of normalizing one ticket's messages.
#[derive(Debug, Default)]
pub struct Normalized {
    /// Events strictly after the cursor, in chronological order.
    pub events: Vec<Event>,
    /// Records dropped as malformed.
    pub dropped: usize,
    /// Well-formed records at or before the cursor.
    pub already_seen: usize,
}

/// Normalize a raw message list.
///
/// `cursor` excludes every event whose timestamp is at or before it.
pub fn normalize(
    raw: &[RawMessage],
    codes: &EventCodes,
    cursor: Option<NaiveDateTime>,
) -> Normalized {
    let mut out = Normalized::default();

    for (seq, message) in raw.iter().enumerate() {
        let Some(event) = to_event(seq, message, codes) else {
            out.dropped += 1;
            metrics::records_dropped().add(1, &[KeyValue::new("reason", "message")]);
            continue;
        };
        if cursor.is_some_and(|c| event.timestamp <= c) {
            out.already_seen += 1;
            continue;
        }
        out.events.push(event);
    }

    out.events.sort_by_key(|e| e.timestamp);
    out
}

fn to_event(seq: usize, message: &RawMessage, codes: &EventCodes) -> Option<Event> {
    let raw_ts = message.data.as_deref().unwrap_or_default();
    let Some(timestamp) = parse_timestamp(raw_ts) else {
        warn!(seq, timestamp = raw_ts, "dropping message with bad timestamp");
        return None;
    };
    let Some(operator) = message.operator() else {
        warn!(seq, %timestamp, "dropping message without operator");
        return None;
    };

    let scheduled = message.scheduled_raw().map(|raw| {
        if raw == UNSET_TIMESTAMP {
            return ScheduledDate::NotSet;
        }
        match parse_timestamp(raw) {
            Some(ts) => ScheduledDate::At(ts),
            None => {
                debug!(seq, scheduled = raw, "unparseable scheduled date treated as unset");
                ScheduledDate::NotSet
            }
        }
    });

    Some(Event {
        seq,
        timestamp,
        operator: OperatorId(operator),
        event_type: codes.classify(message.event_code()),
        status: message.status().map(str::to_string),
        technician: message.technician(),
        scheduled,
        annotation: message.historico.clone().unwrap_or_default(),
    })
}
