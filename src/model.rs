//! Core data model.
//!
//! A ticket is a service order tracked by the external system. Its history is
//! a finite, append-only list of events; the rule engine folds over that list
//! and produces violations. Everything here is a plain value type.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Timestamp layout used by the ticket source for every date-time field.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Scheduled-date value the ticket source uses for "not set".
pub const UNSET_TIMESTAMP: &str = "0000-00-00 00:00:00";

/// Parse a source timestamp. Returns `None` for blanks and the unset sentinel.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() || raw == UNSET_TIMESTAMP {
        return None;
    }
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT).ok()
}

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Service order identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketId(pub String);

impl std::fmt::Display for TicketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TicketId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Operator (staff account) that recorded an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperatorId(pub u32);

impl std::fmt::Display for OperatorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Field technician assigned to a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TechnicianId(pub u32);

impl std::fmt::Display for TechnicianId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Ticket
// ---------------------------------------------------------------------------

/// Snapshot of a service order, immutable for the duration of a poll cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub client_id: String,
    /// Subject/category code. Resolved to a label via the subject lookup.
    pub subject_id: u32,
    pub opened_at: NaiveDateTime,
    /// Current status code (e.g. "A", "AG", "EN").
    pub status: String,
    pub technician: Option<TechnicianId>,
    /// Support ticket this order was opened from, if any.
    pub support_ticket: Option<String>,
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// What kind of action an event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Assigned technician changed.
    TechnicianChange,
    /// Status changed and/or a schedule was set.
    SchedulingChange,
    /// Dedicated reschedule event.
    Reschedule,
    /// Anything else, with the raw event code.
    Other(u32),
}

/// Resulting scheduled date carried by an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduledDate {
    /// The source sent its "not set" sentinel.
    NotSet,
    At(NaiveDateTime),
}

impl ScheduledDate {
    pub fn date(self) -> Option<NaiveDate> {
        match self {
            ScheduledDate::NotSet => None,
            ScheduledDate::At(ts) => Some(ts.date()),
        }
    }
}

/// One timestamped action on a ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Position in the source payload. Tie-break for equal timestamps.
    pub seq: usize,
    pub timestamp: NaiveDateTime,
    pub operator: OperatorId,
    pub event_type: EventType,
    /// Resulting status code, if the event set one.
    pub status: Option<String>,
    /// Resulting technician, if the event set one.
    pub technician: Option<TechnicianId>,
    /// Resulting scheduled date, if the event carried the field at all.
    pub scheduled: Option<ScheduledDate>,
    /// Free-text annotation recorded with the event.
    pub annotation: String,
}

impl Event {
    /// Scheduled date that is actually set.
    pub fn scheduled_date(&self) -> Option<NaiveDate> {
        self.scheduled.and_then(ScheduledDate::date)
    }
}

// ---------------------------------------------------------------------------
// Violation
// ---------------------------------------------------------------------------

/// Policy rule that a restricted operator broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViolationKind {
    /// Reassigned a technician chosen by someone else.
    TechnicianChanged,
    /// Moved an in-progress ticket back to scheduling.
    StatusReverted,
    /// Scheduled the visit for the same day the change was made.
    SameDaySchedule,
    /// Touched assignment or schedule after a supervisor escalated.
    ActionAfterEscalation,
}

impl ViolationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ViolationKind::TechnicianChanged => "technician-changed",
            ViolationKind::StatusReverted => "status-reverted",
            ViolationKind::SameDaySchedule => "same-day-schedule",
            ViolationKind::ActionAfterEscalation => "action-after-escalation",
        }
    }
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// A violation found while replaying a ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub description: String,
    /// Timestamp of the event that produced it.
    pub timestamp: NaiveDateTime,
    /// Annotation of that event.
    pub annotation: String,
    /// Resulting scheduled date of the event, kept apart from the event's own
    /// date so both can be audited.
    pub scheduled_for: Option<NaiveDate>,
}

impl Violation {
    pub fn event_date(&self) -> NaiveDate {
        self.timestamp.date()
    }
}

/// Everything the dispatcher needs to alert on one ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketReport {
    pub ticket_id: TicketId,
    pub client_id: String,
    pub subject: String,
    pub violations: Vec<Violation>,
}

// ---------------------------------------------------------------------------
// Connectivity
// ---------------------------------------------------------------------------

/// One access login belonging to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Login {
    pub id: String,
    pub login: String,
    pub active: bool,
    pub online: bool,
    pub disconnect_reason: String,
    pub last_connected: String,
}

/// Fiber attachment point of a login.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FiberDetails {
    pub transmitter_id: String,
    pub pon_id: String,
}

// ---------------------------------------------------------------------------
// Calls
// ---------------------------------------------------------------------------

/// One entry of the PBX call log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    pub id: String,
    /// Status as shown by the PBX, e.g. `Atendida`.
    pub status: String,
    /// Free-text destination; the answering extension is embedded in it.
    pub destination: String,
    /// Caller number as dialed in.
    pub origin: String,
    pub ended_at: Option<NaiveDateTime>,
    pub queue: String,
}

/// A client record, reduced to what alerts show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: String,
    pub name: String,
    pub active: bool,
}

/// A support ticket ("atendimento") as read by the call monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupportTicket {
    pub id: String,
    pub client_id: Option<String>,
    pub created_at: Option<NaiveDateTime>,
    pub message: String,
    pub responsible_id: Option<String>,
}
