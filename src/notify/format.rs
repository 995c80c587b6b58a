//! Human-readable alert texts.
//!
//! Plain text only; channels that need markup escaping do it themselves.

use chrono::NaiveDateTime;

use crate::model::{Client, Login, Ticket, TicketReport, ViolationKind};

const ALERT_TIME_FORMAT: &str = "%d/%m/%Y - %H:%M";

/// Timestamp as shown in alerts.
fn alert_time(ts: NaiveDateTime) -> String {
    ts.format(ALERT_TIME_FORMAT).to_string()
}

fn kind_label(kind: ViolationKind) -> &'static str {
    match kind {
        ViolationKind::TechnicianChanged => "changed technician",
        ViolationKind::StatusReverted => "moved back from in-progress",
        ViolationKind::SameDaySchedule => "scheduled for the same day",
        ViolationKind::ActionAfterEscalation => "acted after supervisor escalation",
    }
}

/// Alert for a ticket with one or more compliance violations.
pub fn compliance_alert(report: &TicketReport) -> String {
    let mut msg = String::from("🛑 RESTRICTED OPERATOR CHANGED A SERVICE ORDER\n\n");
    msg.push_str(&format!("• Client ID: {}\n", report.client_id));
    msg.push_str(&format!("• Order ID: {}\n", report.ticket_id));
    msg.push_str(&format!("• Subject: {}\n", report.subject));
    for v in &report.violations {
        msg.push_str(&format!(
            "• Changed at: {} ({} - {})\n",
            alert_time(v.timestamp),
            kind_label(v.kind),
            v.description
        ));
    }
    msg
}

/// Alert for an open order that still has no schedule.
pub fn unscheduled_alert(ticket: &Ticket, subject: &str, responsible: &str) -> String {
    format!(
        "⏱️ SERVICE ORDER WITHOUT SCHEDULE\n\n\
         Client ID: {}\n\
         Order ID: {}\n\
         Subject: {subject}\n\
         Opened: {}\n\
         Schedule: NONE ❌\n\
         Responsible: {responsible}",
        ticket.client_id,
        ticket.id,
        ticket.opened_at.format("%Y-%m-%d %H:%M:%S"),
    )
}

/// Disconnect reason, with a default for blanks.
pub fn disconnect_reason(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        "no authentication".to_string()
    } else {
        raw.to_string()
    }
}

/// PON description from the transmitter name and PON id.
pub fn pon_description(transmitter: Option<&str>, pon_id: &str) -> String {
    let pon_id = pon_id.trim();
    let pon_id = (!pon_id.is_empty() && pon_id != "0").then_some(pon_id);
    let transmitter = transmitter.map(str::trim).filter(|t| !t.is_empty());
    match (transmitter, pon_id) {
        (Some(t), Some(p)) => format!("{t} - {p}"),
        (Some(t), None) => t.to_string(),
        (None, Some(p)) => p.to_string(),
        (None, None) => "no description".to_string(),
    }
}

pub fn offline_alert(client_id: &str, client_name: &str, login: &Login, pon: &str) -> String {
    format!(
        "❌ Problem: {}\n\
         Time: {}\n\
         PON: {pon}\n\
         Login: {}\n\n\
         Client: {client_id} - {client_name}",
        disconnect_reason(&login.disconnect_reason),
        login.last_connected,
        if login.login.is_empty() { "N/A" } else { &login.login },
    )
}

pub fn online_alert(client_id: &str, client_name: &str, pon: &str) -> String {
    format!("✅ Client back ONLINE\nPON: {pon}\n\nClient: {client_id} - {client_name}")
}


/// Alert for an answered call with no support ticket registered.
pub fn missing_attendance_alert(
    attendant: &str,
    clients: &[Client],
    ended_at: NaiveDateTime,
    phone: &str,
) -> String {
    let mut msg = format!("🔴 MISSING ATTENDANCE RECORD 🔴\n\nAttendant: {attendant}\n\n");
    match clients {
        [client] => msg.push_str(&format!("- Client: {} - {}\n", client.id, client.name)),
        _ => {
            msg.push_str("- Clients:\n");
            for client in clients {
                msg.push_str(&format!("   {} - {}\n", client.id, client.name));
            }
            msg.push('\n');
        }
    }
    msg.push_str(&format!("- Call time: {}\n", alert_time(ended_at)));
    msg.push_str(&format!("- Phone: {phone}"));
    msg
}
