//! Integration tests for the monitors and the control plane, driven by
//! in-process fakes.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use serde_json::json;
use ticketwatch::config::{
    CallsConfig, ComplianceConfig, ConnectivityConfig, UnscheduledConfig, WatchedClient,
};
use ticketwatch::engine::{ControlConfig, ControlPlane, LoopState};
use ticketwatch::error::{Error, Result};
use ticketwatch::model::*;
use ticketwatch::monitor::*;
use ticketwatch::notify::{ChannelError, Dispatcher, NotifyChannel};
use ticketwatch::source::{CallSource, ClientSource, NetworkSource, RawMessage, TicketSource};
use ticketwatch::state::StateStore;
use uuid::Uuid;

const RESTRICTED: u32 = 283;
const SUBJECT: u32 = 544;
const RESPONSIBLE: &str = "345";

fn ts(raw: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT).unwrap()
}

fn state_path(name: &str) -> PathBuf {
    std::env::temp_dir()
        .join(format!("ticketwatch-monitor-{}", Uuid::new_v4()))
        .join(name)
}

fn ticket(id: &str, status: &str, opened_at: &str) -> Ticket {
    Ticket {
        id: TicketId::from(id),
        client_id: "77".to_string(),
        subject_id: SUBJECT,
        opened_at: ts(opened_at),
        status: status.to_string(),
        technician: None,
        support_ticket: Some(format!("s{id}")),
    }
}

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

#[derive(Default)]
struct FakeSource {
    tickets: Mutex<Vec<Ticket>>,
    /// Returned by `tickets_updated_since`, whatever the boundary.
    updated: Mutex<Vec<TicketId>>,
    messages: Mutex<HashMap<TicketId, Vec<RawMessage>>>,
    failing: Mutex<HashSet<TicketId>>,
    responsible: Mutex<HashMap<String, String>>,
    logins: Mutex<HashMap<String, Vec<Login>>>,
    clients: Mutex<HashMap<String, Client>>,
    /// (field, formatted phone) → client ids.
    phone_book: Mutex<HashMap<(String, String), Vec<String>>>,
    support_tickets: Mutex<Vec<(u32, SupportTicket)>>,
}

impl FakeSource {
    fn add_ticket(&self, ticket: Ticket, updated: bool) {
        if updated {
            self.updated.lock().unwrap().push(ticket.id.clone());
        }
        self.responsible.lock().unwrap().insert(
            ticket.support_ticket.clone().unwrap_or_default(),
            RESPONSIBLE.to_string(),
        );
        self.tickets.lock().unwrap().push(ticket);
    }

    fn set_messages(&self, id: &str, messages: serde_json::Value) {
        let parsed: Vec<RawMessage> = serde_json::from_value(messages).unwrap();
        self.messages
            .lock()
            .unwrap()
            .insert(TicketId::from(id), parsed);
    }

    fn set_failing(&self, id: &str, failing: bool) {
        let mut set = self.failing.lock().unwrap();
        if failing {
            set.insert(TicketId::from(id));
        } else {
            set.remove(&TicketId::from(id));
        }
    }

    fn set_online(&self, client: &str, online: bool) {
        self.logins.lock().unwrap().insert(
            client.to_string(),
            vec![Login {
                id: "5".to_string(),
                login: format!("c{client}"),
                active: true,
                online,
                disconnect_reason: String::new(),
                last_connected: "2024-03-01 07:00:00".to_string(),
            }],
        );
    }
}

impl FakeSource {
    fn add_client(&self, id: &str, name: &str, active: bool) {
        self.clients.lock().unwrap().insert(
            id.to_string(),
            Client {
                id: id.to_string(),
                name: name.to_string(),
                active,
            },
        );
    }

    fn add_phone(&self, field: &str, phone: &str, client: &str) {
        self.phone_book
            .lock()
            .unwrap()
            .entry((field.to_string(), phone.to_string()))
            .or_default()
            .push(client.to_string());
    }

    fn add_support_ticket(&self, subject: u32, client: &str, created: &str, by: &str, text: &str) {
        let mut tickets = self.support_tickets.lock().unwrap();
        let id = tickets.len().to_string();
        tickets.push((
            subject,
            SupportTicket {
                id,
                client_id: Some(client.to_string()),
                created_at: Some(ts(created)),
                message: text.to_string(),
                responsible_id: Some(by.to_string()),
            },
        ));
    }
}

#[async_trait]
impl TicketSource for FakeSource {
    async fn tickets_updated_since(&self, _since: NaiveDateTime) -> Result<Vec<Ticket>> {
        let updated = self.updated.lock().unwrap().clone();
        Ok(self
            .tickets
            .lock()
            .unwrap()
            .iter()
            .filter(|t| updated.contains(&t.id))
            .cloned()
            .collect())
    }

    async fn tickets_with_status(&self, status: &str) -> Result<Vec<Ticket>> {
        Ok(self
            .tickets
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.status == status)
            .cloned()
            .collect())
    }

    async fn ticket(&self, id: &TicketId) -> Result<Option<Ticket>> {
        Ok(self
            .tickets
            .lock()
            .unwrap()
            .iter()
            .find(|t| &t.id == id)
            .cloned())
    }

    async fn ticket_messages(&self, id: &TicketId) -> Result<Vec<RawMessage>> {
        if self.failing.lock().unwrap().contains(id) {
            return Err(Error::Api {
                endpoint: "su_oss_chamado_mensagem".to_string(),
                status: 502,
            });
        }
        Ok(self
            .messages
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .unwrap_or_default())
    }

    async fn subject_name(&self, _subject_id: u32) -> Result<Option<String>> {
        Ok(Some("FIBER INSTALL".to_string()))
    }

    async fn support_ticket_responsible(&self, support_ticket: &str) -> Result<Option<String>> {
        Ok(self.responsible.lock().unwrap().get(support_ticket).cloned())
    }

    async fn employee_name(&self, _employee_id: &str) -> Result<Option<String>> {
        Ok(Some("Ana".to_string()))
    }
}

#[async_trait]
impl NetworkSource for FakeSource {
    async fn client_logins(&self, client_id: &str) -> Result<Vec<Login>> {
        Ok(self
            .logins
            .lock()
            .unwrap()
            .get(client_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn fiber_details(&self, _login_id: &str) -> Result<Option<FiberDetails>> {
        Ok(Some(FiberDetails {
            transmitter_id: "3".to_string(),
            pon_id: "0/1/4".to_string(),
        }))
    }

    async fn transmitter_name(&self, _transmitter_id: &str) -> Result<Option<String>> {
        Ok(Some("OLT-CENTER".to_string()))
    }
}

#[async_trait]
impl ClientSource for FakeSource {
    async fn support_tickets_with_subject(&self, subject_id: u32) -> Result<Vec<SupportTicket>> {
        Ok(self
            .support_tickets
            .lock()
            .unwrap()
            .iter()
            .filter(|(subject, _)| *subject == subject_id)
            .map(|(_, t)| t.clone())
            .collect())
    }

    async fn support_tickets_of_client(&self, client_id: &str) -> Result<Vec<SupportTicket>> {
        if self.failing.lock().unwrap().contains(&TicketId::from(client_id)) {
            return Err(Error::Api {
                endpoint: "su_ticket".to_string(),
                status: 503,
            });
        }
        Ok(self
            .support_tickets
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, t)| t.client_id.as_deref() == Some(client_id))
            .map(|(_, t)| t.clone())
            .collect())
    }

    async fn client(&self, client_id: &str) -> Result<Option<Client>> {
        Ok(self.clients.lock().unwrap().get(client_id).cloned())
    }

    async fn clients_by_phone(&self, field: &str, phone: &str) -> Result<Vec<Client>> {
        let ids = self
            .phone_book
            .lock()
            .unwrap()
            .get(&(field.to_string(), phone.to_string()))
            .cloned()
            .unwrap_or_default();
        let clients = self.clients.lock().unwrap();
        Ok(ids.iter().filter_map(|id| clients.get(id).cloned()).collect())
    }
}

#[derive(Default)]
struct FakePbx {
    calls: Mutex<Vec<Call>>,
    since: Mutex<Vec<NaiveDateTime>>,
}

impl FakePbx {
    fn answered(&self, id: &str, destination: &str, origin: &str, ended: &str) {
        self.push(Call {
            id: id.to_string(),
            status: "Atendida".to_string(),
            destination: destination.to_string(),
            origin: origin.to_string(),
            ended_at: Some(ts(ended)),
            queue: "Suporte".to_string(),
        });
    }

    fn push(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl CallSource for FakePbx {
    async fn calls_since(&self, since: NaiveDateTime) -> Result<Vec<Call>> {
        self.since.lock().unwrap().push(since);
        Ok(self.calls.lock().unwrap().clone())
    }
}

#[derive(Default)]
struct FakeChannel {
    sent: Mutex<Vec<String>>,
    fail: AtomicBool,
}

impl FakeChannel {
    fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotifyChannel for FakeChannel {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn send(&self, text: &str) -> std::result::Result<(), ChannelError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ChannelError::Rejected("unavailable".to_string()));
        }
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

fn dispatcher(channel: &Arc<FakeChannel>) -> Dispatcher {
    let channels: Vec<Arc<dyn NotifyChannel>> = vec![channel.clone()];
    Dispatcher::new(channels)
}

// ---------------------------------------------------------------------------
// Compliance
// ---------------------------------------------------------------------------

fn violating_history() -> serde_json::Value {
    json!([
        {"data": "2024-03-01 09:00:00", "id_operador": "17", "id_evento": "4", "id_tecnico": "7"},
        {"data": "2024-03-01 10:10:00", "id_operador": RESTRICTED, "id_evento": "4",
         "id_tecnico": "9", "historico": "swapped"}
    ])
}

async fn compliance(source: &Arc<FakeSource>, channel: &Arc<FakeChannel>) -> ComplianceMonitor {
    ComplianceMonitor::new(
        ComplianceConfig::default(),
        source.clone(),
        dispatcher(channel),
        StateStore::new(state_path("compliance.json")),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn compliance_alerts_once_per_violating_ticket() {
    let source = Arc::new(FakeSource::default());
    source.add_ticket(ticket("10", "EN", "2024-03-01 08:00:00"), true);
    source.set_messages("10", violating_history());
    source.add_ticket(ticket("11", "EN", "2024-03-01 08:00:00"), true);
    let channel = Arc::new(FakeChannel::default());
    let mut monitor = compliance(&source, &channel).await;

    let now = ts("2024-03-01 11:00:00");
    let report = monitor.run_cycle(now).await.unwrap();

    assert_eq!(report.examined, 2);
    assert_eq!(report.violations, 1);
    assert_eq!(report.alerts_sent, 1);
    let sent = channel.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].contains("Order ID: 10"));
    assert!(sent[0].contains("01/03/2024 - 10:10"));
    assert_eq!(monitor.state().cursor.last(), Some(ts("2024-03-01 10:59:59")));
    assert!(monitor.state().retry.is_empty());
}

#[tokio::test]
async fn compliance_ignores_unwatched_status_and_subject() {
    let source = Arc::new(FakeSource::default());
    source.add_ticket(ticket("10", "F", "2024-03-01 08:00:00"), true);
    let mut other_subject = ticket("12", "EN", "2024-03-01 08:00:00");
    other_subject.subject_id = 1;
    source.add_ticket(other_subject, true);
    source.set_messages("10", violating_history());
    source.set_messages("12", violating_history());
    let channel = Arc::new(FakeChannel::default());
    let mut monitor = compliance(&source, &channel).await;

    let report = monitor.run_cycle(ts("2024-03-01 11:00:00")).await.unwrap();

    assert_eq!(report.examined, 0);
    assert!(channel.sent().is_empty());
}

#[tokio::test]
async fn compliance_retries_ticket_whose_history_failed() {
    let source = Arc::new(FakeSource::default());
    source.add_ticket(ticket("10", "EN", "2024-03-01 08:00:00"), true);
    source.set_messages("10", violating_history());
    source.set_failing("10", true);
    let channel = Arc::new(FakeChannel::default());
    let mut monitor = compliance(&source, &channel).await;

    let first = monitor.run_cycle(ts("2024-03-01 11:00:00")).await.unwrap();
    assert_eq!(first.skipped, 1);
    assert!(channel.sent().is_empty());
    assert_eq!(
        monitor.state().retry.get(&TicketId::from("10")),
        Some(&ts("2024-03-01 00:00:00"))
    );
    assert_eq!(monitor.state().cursor.last(), Some(ts("2024-03-01 10:59:59")));

    // no longer reported as updated; reached through the retry map
    source.updated.lock().unwrap().clear();
    source.set_failing("10", false);
    let second = monitor.run_cycle(ts("2024-03-01 11:15:00")).await.unwrap();

    assert_eq!(second.alerts_sent, 1);
    assert_eq!(channel.sent().len(), 1);
    assert!(monitor.state().retry.is_empty());
}

#[tokio::test]
async fn compliance_keeps_undelivered_alert_for_retry() {
    let source = Arc::new(FakeSource::default());
    source.add_ticket(ticket("10", "AG", "2024-03-01 08:00:00"), true);
    source.set_messages("10", violating_history());
    let channel = Arc::new(FakeChannel::default());
    channel.fail.store(true, Ordering::SeqCst);
    let mut monitor = compliance(&source, &channel).await;

    let report = monitor.run_cycle(ts("2024-03-01 11:00:00")).await.unwrap();

    assert_eq!(report.alerts_failed, 1);
    assert!(monitor.state().retry.contains_key(&TicketId::from("10")));
}

#[tokio::test]
async fn compliance_state_survives_restart() {
    let source = Arc::new(FakeSource::default());
    let channel = Arc::new(FakeChannel::default());
    let path = state_path("compliance.json");
    let now = ts("2024-03-01 11:00:00");

    let mut monitor = ComplianceMonitor::new(
        ComplianceConfig::default(),
        source.clone(),
        dispatcher(&channel),
        StateStore::new(&path),
    )
    .await
    .unwrap();
    monitor.run_cycle(now).await.unwrap();

    let restarted = ComplianceMonitor::new(
        ComplianceConfig::default(),
        source.clone(),
        dispatcher(&channel),
        StateStore::new(&path),
    )
    .await
    .unwrap();
    assert_eq!(restarted.state().cursor.last(), Some(ts("2024-03-01 10:59:59")));
}

#[tokio::test]
async fn compliance_sees_event_recorded_later_in_cycle_start_second() {
    let source = Arc::new(FakeSource::default());
    source.add_ticket(ticket("10", "AG", "2024-03-01 08:00:00"), true);
    let channel = Arc::new(FakeChannel::default());
    let mut monitor = compliance(&source, &channel).await;

    let start = NaiveDate::from_ymd_opt(2024, 3, 1)
        .unwrap()
        .and_hms_milli_opt(10, 10, 0, 400)
        .unwrap();
    let first = monitor.run_cycle(start).await.unwrap();
    assert_eq!(first.violations, 0);

    // written at 10:10:00.700, stored with whole-second precision
    source.set_messages(
        "10",
        json!([
            {"data": "2024-03-01 10:10:00", "id_operador": RESTRICTED, "id_evento": "5",
             "status": "AG", "data_final": "2024-03-01 16:00:00"}
        ]),
    );
    let second = monitor.run_cycle(ts("2024-03-01 10:25:00")).await.unwrap();

    assert_eq!(second.violations, 1);
    assert_eq!(second.alerts_sent, 1);
    assert_eq!(channel.sent().len(), 1);
}

// ---------------------------------------------------------------------------
// Unscheduled
// ---------------------------------------------------------------------------

async fn unscheduled(
    source: &Arc<FakeSource>,
    channel: &Arc<FakeChannel>,
    path: PathBuf,
) -> UnscheduledMonitor {
    UnscheduledMonitor::new(
        UnscheduledConfig::default(),
        source.clone(),
        dispatcher(channel),
        StateStore::new(path),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn unscheduled_alerts_old_open_orders_of_watched_responsible() {
    let source = Arc::new(FakeSource::default());
    source.add_ticket(ticket("20", "A", "2024-03-01 09:00:00"), false);
    // too recent
    source.add_ticket(ticket("21", "A", "2024-03-01 09:50:00"), false);
    // responsible not watched
    source.add_ticket(ticket("22", "A", "2024-03-01 09:00:00"), false);
    source
        .responsible
        .lock()
        .unwrap()
        .insert("s22".to_string(), "1".to_string());
    let channel = Arc::new(FakeChannel::default());
    let mut monitor = unscheduled(&source, &channel, state_path("unscheduled.json")).await;

    let now = ts("2024-03-01 10:00:00");
    let report = monitor.run_cycle(now).await.unwrap();

    assert_eq!(report.alerts_sent, 1);
    let sent = channel.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].contains("Order ID: 20"));
    assert!(sent[0].contains("Responsible: Ana"));
    let entry = monitor.state().cooldowns.get("20").unwrap();
    assert_eq!(entry.last_alert, now);
    assert_eq!(
        entry.context.get("responsible_id").map(String::as_str),
        Some(RESPONSIBLE)
    );
}

#[tokio::test]
async fn unscheduled_cooldown_suppresses_then_expires() {
    let source = Arc::new(FakeSource::default());
    source.add_ticket(ticket("20", "A", "2024-03-01 09:00:00"), false);
    let channel = Arc::new(FakeChannel::default());
    let mut monitor = unscheduled(&source, &channel, state_path("unscheduled.json")).await;

    monitor.run_cycle(ts("2024-03-01 10:00:00")).await.unwrap();
    let again = monitor.run_cycle(ts("2024-03-01 10:29:00")).await.unwrap();
    assert_eq!(again.suppressed, 1);
    assert_eq!(channel.sent().len(), 1);

    let later = monitor.run_cycle(ts("2024-03-01 10:31:00")).await.unwrap();
    assert_eq!(later.alerts_sent, 1);
    assert_eq!(channel.sent().len(), 2);
}

#[tokio::test]
async fn unscheduled_rerun_of_same_window_leaves_cooldowns_unchanged() {
    let source = Arc::new(FakeSource::default());
    source.add_ticket(ticket("20", "A", "2024-03-01 09:00:00"), false);
    source.add_ticket(ticket("23", "A", "2024-03-01 08:00:00"), false);
    let channel = Arc::new(FakeChannel::default());
    let path = state_path("unscheduled.json");
    let now = ts("2024-03-01 10:00:00");

    let mut monitor = unscheduled(&source, &channel, path.clone()).await;
    monitor.run_cycle(now).await.unwrap();
    let once = monitor.state().clone();

    // crash and retry of the same window
    let mut restarted = unscheduled(&source, &channel, path).await;
    restarted.run_cycle(now).await.unwrap();

    assert_eq!(restarted.state(), &once);
}

#[tokio::test]
async fn unscheduled_drops_cooldown_when_order_leaves_open_set() {
    let source = Arc::new(FakeSource::default());
    source.add_ticket(ticket("20", "A", "2024-03-01 09:00:00"), false);
    let channel = Arc::new(FakeChannel::default());
    let mut monitor = unscheduled(&source, &channel, state_path("unscheduled.json")).await;

    monitor.run_cycle(ts("2024-03-01 10:00:00")).await.unwrap();
    assert_eq!(monitor.state().cooldowns.len(), 1);

    source.tickets.lock().unwrap()[0].status = "AG".to_string();
    monitor.run_cycle(ts("2024-03-01 10:05:00")).await.unwrap();
    assert!(monitor.state().cooldowns.is_empty());
}

#[tokio::test]
async fn unscheduled_failed_delivery_does_not_start_cooldown() {
    let source = Arc::new(FakeSource::default());
    source.add_ticket(ticket("20", "A", "2024-03-01 09:00:00"), false);
    let channel = Arc::new(FakeChannel::default());
    channel.fail.store(true, Ordering::SeqCst);
    let mut monitor = unscheduled(&source, &channel, state_path("unscheduled.json")).await;

    let report = monitor.run_cycle(ts("2024-03-01 10:00:00")).await.unwrap();

    assert_eq!(report.alerts_failed, 1);
    assert!(monitor.state().cooldowns.is_empty());
}

// ---------------------------------------------------------------------------
// Connectivity
// ---------------------------------------------------------------------------

async fn connectivity(source: &Arc<FakeSource>, channel: &Arc<FakeChannel>) -> ConnectivityMonitor {
    let config = ConnectivityConfig {
        clients: vec![WatchedClient {
            id: "1001".to_string(),
            name: "City Hall".to_string(),
        }],
        ..ConnectivityConfig::default()
    };
    ConnectivityMonitor::new(
        config,
        source.clone(),
        dispatcher(channel),
        StateStore::new(state_path("connectivity.json")),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn connectivity_alerts_offline_then_back_online() {
    let source = Arc::new(FakeSource::default());
    source.set_online("1001", false);
    let channel = Arc::new(FakeChannel::default());
    let mut monitor = connectivity(&source, &channel).await;

    monitor.run_cycle(ts("2024-03-01 10:00:00")).await.unwrap();
    let sent = channel.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].contains("no authentication"));
    assert!(sent[0].contains("OLT-CENTER - 0/1/4"));
    assert!(sent[0].contains("1001 - City Hall"));

    let again = monitor.run_cycle(ts("2024-03-01 21:59:00")).await.unwrap();
    assert_eq!(again.suppressed, 1);

    source.set_online("1001", true);
    monitor.run_cycle(ts("2024-03-01 22:00:00")).await.unwrap();
    assert_eq!(channel.sent().len(), 2);
    assert!(monitor.state().offline_alerts.is_empty());
    assert_eq!(monitor.state().last_online.get("1001"), Some(&true));

    // steady online state sends nothing
    monitor.run_cycle(ts("2024-03-01 22:10:00")).await.unwrap();
    assert_eq!(channel.sent().len(), 2);
}

#[tokio::test]
async fn connectivity_repeats_offline_alert_after_cooldown() {
    let source = Arc::new(FakeSource::default());
    source.set_online("1001", false);
    let channel = Arc::new(FakeChannel::default());
    let mut monitor = connectivity(&source, &channel).await;

    monitor.run_cycle(ts("2024-03-01 10:00:00")).await.unwrap();
    monitor.run_cycle(ts("2024-03-01 22:01:00")).await.unwrap();
    assert_eq!(channel.sent().len(), 2);
}

#[tokio::test]
async fn connectivity_retries_undelivered_back_online_alert() {
    let source = Arc::new(FakeSource::default());
    source.set_online("1001", false);
    let channel = Arc::new(FakeChannel::default());
    let mut monitor = connectivity(&source, &channel).await;
    monitor.run_cycle(ts("2024-03-01 10:00:00")).await.unwrap();

    source.set_online("1001", true);
    channel.fail.store(true, Ordering::SeqCst);
    let failed = monitor.run_cycle(ts("2024-03-01 10:10:00")).await.unwrap();
    assert_eq!(failed.alerts_failed, 1);
    assert_eq!(monitor.state().last_online.get("1001"), Some(&false));

    channel.fail.store(false, Ordering::SeqCst);
    monitor.run_cycle(ts("2024-03-01 10:20:00")).await.unwrap();
    assert_eq!(channel.sent().len(), 2);
    assert_eq!(monitor.state().last_online.get("1001"), Some(&true));
}

// ---------------------------------------------------------------------------
// Calls
// ---------------------------------------------------------------------------

const CALLER: &str = "011987654321";
const CALLER_FORMATTED: &str = "(11) 98765-4321";

struct CallChannels {
    shared: Arc<FakeChannel>,
    commercial: Arc<FakeChannel>,
    demands: Arc<FakeChannel>,
}

impl CallChannels {
    fn new() -> Self {
        Self {
            shared: Arc::new(FakeChannel::default()),
            commercial: Arc::new(FakeChannel::default()),
            demands: Arc::new(FakeChannel::default()),
        }
    }

    fn dispatcher(&self) -> Dispatcher {
        dispatcher(&self.shared)
            .with_route("commercial", self.commercial.clone())
            .with_route("demands", self.demands.clone())
    }
}

async fn calls(
    source: &Arc<FakeSource>,
    pbx: &Arc<FakePbx>,
    channels: &CallChannels,
) -> CallsMonitor {
    CallsMonitor::new(
        CallsConfig::default(),
        pbx.clone(),
        source.clone(),
        channels.dispatcher(),
        StateStore::new(state_path("calls.json")),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn calls_alert_unregistered_attendance_to_attendant_group() {
    let source = Arc::new(FakeSource::default());
    source.add_client("77", "Bakery", true);
    source.add_phone("whatsapp", CALLER_FORMATTED, "77");
    // filed by someone else
    source.add_support_ticket(1, "77", "2024-03-01 10:20:00", "359", "");
    let pbx = Arc::new(FakePbx::default());
    pbx.answered("c1", "Joao (4004)", CALLER, "2024-03-01 10:12:30");
    let channels = CallChannels::new();
    let mut monitor = calls(&source, &pbx, &channels).await;

    let report = monitor.run_cycle(ts("2024-03-01 10:40:00")).await.unwrap();

    assert_eq!(report.examined, 1);
    assert_eq!(report.violations, 1);
    assert_eq!(report.alerts_sent, 1);
    let sent = channels.demands.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].contains("Attendant: João Miyake"));
    assert!(sent[0].contains("- Client: 77 - Bakery"));
    assert!(sent[0].contains(CALLER_FORMATTED));
    assert_eq!(channels.shared.sent(), sent);
    assert!(channels.commercial.sent().is_empty());
    assert_eq!(monitor.state().cursor.last(), Some(ts("2024-03-01 10:39:59")));
}

#[tokio::test]
async fn calls_stay_quiet_when_attendant_filed_a_ticket_that_day() {
    let source = Arc::new(FakeSource::default());
    source.add_client("77", "Bakery", true);
    source.add_phone("fone", CALLER_FORMATTED, "77");
    source.add_support_ticket(1, "77", "2024-03-01 10:15:00", "268", "");
    let pbx = Arc::new(FakePbx::default());
    pbx.answered("c1", "SIP/ramal@1204-00a1", CALLER, "2024-03-01 10:12:30");
    let channels = CallChannels::new();
    let mut monitor = calls(&source, &pbx, &channels).await;

    let report = monitor.run_cycle(ts("2024-03-01 10:40:00")).await.unwrap();

    assert_eq!(report.examined, 1);
    assert_eq!(report.violations, 0);
    assert!(channels.shared.sent().is_empty());
}

#[tokio::test]
async fn calls_match_caller_through_automatic_ticket() {
    let source = Arc::new(FakeSource::default());
    source.add_client("78", "Garage", true);
    source.add_client("79", "Closed shop", false);
    source.add_support_ticket(
        324,
        "78",
        "2024-03-01 09:58:00",
        "0",
        "Ligação recebida. Telefone de contato: 11987654321",
    );
    source.add_support_ticket(324, "79", "2024-03-01 09:59:00", "0", "telefone: 11987654321");
    // yesterday's ticket does not count
    source.add_support_ticket(324, "80", "2024-02-29 18:00:00", "0", "telefone: 11987654321");
    source.add_client("80", "Old", true);
    let pbx = Arc::new(FakePbx::default());
    pbx.answered("c1", "Tamires (1204)", CALLER, "2024-03-01 10:00:00");
    let channels = CallChannels::new();
    let mut monitor = calls(&source, &pbx, &channels).await;

    monitor.run_cycle(ts("2024-03-01 10:40:00")).await.unwrap();

    let sent = channels.commercial.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].contains("- Client: 78 - Garage"));
    assert!(!sent[0].contains("Closed shop"));
    assert!(!sent[0].contains("Old"));
    assert!(channels.demands.sent().is_empty());
}

#[tokio::test]
async fn calls_outside_watch_are_ignored() {
    let source = Arc::new(FakeSource::default());
    source.add_client("77", "Bakery", true);
    source.add_phone("whatsapp", CALLER_FORMATTED, "77");
    let pbx = Arc::new(FakePbx::default());
    // unknown extension
    pbx.answered("c1", "Reception (9999)", CALLER, "2024-03-01 10:01:00");
    // withheld number
    pbx.answered("c2", "Joao (4004)", "0anonymous", "2024-03-01 10:02:00");
    let mut technicians = Call {
        id: "c3".to_string(),
        status: "Atendida".to_string(),
        destination: "Joao (4004)".to_string(),
        origin: CALLER.to_string(),
        ended_at: Some(ts("2024-03-01 10:03:00")),
        queue: "Suporte - Técnicos".to_string(),
    };
    pbx.push(technicians.clone());
    technicians.id = "c4".to_string();
    technicians.queue = "Suporte".to_string();
    technicians.status = "Não atendida".to_string();
    pbx.push(technicians);
    let channels = CallChannels::new();
    let mut monitor = calls(&source, &pbx, &channels).await;

    let report = monitor.run_cycle(ts("2024-03-01 10:40:00")).await.unwrap();

    assert_eq!(report.examined, 1);
    assert_eq!(report.violations, 0);
    assert!(channels.shared.sent().is_empty());
}

#[tokio::test]
async fn calls_before_the_cursor_are_not_alerted_again() {
    let source = Arc::new(FakeSource::default());
    source.add_client("77", "Bakery", true);
    source.add_phone("whatsapp", CALLER_FORMATTED, "77");
    let pbx = Arc::new(FakePbx::default());
    pbx.answered("c1", "Joao (4004)", CALLER, "2024-03-01 10:12:30");
    let channels = CallChannels::new();
    let mut monitor = calls(&source, &pbx, &channels).await;

    monitor.run_cycle(ts("2024-03-01 10:40:00")).await.unwrap();
    let again = monitor.run_cycle(ts("2024-03-01 11:20:00")).await.unwrap();

    assert_eq!(again.examined, 0);
    assert_eq!(channels.shared.sent().len(), 1);
    assert_eq!(
        *pbx.since.lock().unwrap(),
        vec![ts("2024-03-01 00:00:00"), ts("2024-03-01 10:39:59")]
    );
}

#[tokio::test]
async fn calls_skip_call_when_attendance_lookup_fails() {
    let source = Arc::new(FakeSource::default());
    source.add_client("77", "Bakery", true);
    source.add_phone("whatsapp", CALLER_FORMATTED, "77");
    source.set_failing("77", true);
    let pbx = Arc::new(FakePbx::default());
    pbx.answered("c1", "Joao (4004)", CALLER, "2024-03-01 10:12:30");
    let channels = CallChannels::new();
    let mut monitor = calls(&source, &pbx, &channels).await;

    let report = monitor.run_cycle(ts("2024-03-01 10:40:00")).await.unwrap();

    assert_eq!(report.skipped, 1);
    assert!(channels.shared.sent().is_empty());
}

// ---------------------------------------------------------------------------
// Control plane
// ---------------------------------------------------------------------------

struct CountingMonitor {
    cycles: Arc<AtomicUsize>,
}

#[async_trait]
impl Monitor for CountingMonitor {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn interval(&self) -> Duration {
        Duration::from_millis(10)
    }

    async fn run_cycle(&mut self, _now: NaiveDateTime) -> Result<CycleReport> {
        let n = self.cycles.fetch_add(1, Ordering::SeqCst);
        if n == 0 {
            return Err(Error::Config("first cycle fails".to_string()));
        }
        Ok(CycleReport::default())
    }
}

#[tokio::test]
async fn control_plane_survives_failed_cycles_and_stops_on_shutdown() {
    let cycles = Arc::new(AtomicUsize::new(0));
    let control = ControlPlane::new(ControlConfig {
        initial_delay: Duration::ZERO,
        error_backoff: Duration::from_millis(5),
    });

    let plane = control.clone();
    let monitors: Vec<Box<dyn Monitor>> = vec![Box::new(CountingMonitor {
        cycles: cycles.clone(),
    })];
    let handle = tokio::spawn(async move { plane.run(monitors).await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    control.shutdown();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("control plane did not stop")
        .unwrap()
        .unwrap();

    assert!(cycles.load(Ordering::SeqCst) >= 2);
    assert_eq!(control.state("counting"), Some(LoopState::Idle));
}
