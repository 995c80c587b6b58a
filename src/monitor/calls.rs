//! Missing-attendance monitor for answered phone calls.
//!
//! Each cycle reads the PBX call log since the cursor and keeps the calls
//! answered by a watched extension. The caller is matched to active clients,
//! first through the tickets the PBX files by itself (their text carries the
//! caller's number), then by searching the client phone fields. A call whose
//! clients have no support ticket opened that day by the answering attendant
//! is alerted to Telegram and to the attendant's WhatsApp group.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use opentelemetry::KeyValue;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{CycleReport, Monitor, minutes};
use crate::config::{Attendant, CallsConfig};
use crate::error::Result;
use crate::model::{Call, Client};
use crate::notify::{Dispatcher, format};
use crate::source::{CallSource, ClientSource};
use crate::state::{Cursor, StateStore};
use crate::telemetry::metrics;

const NAME: &str = "calls";

static EXTENSION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"\((\d{4})\)",
        r"ramal@(\d{4})",
        r"(\d{4}) Suporte",
        r"Suporte.*\((\d{4})\)",
    ])
});

static MESSAGE_PHONE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(?i)Telefone de contato:\s*0?(\d{10,11})",
        r"(?i)telefone:\s*0?(\d{10,11})",
        r"(?i)Contato realizado através do telefone:\s*0?(\d{10,11})",
    ])
});

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().filter_map(|p| Regex::new(p).ok()).collect()
}

fn first_capture(patterns: &[Regex], text: &str) -> Option<String> {
    patterns
        .iter()
        .find_map(|re| re.captures(text))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Answering extension embedded in a call's destination.
pub fn extension_of(destination: &str) -> Option<String> {
    first_capture(&EXTENSION_PATTERNS, destination)
}

/// Caller number quoted in an automatic ticket, as national digits.
pub fn phone_in_message(message: &str) -> Option<String> {
    first_capture(&MESSAGE_PHONE_PATTERNS, message).map(|p| national_digits(&p))
}

/// Whether a caller number can identify a client: at least area code and
/// number, and not withheld.
pub fn is_dialable(raw: &str) -> bool {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits == "0" || raw.to_lowercase().contains("anonymous") {
        return false;
    }
    digits.len() >= 10
}

/// Digits only, without the trunk prefix `0`.
pub fn national_digits(raw: &str) -> String {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    match digits.strip_prefix('0') {
        Some(rest) => rest.to_string(),
        None => digits,
    }
}

/// Number in the layout the client records use: `(DD) NNNNN-NNNN` for
/// mobiles, `(DD) NNNN-NNNN` for landlines, bare digits otherwise.
pub fn format_phone(raw: &str) -> String {
    let d = national_digits(raw);
    match d.len() {
        11 => format!("({}) {}-{}", &d[..2], &d[2..7], &d[7..]),
        10 => format!("({}) {}-{}", &d[..2], &d[2..6], &d[6..]),
        _ => d,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallsState {
    #[serde(default)]
    pub cursor: Cursor,
}

/// A call answered by a watched attendant.
struct Answered {
    call: Call,
    attendant: Attendant,
    ended_at: NaiveDateTime,
}

/// National phone digits → ids of the clients quoted with that number.
type PhoneIndex = HashMap<String, BTreeSet<String>>;

pub struct CallsMonitor {
    config: CallsConfig,
    calls: Arc<dyn CallSource>,
    clients: Arc<dyn ClientSource>,
    dispatcher: Dispatcher,
    store: StateStore<CallsState>,
    state: CallsState,
}

impl CallsMonitor {
    pub async fn new(
        config: CallsConfig,
        calls: Arc<dyn CallSource>,
        clients: Arc<dyn ClientSource>,
        dispatcher: Dispatcher,
        store: StateStore<CallsState>,
    ) -> Result<Self> {
        let state = store.load().await?;
        Ok(Self {
            config,
            calls,
            clients,
            dispatcher,
            store,
            state,
        })
    }

    pub fn state(&self) -> &CallsState {
        &self.state
    }

    fn answered(&self, calls: Vec<Call>, boundary: NaiveDateTime) -> Vec<Answered> {
        calls
            .into_iter()
            .filter(|c| !self.config.ignored_queues.contains(&c.queue))
            .filter(|c| c.status == self.config.answered_status)
            .filter_map(|call| {
                let extension = extension_of(&call.destination)?;
                let attendant = self.config.attendant(&extension)?.clone();
                let ended_at = call.ended_at.filter(|t| *t > boundary)?;
                Some(Answered {
                    call,
                    attendant,
                    ended_at,
                })
            })
            .collect()
    }

    /// Phone numbers quoted by the automatic tickets filed on `day`.
    async fn automatic_index(&self, day: NaiveDate) -> PhoneIndex {
        let mut index = PhoneIndex::new();
        for subject in &self.config.automatic_subjects {
            let tickets = match self.clients.support_tickets_with_subject(*subject).await {
                Ok(tickets) => tickets,
                Err(e) => {
                    warn!(subject, error = %e, "automatic ticket lookup failed");
                    continue;
                }
            };
            for ticket in tickets {
                if ticket.created_at.map(|t| t.date()) != Some(day) {
                    continue;
                }
                if let (Some(phone), Some(client_id)) =
                    (phone_in_message(&ticket.message), ticket.client_id)
                {
                    index.entry(phone).or_default().insert(client_id);
                }
            }
        }
        index
    }

    /// Active clients matching the caller. Lookup failures narrow the
    /// result instead of failing the call.
    async fn find_clients(&self, origin: &str, index: &PhoneIndex) -> Vec<Client> {
        let mut found: Vec<Client> = Vec::new();
        for id in index.get(&national_digits(origin)).into_iter().flatten() {
            match self.clients.client(id).await {
                Ok(Some(client)) if client.active => found.push(client),
                Ok(Some(_)) => debug!(client_id = %id, "quoted client is inactive"),
                Ok(None) => {}
                Err(e) => warn!(client_id = %id, error = %e, "client lookup failed"),
            }
        }
        if !found.is_empty() {
            return found;
        }

        let phone = format_phone(origin);
        for field in &self.config.phone_fields {
            match self.clients.clients_by_phone(field, &phone).await {
                Ok(clients) => {
                    for client in clients.into_iter().filter(|c| c.active) {
                        if !found.iter().any(|f| f.id == client.id) {
                            found.push(client);
                        }
                    }
                }
                Err(e) => warn!(field = %field, error = %e, "client lookup by phone failed"),
            }
        }
        found
    }

    /// Whether any of `clients` got a support ticket on `day` from the
    /// attendant's responsible id.
    async fn attendance_registered(
        &self,
        clients: &[Client],
        responsible_id: &str,
        day: NaiveDate,
    ) -> Result<bool> {
        for client in clients {
            let tickets = self.clients.support_tickets_of_client(&client.id).await?;
            let registered = tickets.iter().any(|t| {
                t.created_at.is_some_and(|c| c.date() == day)
                    && t.responsible_id.as_deref() == Some(responsible_id)
            });
            if registered {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[async_trait]
impl Monitor for CallsMonitor {
    fn name(&self) -> &'static str {
        NAME
    }

    fn interval(&self) -> Duration {
        minutes(self.config.interval_minutes)
    }

    async fn run_cycle(&mut self, now: NaiveDateTime) -> Result<CycleReport> {
        let boundary = self.state.cursor.boundary(now);
        let calls = self.calls.calls_since(boundary).await?;
        let logged = calls.len();
        let answered = self.answered(calls, boundary);
        info!(%boundary, logged, answered = answered.len(), "call log fetched");

        let index = if answered.is_empty() {
            PhoneIndex::new()
        } else {
            self.automatic_index(now.date()).await
        };

        let mut report = CycleReport::default();
        for Answered {
            call,
            attendant,
            ended_at,
        } in &answered
        {
            report.examined += 1;
            if !is_dialable(&call.origin) {
                debug!(call_id = %call.id, origin = %call.origin, "caller number not usable");
                continue;
            }

            let clients = self.find_clients(&call.origin, &index).await;
            if clients.is_empty() {
                debug!(call_id = %call.id, "no active client for caller");
                continue;
            }

            match self
                .attendance_registered(&clients, &attendant.responsible_id, ended_at.date())
                .await
            {
                Ok(true) => {
                    debug!(call_id = %call.id, "attendance registered");
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(call_id = %call.id, error = %e, "attendance lookup failed, skipping call");
                    report.skipped += 1;
                    continue;
                }
            }

            report.violations += 1;
            metrics::violations().add(1, &[KeyValue::new("kind", "missing-attendance")]);
            let text = format::missing_attendance_alert(
                &attendant.name,
                &clients,
                *ended_at,
                &format_phone(&call.origin),
            );
            let outcome = self
                .dispatcher
                .dispatch_to(&text, attendant.group.as_str())
                .await;
            if report.dispatched(NAME, &outcome) {
                info!(
                    call_id = %call.id,
                    extension = %attendant.extension,
                    clients = clients.len(),
                    "missing attendance alert sent"
                );
            } else {
                warn!(call_id = %call.id, "missing attendance alert not delivered");
            }
        }

        self.state.cursor.settle(now);
        if let Err(e) = self.store.save(&self.state).await {
            warn!(
                path = %self.store.path().display(),
                error = %e,
                "failed to persist calls state, keeping it in memory"
            );
        }
        Ok(report)
    }
}
