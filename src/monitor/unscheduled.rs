//! Open orders left without a schedule.
//!
//! An order that has been open for at least `min_open_minutes`, belongs to a
//! watched subject and whose support ticket is owned by a watched responsible
//! party is alerted, at most once per cool-down window. Cool-down entries of
//! orders that left the open set are dropped at the end of every cycle.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{CycleReport, Monitor, minutes};
use crate::config::UnscheduledConfig;
use crate::error::Result;
use crate::model::{TIMESTAMP_FORMAT, Ticket};
use crate::notify::{Dispatcher, format};
use crate::source::{LookupCache, TicketSource};
use crate::state::{CooldownCache, StateStore};

const NAME: &str = "unscheduled";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnscheduledState {
    #[serde(default)]
    pub cooldowns: CooldownCache,
}

pub struct UnscheduledMonitor {
    config: UnscheduledConfig,
    source: Arc<dyn TicketSource>,
    dispatcher: Dispatcher,
    store: StateStore<UnscheduledState>,
    state: UnscheduledState,
}

impl UnscheduledMonitor {
    pub async fn new(
        config: UnscheduledConfig,
        source: Arc<dyn TicketSource>,
        dispatcher: Dispatcher,
        store: StateStore<UnscheduledState>,
    ) -> Result<Self> {
        let state = store.load().await?;
        Ok(Self {
            config,
            source,
            dispatcher,
            store,
            state,
        })
    }

    pub fn state(&self) -> &UnscheduledState {
        &self.state
    }

    /// Watched responsible party of the order's support ticket, if any.
    async fn watched_responsible(&self, ticket: &Ticket) -> Option<String> {
        let support = ticket.support_ticket.as_deref()?;
        let responsible = match self.source.support_ticket_responsible(support).await {
            Ok(Some(r)) => r,
            Ok(None) => {
                debug!(ticket_id = %ticket.id, "support ticket has no responsible party");
                return None;
            }
            Err(e) => {
                warn!(ticket_id = %ticket.id, error = %e, "responsible lookup failed");
                return None;
            }
        };
        let id: u32 = responsible.parse().ok()?;
        self.config
            .responsible_ids
            .contains(&id)
            .then_some(responsible)
    }
}

#[async_trait]
impl Monitor for UnscheduledMonitor {
    fn name(&self) -> &'static str {
        NAME
    }

    fn interval(&self) -> Duration {
        minutes(self.config.interval_minutes)
    }

    async fn run_cycle(&mut self, now: NaiveDateTime) -> Result<CycleReport> {
        let tickets = self
            .source
            .tickets_with_status(&self.config.open_status)
            .await?;
        let min_open = chrono::Duration::minutes(self.config.min_open_minutes);
        let window = chrono::Duration::minutes(self.config.cooldown_minutes);

        let mut report = CycleReport::default();
        let mut lookups = LookupCache::new();
        let mut open = HashSet::new();

        for ticket in tickets
            .iter()
            .filter(|t| self.config.target_subjects.contains(&t.subject_id))
        {
            open.insert(ticket.id.0.clone());
            if now - ticket.opened_at < min_open {
                continue;
            }
            report.examined += 1;

            if self.state.cooldowns.is_suppressed(&ticket.id.0, now, window) {
                report.suppress(NAME);
                continue;
            }
            if ticket.support_ticket.is_none() {
                debug!(ticket_id = %ticket.id, "order has no support ticket");
                report.skipped += 1;
                continue;
            }
            let Some(responsible) = self.watched_responsible(ticket).await else {
                continue;
            };

            let responsible_name = lookups.employee(self.source.as_ref(), &responsible).await;
            let subject = lookups.subject(self.source.as_ref(), ticket.subject_id).await;
            let text = format::unscheduled_alert(ticket, &subject, &responsible_name);
            let outcome = self.dispatcher.dispatch(&text).await;

            if report.dispatched(NAME, &outcome) {
                info!(ticket_id = %ticket.id, "unscheduled order alert sent");
                let context = BTreeMap::from([
                    ("client_id".to_string(), ticket.client_id.clone()),
                    ("subject_id".to_string(), ticket.subject_id.to_string()),
                    (
                        "opened_at".to_string(),
                        ticket.opened_at.format(TIMESTAMP_FORMAT).to_string(),
                    ),
                    ("responsible_id".to_string(), responsible),
                ]);
                self.state.cooldowns.record(&ticket.id.0, now, context);
            }
        }

        let pruned = self.state.cooldowns.retain_live(&open);
        if pruned > 0 {
            debug!(pruned, "dropped cool-downs of closed orders");
        }
        if let Err(e) = self.store.save(&self.state).await {
            warn!(
                path = %self.store.path().display(),
                error = %e,
                "failed to persist unscheduled state, keeping it in memory"
            );
        }
        Ok(report)
    }
}
