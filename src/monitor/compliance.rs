//! Restricted-operator compliance monitor.
//!
//! Each cycle fetches the orders updated since the cursor, replays the new
//! part of every candidate's history through the rule engine and sends one
//! alert per ticket with violations. The cursor settles on the cycle's start
//! only after the cycle completes.
//!
//! A ticket whose history could not be fetched, or whose alert could not be
//! delivered, is kept in `retry` together with the boundary it was examined
//! against, and replayed from that boundary next cycle.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDateTime, NaiveTime};
use opentelemetry::KeyValue;
use serde::{Deserialize, Serialize};
use tracing::{Instrument, debug, info, warn};

use super::{CycleReport, Monitor, minutes};
use crate::config::ComplianceConfig;
use crate::engine::{RuleEngine, RuleSet};
use crate::error::Result;
use crate::model::{Ticket, TicketId, TicketReport};
use crate::normalize::normalize;
use crate::notify::{Dispatcher, format};
use crate::source::{LookupCache, TicketSource};
use crate::state::{Cursor, StateStore};
use crate::telemetry::cycle::{record_violations, start_ticket_span};
use crate::telemetry::metrics;

const NAME: &str = "compliance";

/// Ticket id → (snapshot, boundary to replay from).
type Candidates = BTreeMap<TicketId, (Ticket, NaiveDateTime)>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceState {
    #[serde(default)]
    pub cursor: Cursor,
    /// Tickets to re-examine, with the boundary they still need.
    #[serde(default)]
    pub retry: BTreeMap<TicketId, NaiveDateTime>,
}

pub struct ComplianceMonitor {
    config: ComplianceConfig,
    rules: RuleSet,
    source: Arc<dyn TicketSource>,
    dispatcher: Dispatcher,
    store: StateStore<ComplianceState>,
    state: ComplianceState,
}

impl ComplianceMonitor {
    /// Build the monitor and load its persisted state.
    pub async fn new(
        config: ComplianceConfig,
        source: Arc<dyn TicketSource>,
        dispatcher: Dispatcher,
        store: StateStore<ComplianceState>,
    ) -> Result<Self> {
        let state = store.load().await?;
        Ok(Self {
            rules: config.rule_set(),
            config,
            source,
            dispatcher,
            store,
            state,
        })
    }

    pub fn state(&self) -> &ComplianceState {
        &self.state
    }

    fn is_candidate(&self, ticket: &Ticket) -> bool {
        self.config.watched_statuses.contains(&ticket.status)
            && self.config.targets_subject(ticket.subject_id)
    }

    /// Replay the part of a ticket's history after `boundary`.
    ///
    /// Returns `Ok(None)` when nothing is wrong. Errors only when the
    /// message history cannot be fetched.
    pub async fn examine(
        &self,
        ticket: &Ticket,
        boundary: NaiveDateTime,
        lookups: &mut LookupCache,
    ) -> Result<Option<TicketReport>> {
        let messages = self.source.ticket_messages(&ticket.id).await?;
        let normalized = normalize(&messages, &self.config.events, Some(boundary));
        if normalized.dropped > 0 {
            debug!(ticket_id = %ticket.id, dropped = normalized.dropped, "malformed messages dropped");
        }

        let replay = RuleEngine::new(&self.rules).replay(&normalized.events);
        if replay.violations.is_empty() {
            return Ok(None);
        }
        for v in &replay.violations {
            metrics::violations().add(1, &[KeyValue::new("kind", v.kind.as_str())]);
        }

        let subject = lookups
            .subject(self.source.as_ref(), ticket.subject_id)
            .await;
        Ok(Some(TicketReport {
            ticket_id: ticket.id.clone(),
            client_id: ticket.client_id.clone(),
            subject,
            violations: replay.violations,
        }))
    }

    /// Candidates for this cycle, each with the boundary to replay from.
    async fn candidates(
        &self,
        boundary: NaiveDateTime,
        start_of_day: NaiveDateTime,
    ) -> Result<(Candidates, BTreeMap<TicketId, NaiveDateTime>)> {
        let mut candidates = BTreeMap::new();
        for ticket in self.source.tickets_updated_since(boundary).await? {
            if self.is_candidate(&ticket) {
                candidates.insert(ticket.id.clone(), (ticket, boundary));
            }
        }

        let mut still_pending = BTreeMap::new();
        for (id, pending) in &self.state.retry {
            let pending = (*pending).max(start_of_day);
            if let Some((_, b)) = candidates.get_mut(id) {
                *b = (*b).min(pending);
                continue;
            }
            match self.source.ticket(id).await {
                Ok(Some(ticket)) if self.is_candidate(&ticket) => {
                    candidates.insert(id.clone(), (ticket, pending));
                }
                Ok(_) => debug!(ticket_id = %id, "retry ticket no longer a candidate"),
                Err(e) => {
                    warn!(ticket_id = %id, error = %e, "retry ticket lookup failed");
                    still_pending.insert(id.clone(), pending);
                }
            }
        }
        Ok((candidates, still_pending))
    }
}

#[async_trait]
impl Monitor for ComplianceMonitor {
    fn name(&self) -> &'static str {
        NAME
    }

    fn interval(&self) -> Duration {
        minutes(self.config.interval_minutes)
    }

    async fn run_cycle(&mut self, now: NaiveDateTime) -> Result<CycleReport> {
        let boundary = self.state.cursor.boundary(now);
        let start_of_day = now.date().and_time(NaiveTime::MIN);
        let (candidates, mut retry) = self.candidates(boundary, start_of_day).await?;
        info!(%boundary, candidates = candidates.len(), "compliance candidates fetched");

        let mut report = CycleReport::default();
        let mut lookups = LookupCache::new();

        for (id, (ticket, ticket_boundary)) in &candidates {
            let span = start_ticket_span(&id.0);
            let examined = self
                .examine(ticket, *ticket_boundary, &mut lookups)
                .instrument(span.clone())
                .await;
            report.examined += 1;

            let ticket_report = match examined {
                Ok(Some(r)) => r,
                Ok(None) => continue,
                Err(e) => {
                    warn!(ticket_id = %id, error = %e, "message fetch failed, retrying next cycle");
                    report.skipped += 1;
                    retry.insert(id.clone(), *ticket_boundary);
                    continue;
                }
            };

            record_violations(&span, ticket_report.violations.len());
            report.violations += ticket_report.violations.len();
            let text = format::compliance_alert(&ticket_report);
            let outcome = self.dispatcher.dispatch(&text).await;
            if report.dispatched(NAME, &outcome) {
                info!(
                    ticket_id = %id,
                    violations = ticket_report.violations.len(),
                    "compliance alert sent"
                );
            } else {
                warn!(ticket_id = %id, "compliance alert not delivered, retrying next cycle");
                retry.insert(id.clone(), *ticket_boundary);
            }
        }

        self.state.retry = retry;
        self.state.cursor.settle(now);
        if let Err(e) = self.store.save(&self.state).await {
            warn!(
                path = %self.store.path().display(),
                error = %e,
                "failed to persist compliance state, keeping it in memory"
            );
        }
        Ok(report)
    }
}
