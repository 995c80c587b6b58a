//! Violation rule engine.
//!
//! Replays a ticket's normalized events left to right and emits violations
//! for actions taken by restricted operators. The replay is a pure fold: the
//! same events and rule set always give the same final state and the same
//! violation list, which is what makes re-running a window harmless.
//!
//! Per event, in order:
//! 1. a reschedule marker latches `reschedule_in_progress`;
//! 2. after a supervisor escalation, any assignment or scheduling change by a
//!    restricted operator is `action-after-escalation` and nothing else;
//! 3. otherwise a restricted operator's event is checked for
//!    `same-day-schedule` and, before any reschedule, `technician-changed`
//!    and `status-reverted`;
//! 4. rolling state is updated regardless of operator;
//! 5. an escalation operator's technician change latches
//!    `escalated_by_supervisor` for the events that follow.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::model::{Event, EventType, OperatorId, TechnicianId, Violation, ViolationKind};

/// Fixed rule set, parameterized by who is watched and which codes matter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    /// Operators whose actions are checked.
    pub restricted_operators: BTreeSet<OperatorId>,
    /// Supervisors whose technician change escalates the ticket.
    pub escalation_operators: BTreeSet<OperatorId>,
    /// Status code meaning "in progress".
    pub in_progress_status: String,
    /// Resulting statuses that mark a reschedule.
    pub reschedule_statuses: BTreeSet<String>,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self {
            restricted_operators: BTreeSet::new(),
            escalation_operators: BTreeSet::new(),
            in_progress_status: "EN".to_string(),
            reschedule_statuses: BTreeSet::from(["RAG".to_string()]),
        }
    }
}

impl RuleSet {
    pub fn is_restricted(&self, operator: OperatorId) -> bool {
        self.restricted_operators.contains(&operator)
    }

    pub fn is_escalation(&self, operator: OperatorId) -> bool {
        self.escalation_operators.contains(&operator)
    }

    /// One predicate for both ways a reschedule shows up in the history: the
    /// dedicated event type or a reschedule status.
    pub fn is_reschedule_marker(&self, event: &Event) -> bool {
        event.event_type == EventType::Reschedule
            || event
                .status
                .as_ref()
                .is_some_and(|s| self.reschedule_statuses.contains(s))
    }
}

/// Rolling state of one ticket during a replay.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RuleEngineState {
    pub technician: Option<TechnicianId>,
    pub technician_set_by: Option<OperatorId>,
    pub status: Option<String>,
    /// Resulting date of the last schedule set by anyone.
    pub last_scheduled: Option<NaiveDate>,
    pub last_scheduled_by: Option<OperatorId>,
    /// Calendar date of the event that set `last_scheduled`.
    pub last_scheduled_on: Option<NaiveDate>,
    pub reschedule_in_progress: bool,
    pub escalated_by_supervisor: bool,
}

/// Output of a replay.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Replay {
    pub state: RuleEngineState,
    /// In chronological order of the events that produced them.
    pub violations: Vec<Violation>,
}

/// Stateless engine; all state lives in [`RuleEngineState`].
#[derive(Debug, Clone, Copy)]
pub struct RuleEngine<'a> {
    rules: &'a RuleSet,
}

impl<'a> RuleEngine<'a> {
    pub fn new(rules: &'a RuleSet) -> Self {
        Self { rules }
    }

    /// Replay a chronologically ordered event sequence from an empty state.
    pub fn replay(&self, events: &[Event]) -> Replay {
        let mut replay = Replay::default();
        for event in events {
            self.step(&mut replay.state, event, &mut replay.violations);
        }
        replay
    }

    /// Apply one event: checks first, then state updates.
    pub fn step(&self, state: &mut RuleEngineState, event: &Event, out: &mut Vec<Violation>) {
        let rules = self.rules;

        if rules.is_reschedule_marker(event) {
            state.reschedule_in_progress = true;
        }

        let restricted = rules.is_restricted(event.operator);
        let guarded = matches!(
            event.event_type,
            EventType::TechnicianChange | EventType::SchedulingChange
        );

        if state.escalated_by_supervisor && restricted && guarded {
            out.push(violation(
                ViolationKind::ActionAfterEscalation,
                "changed the order after a supervisor escalation".to_string(),
                event,
            ));
        } else if restricted {
            if let Some(v) = self.same_day_schedule(state, event) {
                out.push(v);
            }
            if !state.reschedule_in_progress {
                if let Some(v) = self.technician_changed(state, event) {
                    out.push(v);
                }
                if let Some(v) = self.status_reverted(state, event) {
                    out.push(v);
                }
            }
        }

        apply(state, event);

        if rules.is_escalation(event.operator) && event.event_type == EventType::TechnicianChange {
            state.escalated_by_supervisor = true;
        }
    }

    fn same_day_schedule(&self, state: &RuleEngineState, event: &Event) -> Option<Violation> {
        if event.event_type != EventType::SchedulingChange {
            return None;
        }
        let scheduled = event.scheduled_date()?;
        if scheduled != event.timestamp.date() {
            return None;
        }
        let description = match state.last_scheduled {
            Some(previous) if previous != scheduled => {
                format!("scheduled for the same day (was {})", previous.format("%d/%m/%Y"))
            }
            _ => "scheduled for the same day".to_string(),
        };
        Some(violation(ViolationKind::SameDaySchedule, description, event))
    }

    fn technician_changed(&self, state: &RuleEngineState, event: &Event) -> Option<Violation> {
        if event.event_type != EventType::TechnicianChange {
            return None;
        }
        let new = event.technician?;
        let previous = state.technician?;
        let set_by_restricted = state
            .technician_set_by
            .is_some_and(|op| self.rules.is_restricted(op));
        if set_by_restricted || new == previous {
            return None;
        }
        Some(violation(
            ViolationKind::TechnicianChanged,
            format!("technician changed from {previous} to {new}"),
            event,
        ))
    }

    fn status_reverted(&self, state: &RuleEngineState, event: &Event) -> Option<Violation> {
        if event.event_type != EventType::SchedulingChange {
            return None;
        }
        let in_progress = &self.rules.in_progress_status;
        if state.status.as_ref() != Some(in_progress) {
            return None;
        }
        let next = event.status.as_ref().filter(|s| *s != in_progress)?;
        Some(violation(
            ViolationKind::StatusReverted,
            format!("status changed from {in_progress} to {next}"),
            event,
        ))
    }
}

fn apply(state: &mut RuleEngineState, event: &Event) {
    if event.event_type == EventType::TechnicianChange {
        if let Some(technician) = event.technician {
            state.technician = Some(technician);
            state.technician_set_by = Some(event.operator);
        }
    }
    if let Some(status) = &event.status {
        state.status = Some(status.clone());
    }
    if event.event_type == EventType::SchedulingChange {
        if let Some(date) = event.scheduled_date() {
            state.last_scheduled = Some(date);
            state.last_scheduled_by = Some(event.operator);
            state.last_scheduled_on = Some(event.timestamp.date());
        }
    }
}

fn violation(kind: ViolationKind, description: String, event: &Event) -> Violation {
    Violation {
        kind,
        description,
        timestamp: event.timestamp,
        annotation: event.annotation.clone(),
        scheduled_for: event.scheduled_date(),
    }
}
