//! Monitors driven by the control plane.
//!
//! A monitor runs one cycle at a time: fetch candidates, evaluate them,
//! dispatch alerts, persist its state. Failures on a single entity are
//! logged and skipped; only a failed candidate fetch fails the cycle, and
//! then nothing is persisted.

pub mod calls;
pub mod compliance;
pub mod connectivity;
pub mod unscheduled;

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use opentelemetry::KeyValue;
use serde::Serialize;

use crate::error::Result;
use crate::notify::DispatchOutcome;
use crate::telemetry::metrics;

pub use calls::{CallsMonitor, CallsState};
pub use compliance::{ComplianceMonitor, ComplianceState};
pub use connectivity::{ConnectivityMonitor, ConnectivityState};
pub use unscheduled::{UnscheduledMonitor, UnscheduledState};

#[async_trait]
pub trait Monitor: Send {
    fn name(&self) -> &'static str;

    /// Time between the end of one cycle and the start of the next.
    fn interval(&self) -> Duration;

    /// Run one cycle as of `now` (local time, same clock as the source).
    async fn run_cycle(&mut self, now: NaiveDateTime) -> Result<CycleReport>;
}

/// Counters for one cycle, logged by the control plane.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Entities evaluated.
    pub examined: usize,
    pub violations: usize,
    pub alerts_sent: usize,
    pub alerts_failed: usize,
    /// Alerts held back by a cool-down.
    pub suppressed: usize,
    /// Entities skipped because a lookup failed or data was missing.
    pub skipped: usize,
}

impl CycleReport {
    /// Count a dispatch outcome and report whether it was delivered.
    pub(crate) fn dispatched(&mut self, monitor: &'static str, outcome: &DispatchOutcome) -> bool {
        let delivered = outcome.delivered_any();
        let result = if delivered {
            self.alerts_sent += 1;
            "delivered"
        } else {
            self.alerts_failed += 1;
            "failed"
        };
        metrics::alerts_dispatched().add(
            1,
            &[
                KeyValue::new("monitor", monitor),
                KeyValue::new("result", result),
            ],
        );
        delivered
    }

    pub(crate) fn suppress(&mut self, monitor: &'static str) {
        self.suppressed += 1;
        metrics::alerts_suppressed().add(1, &[KeyValue::new("monitor", monitor)]);
    }
}

pub(crate) fn minutes(n: u64) -> Duration {
    Duration::from_secs(n * 60)
}
