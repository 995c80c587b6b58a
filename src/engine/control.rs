//! Control plane: drives each monitor through idle and running-cycle phases.
//!
//! Every monitor gets its own task. A cycle runs inside a span carrying a
//! fresh cycle id; its error is logged and the monitor goes back to idle
//! until the next interval. Nothing short of shutdown stops the loop.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use opentelemetry::KeyValue;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tracing::{Instrument, error, info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::monitor::{CycleReport, Monitor};
use crate::telemetry::cycle::{record_outcome, start_cycle_span};
use crate::telemetry::metrics;

/// Configuration for the control plane.
#[derive(Debug, Clone)]
pub struct ControlConfig {
    /// Delay before a monitor's first cycle. Zero runs it immediately.
    pub initial_delay: Duration,
    /// Interval used after a failed cycle instead of the monitor's own,
    /// when shorter.
    pub error_backoff: Duration,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::ZERO,
            error_backoff: Duration::from_secs(60),
        }
    }
}

/// Phase of one monitor's loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Idle,
    RunningCycle,
}

/// Polling orchestrator for a set of monitors.
#[derive(Clone)]
pub struct ControlPlane {
    config: ControlConfig,
    shutdown: Arc<Notify>,
    stopping: Arc<AtomicBool>,
    states: Arc<Mutex<HashMap<&'static str, LoopState>>>,
}

impl ControlPlane {
    pub fn new(config: ControlConfig) -> Self {
        Self {
            config,
            shutdown: Arc::new(Notify::new()),
            stopping: Arc::new(AtomicBool::new(false)),
            states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Signal every monitor loop to stop after its current cycle.
    pub fn shutdown(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        self.shutdown.notify_waiters();
    }

    /// Current phase of a monitor, if it has been started.
    pub fn state(&self, monitor: &str) -> Option<LoopState> {
        self.states
            .lock()
            .ok()
            .and_then(|states| states.get(monitor).copied())
    }

    fn set_state(&self, monitor: &'static str, state: LoopState) {
        if let Ok(mut states) = self.states.lock() {
            states.insert(monitor, state);
        }
    }

    /// Run every monitor until shutdown.
    pub async fn run(&self, monitors: Vec<Box<dyn Monitor>>) -> Result<()> {
        if monitors.is_empty() {
            warn!("no monitors enabled, nothing to do");
            return Ok(());
        }

        let mut tasks = JoinSet::new();
        for monitor in monitors {
            let plane = self.clone();
            tasks.spawn(async move { plane.drive(monitor).await });
        }
        info!(monitors = tasks.len(), "control plane started");

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!("monitor task aborted: {e}");
            }
        }
        info!("control plane stopped");
        Ok(())
    }

    async fn drive(&self, mut monitor: Box<dyn Monitor>) {
        let name = monitor.name();
        self.set_state(name, LoopState::Idle);
        let mut wait = self.config.initial_delay;

        loop {
            if !wait.is_zero() && !self.idle(wait).await {
                break;
            }
            if self.stopping.load(Ordering::SeqCst) {
                break;
            }

            self.set_state(name, LoopState::RunningCycle);
            let ok = run_cycle(monitor.as_mut()).await.is_ok();
            self.set_state(name, LoopState::Idle);

            wait = if ok {
                monitor.interval()
            } else {
                monitor.interval().min(self.config.error_backoff)
            };
        }
        info!(monitor = name, "monitor loop stopped");
    }

    /// Sleep for `wait`. Returns `false` if shutdown was signalled first.
    async fn idle(&self, wait: Duration) -> bool {
        let notified = self.shutdown.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.stopping.load(Ordering::SeqCst) {
            return false;
        }
        tokio::select! {
            _ = &mut notified => false,
            _ = tokio::time::sleep(wait) => true,
        }
    }
}

/// Run one cycle of `monitor` as of the local wall clock, with its span,
/// metrics and log line.
pub async fn run_cycle(monitor: &mut dyn Monitor) -> Result<CycleReport> {
    let name = monitor.name();
    let cycle_id = Uuid::new_v4();
    let span = start_cycle_span(name, &cycle_id);
    let now = chrono::Local::now().naive_local();
    let started = Instant::now();

    let result = monitor.run_cycle(now).instrument(span.clone()).await;

    let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
    metrics::cycle_duration_ms().record(duration_ms, &[KeyValue::new("monitor", name)]);

    span.in_scope(|| match &result {
        Ok(report) => {
            record_outcome(&span, "ok");
            metrics::cycles().add(
                1,
                &[KeyValue::new("monitor", name), KeyValue::new("result", "ok")],
            );
            info!(
                monitor = name,
                examined = report.examined,
                violations = report.violations,
                alerts_sent = report.alerts_sent,
                alerts_failed = report.alerts_failed,
                suppressed = report.suppressed,
                skipped = report.skipped,
                duration_ms,
                "cycle completed"
            );
        }
        Err(e) => {
            record_outcome(&span, "error");
            metrics::cycles().add(
                1,
                &[
                    KeyValue::new("monitor", name),
                    KeyValue::new("result", "error"),
                ],
            );
            if e.is_transient() {
                warn!(monitor = name, error = %e, "cycle failed, retrying next interval");
            } else {
                error!(monitor = name, error = %e, "cycle failed");
            }
        }
    });
    result
}
