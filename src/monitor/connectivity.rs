//! Client connectivity monitor.
//!
//! A client is offline when any of its active logins is offline. Offline
//! alerts repeat at most once per cool-down window (12 hours by default).
//! The transition back online is always alerted and clears the cool-down.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{CycleReport, Monitor, minutes};
use crate::config::{ConnectivityConfig, WatchedClient};
use crate::error::Result;
use crate::model::Login;
use crate::notify::{Dispatcher, format};
use crate::source::NetworkSource;
use crate::state::{CooldownCache, StateStore};

const NAME: &str = "connectivity";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectivityState {
    #[serde(default)]
    pub offline_alerts: CooldownCache,
    /// Last observed status per client, `true` meaning online.
    #[serde(default)]
    pub last_online: BTreeMap<String, bool>,
}

pub struct ConnectivityMonitor {
    config: ConnectivityConfig,
    source: Arc<dyn NetworkSource>,
    dispatcher: Dispatcher,
    store: StateStore<ConnectivityState>,
    state: ConnectivityState,
}

impl ConnectivityMonitor {
    pub async fn new(
        config: ConnectivityConfig,
        source: Arc<dyn NetworkSource>,
        dispatcher: Dispatcher,
        store: StateStore<ConnectivityState>,
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

    pub fn state(&self) -> &ConnectivityState {
        &self.state
    }

    /// PON description of a login. Lookup failures degrade to the default.
    async fn pon_for(&self, login: &Login) -> String {
        let fiber = match self.source.fiber_details(&login.id).await {
            Ok(Some(fiber)) => fiber,
            Ok(None) => return format::pon_description(None, ""),
            Err(e) => {
                warn!(login = %login.login, error = %e, "fiber lookup failed");
                return format::pon_description(None, "");
            }
        };
        let transmitter = self
            .source
            .transmitter_name(&fiber.transmitter_id)
            .await
            .unwrap_or_else(|e| {
                warn!(transmitter_id = %fiber.transmitter_id, error = %e, "transmitter lookup failed");
                None
            });
        format::pon_description(transmitter.as_deref(), &fiber.pon_id)
    }

    async fn check_client(
        &mut self,
        client: &WatchedClient,
        now: NaiveDateTime,
        report: &mut CycleReport,
    ) {
        let logins = match self.source.client_logins(&client.id).await {
            Ok(logins) if !logins.is_empty() => logins,
            Ok(_) => {
                warn!(client_id = %client.id, "client has no logins");
                report.skipped += 1;
                return;
            }
            Err(e) => {
                warn!(client_id = %client.id, error = %e, "login lookup failed");
                report.skipped += 1;
                return;
            }
        };
        report.examined += 1;

        let window = chrono::Duration::hours(self.config.cooldown_hours);
        let was_online = self.state.last_online.get(&client.id).copied();

        if let Some(login) = logins.iter().find(|l| l.active && !l.online) {
            self.state.last_online.insert(client.id.clone(), false);
            if self.state.offline_alerts.is_suppressed(&client.id, now, window) {
                report.suppress(NAME);
                return;
            }
            let pon = self.pon_for(login).await;
            let text = format::offline_alert(&client.id, &client.name, login, &pon);
            let outcome = self.dispatcher.dispatch(&text).await;
            if report.dispatched(NAME, &outcome) {
                info!(client_id = %client.id, login = %login.login, "offline alert sent");
                let context = BTreeMap::from([("login".to_string(), login.login.clone())]);
                self.state.offline_alerts.record(&client.id, now, context);
            }
            return;
        }

        self.state.last_online.insert(client.id.clone(), true);
        if was_online != Some(false) {
            return;
        }
        let Some(login) = logins.iter().find(|l| l.active) else {
            return;
        };
        let pon = self.pon_for(login).await;
        let text = format::online_alert(&client.id, &client.name, &pon);
        let outcome = self.dispatcher.dispatch(&text).await;
        if report.dispatched(NAME, &outcome) {
            info!(client_id = %client.id, "back-online alert sent");
            self.state.offline_alerts.clear(&client.id);
        } else {
            // keep the offline status so the transition is alerted next cycle
            self.state.last_online.insert(client.id.clone(), false);
        }
    }
}

#[async_trait]
impl Monitor for ConnectivityMonitor {
    fn name(&self) -> &'static str {
        NAME
    }

    fn interval(&self) -> Duration {
        minutes(self.config.interval_minutes)
    }

    async fn run_cycle(&mut self, now: NaiveDateTime) -> Result<CycleReport> {
        let mut report = CycleReport::default();
        let clients = self.config.clients.clone();
        for client in &clients {
            self.check_client(client, now, &mut report).await;
        }
        if let Err(e) = self.store.save(&self.state).await {
            warn!(
                path = %self.store.path().display(),
                error = %e,
                "failed to persist connectivity state, keeping it in memory"
            );
        }
        Ok(report)
    }
}
