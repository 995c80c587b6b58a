//! Notification dispatch.
//!
//! A [`NotifyChannel`] delivers one formatted text to its configured target.
//! The [`Dispatcher`] fans a message out to every channel and reports the
//! outcome as a value. Delivery failures never propagate past it.
//! Channels registered under a route only receive messages dispatched to
//! that route, on top of the shared channels.
//! Delivery is at-least-once: a crash after sending but before the state is
//! saved resends on the next cycle.

pub mod error;
pub mod format;
pub mod telegram;
pub mod whatsapp;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

pub use error::ChannelError;
pub use telegram::TelegramChannel;
pub use whatsapp::WhatsAppChannel;

/// A delivery endpoint bound to one target (chat, group).
#[async_trait]
pub trait NotifyChannel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Deliver `text`. Retries, if any, happen inside.
    async fn send(&self, text: &str) -> Result<(), ChannelError>;
}

/// Per-channel result of one dispatch.
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    pub delivered: Vec<&'static str>,
    pub failed: Vec<(&'static str, String)>,
}

impl DispatchOutcome {
    /// A message counts as delivered once any channel accepted it.
    pub fn delivered_any(&self) -> bool {
        !self.delivered.is_empty()
    }
}

/// Sends every message to all configured channels, one after another.
#[derive(Clone, Default)]
pub struct Dispatcher {
    channels: Vec<Arc<dyn NotifyChannel>>,
    routes: BTreeMap<String, Vec<Arc<dyn NotifyChannel>>>,
}

impl Dispatcher {
    pub fn new(channels: Vec<Arc<dyn NotifyChannel>>) -> Self {
        Self {
            channels,
            routes: BTreeMap::new(),
        }
    }

    /// Register a channel that only receives messages sent to `route`.
    pub fn with_route(
        mut self,
        route: impl Into<String>,
        channel: Arc<dyn NotifyChannel>,
    ) -> Self {
        self.routes.entry(route.into()).or_default().push(channel);
        self
    }

    /// Shared channels plus every routed one.
    pub fn channel_count(&self) -> usize {
        self.channels.len() + self.routes.values().map(Vec::len).sum::<usize>()
    }

    pub async fn dispatch(&self, text: &str) -> DispatchOutcome {
        send_all(&self.channels, text).await
    }

    /// Send to the shared channels and to the channels of `route`.
    pub async fn dispatch_to(&self, text: &str, route: &str) -> DispatchOutcome {
        let routed = self.routes.get(route).map(Vec::as_slice).unwrap_or_default();
        if routed.is_empty() {
            warn!(route, "no channel configured for route");
        }
        let channels: Vec<_> = self.channels.iter().chain(routed).cloned().collect();
        send_all(&channels, text).await
    }
}

async fn send_all(channels: &[Arc<dyn NotifyChannel>], text: &str) -> DispatchOutcome {
    let mut outcome = DispatchOutcome::default();
    for channel in channels {
        let name = channel.name();
        match channel.send(text).await {
            Ok(()) => {
                debug!(channel = name, "message delivered");
                outcome.delivered.push(name);
            }
            Err(e) => {
                warn!(channel = name, error = %e, "message not delivered");
                outcome.failed.push((name, e.to_string()));
            }
        }
    }
    outcome
}
