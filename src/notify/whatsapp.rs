//! Local WhatsApp gateway micro-service.
//!
//! The gateway exposes `GET /health` (readiness) and `POST /send` taking
//! `{"groupId", "message"}` and answering `{"success": bool, "error"?}`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{ChannelError, NotifyChannel};

pub const DEFAULT_SERVICE_URL: &str = "http://localhost:7575";
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);
const SEND_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Deserialize)]
struct Health {
    #[serde(default, alias = "whatsapp_ready")]
    ready: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendRequest<'a> {
    group_id: &'a str,
    message: &'a str,
}

#[derive(Deserialize)]
struct SendResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    error: Option<String>,
}

pub struct WhatsAppChannel {
    service_url: String,
    group_id: String,
    client: reqwest::Client,
}

impl WhatsAppChannel {
    pub fn new(service_url: impl Into<String>, group_id: impl Into<String>) -> Self {
        Self {
            service_url: service_url.into().trim_end_matches('/').to_string(),
            group_id: group_id.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Whether the gateway is up and its WhatsApp session is ready.
    pub async fn is_ready(&self) -> Result<(), ChannelError> {
        let response = self
            .client
            .get(format!("{}/health", self.service_url))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ChannelError::NotReady(format!(
                "health check returned HTTP {}",
                response.status()
            )));
        }
        let health: Health = response.json().await?;
        if !health.ready {
            return Err(ChannelError::NotReady("session not ready".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl NotifyChannel for WhatsAppChannel {
    fn name(&self) -> &'static str {
        "whatsapp"
    }

    async fn send(&self, text: &str) -> Result<(), ChannelError> {
        self.is_ready().await?;

        let response = self
            .client
            .post(format!("{}/send", self.service_url))
            .timeout(SEND_TIMEOUT)
            .json(&SendRequest {
                group_id: &self.group_id,
                message: text,
            })
            .send()
            .await?;
        let status = response.status();
        let body: Option<SendResponse> = response.json().await.ok();

        match body {
            Some(SendResponse { success: true, .. }) if status.is_success() => Ok(()),
            Some(SendResponse { error, .. }) => Err(ChannelError::Rejected(
                error.unwrap_or_else(|| format!("HTTP {status}")),
            )),
            None => Err(ChannelError::Rejected(format!("HTTP {status}"))),
        }
    }
}
