//! Process configuration.
//!
//! Credentials and endpoints come from the environment and are read once;
//! a missing credential is fatal. Tokens stay in `SecretString` so `Debug`
//! output never shows them.
//! Watch lists and rule parameters live in a TOML file, see [`watch`].

pub mod watch;

use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::notify::{telegram, whatsapp};
use secrecy::SecretString;

pub use watch::{
    Attendant, CallGroup, CallsConfig, ComplianceConfig, ConnectivityConfig, UnscheduledConfig,
    WatchConfig, WatchedClient,
};

#[derive(Debug)]
pub struct Config {
    /// Base URL of the IXC webservice, e.g. `https://host/webservice/v1`.
    pub ixc_url: String,
    pub ixc_token: SecretString,
    pub telegram_token: SecretString,
    pub telegram_chat_id: String,
    pub telegram_api_url: String,
    pub whatsapp_url: String,
    /// WhatsApp delivery is enabled only when a group is configured.
    pub whatsapp_group: Option<String>,
    /// Groups receiving call alerts, by the attendant's department.
    pub whatsapp_group_commercial: Option<String>,
    pub whatsapp_group_demands: Option<String>,
    /// PBX host; the call monitor runs only when host and token are set.
    pub escallo_host: Option<String>,
    pub escallo_token: Option<SecretString>,
    pub state_dir: PathBuf,
    pub rules_file: Option<PathBuf>,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Read every variable. Blank values count as unset.
    ///
    /// The binary loads `.env` with `dotenvy` first when present.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            ixc_url: required_var("IXC_HOST_API")?,
            ixc_token: SecretString::from(required_var("IXC_TOKEN_API")?.trim().to_string()),
            telegram_token: SecretString::from(required_var("TELEGRAM_BOT_TOKEN")?),
            telegram_chat_id: required_var("TELEGRAM_CHAT_ID")?,
            telegram_api_url: optional_var("TELEGRAM_API_URL")
                .unwrap_or_else(|| telegram::DEFAULT_API_URL.to_string()),
            whatsapp_url: optional_var("WHATSAPP_SERVICE_URL")
                .unwrap_or_else(|| whatsapp::DEFAULT_SERVICE_URL.to_string()),
            whatsapp_group: optional_var("WHATSAPP_GROUP_ID"),
            whatsapp_group_commercial: optional_var("WHATSAPP_GROUP_ID_COMERCIAL"),
            whatsapp_group_demands: optional_var("WHATSAPP_GROUP_ID_DEMANDAS"),
            escallo_host: optional_var("ESCALLO_HOST"),
            escallo_token: optional_var("ESCALLO_TOKEN")
                .map(|t| SecretString::from(t.trim().to_string())),
            state_dir: optional_var("STATE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("state")),
            rules_file: optional_var("RULES_FILE").map(PathBuf::from),
            otel_endpoint: optional_var("OTEL_ENDPOINT"),
            log_level: optional_var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// WhatsApp group for call alerts of the given department.
    pub fn call_group(&self, group: CallGroup) -> Option<&str> {
        match group {
            CallGroup::Commercial => self.whatsapp_group_commercial.as_deref(),
            CallGroup::Demands => self.whatsapp_group_demands.as_deref(),
        }
    }
}

fn required_var(name: &str) -> Result<String> {
    optional_var(name)
        .ok_or_else(|| Error::Config(format!("required environment variable {name} is not set")))
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
