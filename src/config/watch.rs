//! Watch lists and rule parameters, loaded from a TOML file.
//!
//! Every key has a default, so an empty or missing file yields the stock
//! deployment. Unknown keys are ignored.

use std::collections::BTreeSet;
use std::path::Path;

use serde::Deserialize;

use crate::engine::RuleSet;
use crate::error::{Error, Result};
use crate::model::OperatorId;
use crate::normalize::EventCodes;

const DEFAULT_SUBJECTS: [u32; 19] = [
    544, 167, 546, 166, 543, 169, 545, 196, 170, 547, 172, 258, 259, 192, 168, 252, 171, 393, 176,
];

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub compliance: ComplianceConfig,
    pub unscheduled: UnscheduledConfig,
    pub connectivity: ConnectivityConfig,
    pub calls: CallsConfig,
}

impl WatchConfig {
    /// Load from `path`, or the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read rules file {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

/// Restricted-operator compliance monitor.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ComplianceConfig {
    pub enabled: bool,
    pub interval_minutes: u64,
    pub restricted_operators: Vec<u32>,
    pub escalation_operators: Vec<u32>,
    /// Subjects to check. Empty means every subject.
    pub target_subjects: Vec<u32>,
    pub watched_statuses: Vec<String>,
    pub in_progress_status: String,
    pub reschedule_statuses: Vec<String>,
    pub events: EventCodes,
}

impl Default for ComplianceConfig {
    fn default() -> Self {
        let mut target_subjects = DEFAULT_SUBJECTS.to_vec();
        target_subjects.push(380);
        Self {
            enabled: true,
            interval_minutes: 15,
            restricted_operators: vec![283],
            escalation_operators: Vec::new(),
            target_subjects,
            watched_statuses: vec!["AG".to_string(), "EN".to_string()],
            in_progress_status: "EN".to_string(),
            reschedule_statuses: vec!["RAG".to_string()],
            events: EventCodes::default(),
        }
    }
}

impl ComplianceConfig {
    pub fn rule_set(&self) -> RuleSet {
        RuleSet {
            restricted_operators: self.restricted_operators.iter().copied().map(OperatorId).collect(),
            escalation_operators: self.escalation_operators.iter().copied().map(OperatorId).collect(),
            in_progress_status: self.in_progress_status.clone(),
            reschedule_statuses: self.reschedule_statuses.iter().cloned().collect::<BTreeSet<_>>(),
        }
    }

    pub fn targets_subject(&self, subject_id: u32) -> bool {
        self.target_subjects.is_empty() || self.target_subjects.contains(&subject_id)
    }
}

/// Open orders left without a schedule.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UnscheduledConfig {
    pub enabled: bool,
    pub interval_minutes: u64,
    pub open_status: String,
    pub target_subjects: Vec<u32>,
    pub responsible_ids: Vec<u32>,
    pub min_open_minutes: i64,
    pub cooldown_minutes: i64,
}

impl Default for UnscheduledConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_minutes: 30,
            open_status: "A".to_string(),
            target_subjects: DEFAULT_SUBJECTS.to_vec(),
            responsible_ids: vec![
                345, 359, 337, 367, 307, 386, 389, 390, 423, 422, 421, 416, 415, 414, 404, 424,
                425, 306, 379, 343, 304, 143, 268, 246, 348, 349,
            ],
            min_open_minutes: 30,
            cooldown_minutes: 30,
        }
    }
}

/// A client whose links are watched.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WatchedClient {
    pub id: String,
    pub name: String,
}

/// Client connectivity monitor.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConnectivityConfig {
    pub enabled: bool,
    pub interval_minutes: u64,
    pub cooldown_hours: i64,
    pub clients: Vec<WatchedClient>,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_minutes: 10,
            cooldown_hours: 12,
            clients: Vec::new(),
        }
    }
}

/// WhatsApp group a call alert is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallGroup {
    Commercial,
    Demands,
}

impl CallGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallGroup::Commercial => "commercial",
            CallGroup::Demands => "demands",
        }
    }
}

/// An attendant's PBX extension and who it maps to in the ticket system.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Attendant {
    pub extension: String,
    pub responsible_id: String,
    pub name: String,
    pub group: CallGroup,
}

/// Answered calls that never got a support ticket.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CallsConfig {
    pub enabled: bool,
    pub interval_minutes: u64,
    pub answered_status: String,
    /// Queues whose calls are never checked.
    pub ignored_queues: Vec<String>,
    /// Subjects of the tickets the PBX files by itself; their text carries
    /// the caller's number.
    pub automatic_subjects: Vec<u32>,
    /// Client fields searched for the caller's number, in order.
    pub phone_fields: Vec<String>,
    pub attendants: Vec<Attendant>,
}

const DEFAULT_ATTENDANTS: [(&str, &str, &str, CallGroup); 19] = [
    ("4002", "359", "Pedro Henrique", CallGroup::Demands),
    ("4004", "345", "João Miyake", CallGroup::Demands),
    ("4006", "307", "Gabriel Rosa", CallGroup::Demands),
    ("4008", "386", "Gabriel Brambila", CallGroup::Demands),
    ("4009", "389", "Marcos Moraes", CallGroup::Demands),
    ("4021", "367", "Rodrigo Akira", CallGroup::Demands),
    ("4025", "337", "Alison da Silva", CallGroup::Demands),
    ("4027", "390", "Pedro Chaves", CallGroup::Demands),
    ("4028", "414", "Ryan da Silva", CallGroup::Demands),
    ("4029", "415", "Samuel Mendes", CallGroup::Demands),
    ("4030", "422", "Pedro Boni", CallGroup::Demands),
    ("4031", "423", "Rafael Guedes", CallGroup::Demands),
    ("4032", "421", "Ricardo Correa", CallGroup::Demands),
    ("4033", "416", "João Silva", CallGroup::Demands),
    ("1204", "268", "Tamires Cavalcante", CallGroup::Commercial),
    ("1210", "379", "Rodrigo Boani", CallGroup::Commercial),
    ("1208", "343", "Rennan Taioqui", CallGroup::Commercial),
    ("1205", "266", "Miguel Roveda", CallGroup::Commercial),
    ("1201", "304", "Gustavo Leonidas", CallGroup::Commercial),
];

impl Default for CallsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_minutes: 40,
            answered_status: "Atendida".to_string(),
            ignored_queues: vec![
                "Suporte - Técnicos".to_string(),
                "Comercial - Técnicos".to_string(),
            ],
            automatic_subjects: vec![
                324, 533, 679, 323, 322, 321, 329, 326, 435, 532, 325, 436, 327, 534, 328, 346,
                347, 348, 531,
            ],
            phone_fields: ["whatsapp", "telefone_celular", "fone", "telefone_comercial"]
                .map(String::from)
                .to_vec(),
            attendants: DEFAULT_ATTENDANTS
                .iter()
                .map(|(extension, responsible_id, name, group)| Attendant {
                    extension: extension.to_string(),
                    responsible_id: responsible_id.to_string(),
                    name: name.to_string(),
                    group: *group,
                })
                .collect(),
        }
    }
}

impl CallsConfig {
    pub fn attendant(&self, extension: &str) -> Option<&Attendant> {
        self.attendants.iter().find(|a| a.extension == extension)
    }
}
