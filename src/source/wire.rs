//! Wire records returned by the ticket source.
//!
//! The source encodes most numbers as strings and omits or nulls fields
//! freely, so every field is read leniently as an optional string and
//! interpreted later.

use serde::{Deserialize, Deserializer};

use crate::model::{
    Client, FiberDetails, Login, SupportTicket, TechnicianId, Ticket, TicketId, parse_timestamp,
};

/// Accept a string, number, bool or null and hand back an optional string.
pub(crate) fn lenient<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde_json::Value;

    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        Some(other) => Some(other.to_string()),
    })
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn parse_id(field: &Option<String>) -> Option<u32> {
    non_empty(field).and_then(|s| s.parse().ok()).filter(|id| *id != 0)
}

/// One page of a paginated query.
#[derive(Debug, Deserialize)]
pub struct Page<T> {
    #[serde(default, deserialize_with = "lenient")]
    total: Option<String>,
    #[serde(default = "Vec::new")]
    pub registros: Vec<T>,
}

impl<T> Page<T> {
    /// Total record count reported by the source (0 when missing or garbled).
    pub fn total(&self) -> u64 {
        non_empty(&self.total)
            .and_then(|s| s.parse().ok())
            .unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Service orders
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTicket {
    #[serde(default, deserialize_with = "lenient")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub id_cliente: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub id_assunto: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub data_abertura: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub id_tecnico: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub id_ticket: Option<String>,
}

impl RawTicket {
    /// Convert into a [`Ticket`]. `None` if the id, subject or opening
    /// timestamp is missing or unparseable.
    pub fn into_ticket(self) -> Option<Ticket> {
        let id = non_empty(&self.id)?.to_string();
        let subject_id = non_empty(&self.id_assunto)?.parse().ok()?;
        let opened_at = parse_timestamp(non_empty(&self.data_abertura)?)?;
        Some(Ticket {
            id: TicketId(id),
            client_id: non_empty(&self.id_cliente).unwrap_or_default().to_string(),
            subject_id,
            opened_at,
            status: non_empty(&self.status).unwrap_or_default().to_string(),
            technician: parse_id(&self.id_tecnico).map(TechnicianId),
            support_ticket: non_empty(&self.id_ticket)
                .filter(|s| *s != "0")
                .map(str::to_string),
        })
    }
}

/// One message/action recorded against a service order, as fetched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawMessage {
    #[serde(default, deserialize_with = "lenient")]
    pub data: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub id_operador: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub id_evento: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub id_tecnico: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub data_final: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub historico: Option<String>,
}

impl RawMessage {
    pub(crate) fn operator(&self) -> Option<u32> {
        non_empty(&self.id_operador).and_then(|s| s.parse().ok())
    }

    pub(crate) fn event_code(&self) -> u32 {
        non_empty(&self.id_evento)
            .and_then(|s| s.parse().ok())
            .unwrap_or(0)
    }

    pub(crate) fn status(&self) -> Option<&str> {
        non_empty(&self.status)
    }

    pub(crate) fn technician(&self) -> Option<TechnicianId> {
        parse_id(&self.id_tecnico).map(TechnicianId)
    }

    pub(crate) fn scheduled_raw(&self) -> Option<&str> {
        non_empty(&self.data_final)
    }
}

// ---------------------------------------------------------------------------
// Lookups
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(crate) struct RawSubject {
    #[serde(default, deserialize_with = "lenient")]
    pub assunto: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawSupportTicket {
    #[serde(default, deserialize_with = "lenient")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub id_cliente: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub data_criacao: Option<String>,
    /// Spelled this way by the source.
    #[serde(default, deserialize_with = "lenient")]
    pub menssagem: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub id_responsavel_tecnico: Option<String>,
}

impl From<RawSupportTicket> for SupportTicket {
    fn from(raw: RawSupportTicket) -> Self {
        SupportTicket {
            id: raw.id.unwrap_or_default(),
            created_at: non_empty(&raw.data_criacao).and_then(parse_timestamp),
            client_id: text(raw.id_cliente),
            message: raw.menssagem.unwrap_or_default(),
            responsible_id: text(raw.id_responsavel_tecnico),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawClient {
    #[serde(default, deserialize_with = "lenient")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub razao: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub fantasia: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub ativo: Option<String>,
}

impl RawClient {
    /// `None` when the record has no id.
    pub fn into_client(self) -> Option<Client> {
        let id = text(self.id)?;
        let name = text(self.razao)
            .or_else(|| text(self.fantasia))
            .unwrap_or_else(|| "name not available".to_string());
        Some(Client {
            id,
            name,
            active: non_empty(&self.ativo) == Some("S"),
        })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawEmployee {
    #[serde(default, deserialize_with = "lenient")]
    pub funcionario: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawTransmitter {
    #[serde(default, deserialize_with = "lenient")]
    pub descricao: Option<String>,
}

pub(crate) fn text(field: Option<String>) -> Option<String> {
    field
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && s != "0")
}

// ---------------------------------------------------------------------------
// Connectivity
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(crate) struct RawLogin {
    #[serde(default, deserialize_with = "lenient")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub login: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub ativo: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub online: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub motivo_desconexao: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub ultima_conexao_inicial: Option<String>,
}

impl From<RawLogin> for Login {
    fn from(raw: RawLogin) -> Self {
        let flag = |f: &Option<String>| non_empty(f) == Some("S");
        Login {
            active: flag(&raw.ativo),
            online: flag(&raw.online),
            id: raw.id.unwrap_or_default(),
            login: raw.login.unwrap_or_default(),
            disconnect_reason: raw.motivo_desconexao.unwrap_or_default().trim().to_string(),
            last_connected: raw.ultima_conexao_inicial.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawFiber {
    #[serde(default, deserialize_with = "lenient")]
    pub id_transmissor: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub ponid: Option<String>,
}

impl From<RawFiber> for FiberDetails {
    fn from(raw: RawFiber) -> Self {
        FiberDetails {
            transmitter_id: raw.id_transmissor.unwrap_or_default().trim().to_string(),
            pon_id: raw.ponid.unwrap_or_default().trim().to_string(),
        }
    }
}
