//! REST client for the IXC webservice.
//!
//! Every read is a `POST {base}/{endpoint}` carrying a single-field filter
//! plus page number and page size. Callers that need everything loop until
//! the reported total is exhausted; callers that only care about recent
//! records ask for one page sorted by id, newest first.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use reqwest::header::AUTHORIZATION;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::wire::{
    Page, RawClient, RawEmployee, RawFiber, RawLogin, RawSubject, RawSupportTicket, RawTicket,
    RawTransmitter, text,
};
use super::{ClientSource, NetworkSource, RawMessage, TicketSource};
use crate::error::{Error, Result};
use crate::model::{
    Client, FiberDetails, Login, SupportTicket, TIMESTAMP_FORMAT, Ticket, TicketId,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const TICKET_PAGE_SIZE: u32 = 5000;
const MESSAGE_PAGE_SIZE: u32 = 1000;
const LOGIN_PAGE_SIZE: u32 = 100;
const SUPPORT_TICKET_WINDOW: u32 = 100;
const PHONE_MATCH_LIMIT: u32 = 50;

/// Single-field query filter.
#[derive(Debug, Clone)]
pub struct Filter {
    pub field: String,
    pub oper: &'static str,
    pub value: String,
}

impl Filter {
    pub fn eq(field: &str, value: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            oper: "=",
            value: value.into(),
        }
    }

    pub fn at_least(field: &str, value: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            oper: ">=",
            value: value.into(),
        }
    }
}

#[derive(Serialize)]
struct QueryBody<'a> {
    qtype: &'a str,
    query: &'a str,
    oper: &'a str,
    page: String,
    rp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sortname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sortorder: Option<&'static str>,
}

/// IXC webservice client.
pub struct IxcClient {
    base_url: String,
    token: SecretString,
    client: reqwest::Client,
}

impl IxcClient {
    pub fn new(base_url: impl Into<String>, token: SecretString) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            client,
        })
    }

    /// Fetch one page.
    pub async fn query_page<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        filter: &Filter,
        page: u32,
        page_size: u32,
    ) -> Result<Page<T>> {
        let body = QueryBody {
            qtype: &filter.field,
            query: &filter.value,
            oper: filter.oper,
            page: page.to_string(),
            rp: page_size.to_string(),
            sortname: None,
            sortorder: None,
        };
        self.post_query(endpoint, &body).await
    }

    /// Fetch the `count` most recent records matching the filter.
    pub async fn query_latest<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        filter: &Filter,
        count: u32,
    ) -> Result<Vec<T>> {
        let body = QueryBody {
            qtype: &filter.field,
            query: &filter.value,
            oper: filter.oper,
            page: "1".to_string(),
            rp: count.to_string(),
            sortname: Some(format!("{endpoint}.id")),
            sortorder: Some("desc"),
        };
        let page: Page<T> = self.post_query(endpoint, &body).await?;
        Ok(page.registros)
    }

    async fn post_query<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &QueryBody<'_>,
    ) -> Result<Page<T>> {
        let response = self
            .client
            .post(format!("{}/{endpoint}", self.base_url))
            .header(
                AUTHORIZATION,
                format!("Basic {}", self.token.expose_secret()),
            )
            .header("ixcsoft", "listar")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Api {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Fetch every page until the reported total is exhausted.
    pub async fn query_all<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        filter: &Filter,
        page_size: u32,
    ) -> Result<Vec<T>> {
        let mut records = Vec::new();
        let mut page = 1;
        loop {
            let result: Page<T> = self.query_page(endpoint, filter, page, page_size).await?;
            let total = result.total();
            let received = result.registros.len();
            records.extend(result.registros);
            debug!(endpoint, page, received, total, "page fetched");

            if received < page_size as usize || u64::from(page) * u64::from(page_size) >= total {
                break;
            }
            page += 1;
        }
        Ok(records)
    }

    /// Fetch the first record matching the filter.
    pub async fn query_first<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        filter: &Filter,
    ) -> Result<Option<T>> {
        let page: Page<T> = self.query_page(endpoint, filter, 1, 1).await?;
        Ok(page.registros.into_iter().next())
    }

    /// Cheap authenticated request used at startup to fail fast on bad
    /// credentials.
    pub async fn check_auth(&self) -> Result<u64> {
        let page: Page<serde_json::Value> = self
            .query_page("cliente", &Filter::eq("id", "1"), 1, 1)
            .await?;
        Ok(page.total())
    }

    async fn tickets(&self, filter: Filter) -> Result<Vec<Ticket>> {
        let raw: Vec<RawTicket> = self
            .query_all("su_oss_chamado", &filter, TICKET_PAGE_SIZE)
            .await?;
        Ok(convert_tickets(raw))
    }
}

fn convert_tickets(raw: Vec<RawTicket>) -> Vec<Ticket> {
    raw.into_iter()
        .filter_map(|r| {
            let id = r.id.clone();
            let ticket = r.into_ticket();
            if ticket.is_none() {
                warn!(ticket_id = ?id, "dropping malformed service order record");
                crate::telemetry::metrics::records_dropped()
                    .add(1, &[opentelemetry::KeyValue::new("reason", "ticket")]);
            }
            ticket
        })
        .collect()
}

#[async_trait]
impl TicketSource for IxcClient {
    async fn tickets_updated_since(&self, since: NaiveDateTime) -> Result<Vec<Ticket>> {
        self.tickets(Filter::at_least(
            "ultima_atualizacao",
            since.format(TIMESTAMP_FORMAT).to_string(),
        ))
        .await
    }

    async fn tickets_with_status(&self, status: &str) -> Result<Vec<Ticket>> {
        self.tickets(Filter::eq("status", status)).await
    }

    async fn ticket(&self, id: &TicketId) -> Result<Option<Ticket>> {
        let raw: Option<RawTicket> = self
            .query_first("su_oss_chamado", &Filter::eq("id", id.0.clone()))
            .await?;
        Ok(raw.and_then(RawTicket::into_ticket))
    }

    async fn ticket_messages(&self, id: &TicketId) -> Result<Vec<RawMessage>> {
        self.query_all(
            "su_oss_chamado_mensagem",
            &Filter::eq("id_chamado", id.0.clone()),
            MESSAGE_PAGE_SIZE,
        )
        .await
    }

    async fn subject_name(&self, subject_id: u32) -> Result<Option<String>> {
        let raw: Option<RawSubject> = self
            .query_first("su_oss_assunto", &Filter::eq("id", subject_id.to_string()))
            .await?;
        Ok(raw.and_then(|r| text(r.assunto)))
    }

    async fn support_ticket_responsible(&self, support_ticket: &str) -> Result<Option<String>> {
        let raw: Option<RawSupportTicket> = self
            .query_first("su_ticket", &Filter::eq("id", support_ticket))
            .await?;
        Ok(raw.and_then(|r| text(r.id_responsavel_tecnico)))
    }

    async fn employee_name(&self, employee_id: &str) -> Result<Option<String>> {
        let raw: Option<RawEmployee> = self
            .query_first("funcionarios", &Filter::eq("id", employee_id))
            .await?;
        Ok(raw.and_then(|r| text(r.funcionario)))
    }
}

#[async_trait]
impl NetworkSource for IxcClient {
    async fn client_logins(&self, client_id: &str) -> Result<Vec<Login>> {
        let raw: Vec<RawLogin> = self
            .query_all(
                "radusuarios",
                &Filter::eq("id_cliente", client_id),
                LOGIN_PAGE_SIZE,
            )
            .await?;
        Ok(raw.into_iter().map(Login::from).collect())
    }

    async fn fiber_details(&self, login_id: &str) -> Result<Option<FiberDetails>> {
        let raw: Option<RawFiber> = self
            .query_first("radpop_radio_cliente_fibra", &Filter::eq("id_login", login_id))
            .await?;
        Ok(raw.map(FiberDetails::from))
    }

    async fn transmitter_name(&self, transmitter_id: &str) -> Result<Option<String>> {
        if transmitter_id.is_empty() || transmitter_id == "0" {
            return Ok(None);
        }
        let raw: Option<RawTransmitter> = self
            .query_first("radpop_radio", &Filter::eq("id", transmitter_id))
            .await?;
        Ok(raw.and_then(|r| text(r.descricao)))
    }
}

#[async_trait]
impl ClientSource for IxcClient {
    async fn support_tickets_with_subject(&self, subject_id: u32) -> Result<Vec<SupportTicket>> {
        let raw: Vec<RawSupportTicket> = self
            .query_latest(
                "su_ticket",
                &Filter::eq("id_assunto", subject_id.to_string()),
                SUPPORT_TICKET_WINDOW,
            )
            .await?;
        Ok(raw.into_iter().map(SupportTicket::from).collect())
    }

    async fn support_tickets_of_client(&self, client_id: &str) -> Result<Vec<SupportTicket>> {
        let raw: Vec<RawSupportTicket> = self
            .query_latest(
                "su_ticket",
                &Filter::eq("id_cliente", client_id),
                SUPPORT_TICKET_WINDOW,
            )
            .await?;
        Ok(raw.into_iter().map(SupportTicket::from).collect())
    }

    async fn client(&self, client_id: &str) -> Result<Option<Client>> {
        let raw: Option<RawClient> = self
            .query_first("cliente", &Filter::eq("id", client_id))
            .await?;
        Ok(raw.and_then(RawClient::into_client))
    }

    async fn clients_by_phone(&self, field: &str, phone: &str) -> Result<Vec<Client>> {
        let page: Page<RawClient> = self
            .query_page("cliente", &Filter::eq(field, phone), 1, PHONE_MATCH_LIMIT)
            .await?;
        Ok(page
            .registros
            .into_iter()
            .filter_map(RawClient::into_client)
            .collect())
    }
}
