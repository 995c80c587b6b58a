//! Client for the Escallo PBX report API.
//!
//! The call log is report `rel001`: a `POST` with a date and time window,
//! authenticated with a partner token. Records come back flattened, with
//! dotted keys naming the table each column belongs to.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use reqwest::header::AUTHORIZATION;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::CallSource;
use super::wire::lenient;
use crate::error::{Error, Result};
use crate::model::{Call, parse_timestamp};

const REPORT_PATH: &str = "escallo/api/v1/recurso/relatorio/rel001/";
const REPORT_NAME: &str = "rel001";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CALL_PAGE_SIZE: usize = 2000;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReportWindow {
    data_inicial: String,
    data_final: String,
    horario_inicial: String,
    horario_final: &'static str,
}

#[derive(Debug, Deserialize)]
struct ReportResponse {
    #[serde(default)]
    code: Option<u16>,
    #[serde(default)]
    data: Option<ReportData>,
}

#[derive(Debug, Deserialize)]
struct ReportData {
    #[serde(default)]
    registros: Vec<RawCall>,
}

#[derive(Debug, Default, Deserialize)]
struct RawCall {
    #[serde(rename = "filaAtendimentoLigacao.id", default, deserialize_with = "lenient")]
    id: Option<String>,
    #[serde(
        rename = "filaAtendimentoLigacao.statusFormatado",
        default,
        deserialize_with = "lenient"
    )]
    status: Option<String>,
    #[serde(rename = "filaAtendimentoLigacao.destino", default, deserialize_with = "lenient")]
    destination: Option<String>,
    #[serde(rename = "filaAtendimentoLigacao.origem", default, deserialize_with = "lenient")]
    origin: Option<String>,
    #[serde(
        rename = "filaAtendimentoLigacao.dataHoraFinal",
        default,
        deserialize_with = "lenient"
    )]
    ended_at: Option<String>,
    #[serde(rename = "telefoniaFilaAtendimento.nome", default, deserialize_with = "lenient")]
    queue: Option<String>,
}

impl From<RawCall> for Call {
    fn from(raw: RawCall) -> Self {
        Call {
            id: raw.id.unwrap_or_default(),
            status: raw.status.unwrap_or_default(),
            destination: raw.destination.unwrap_or_default(),
            origin: raw.origin.unwrap_or_default(),
            ended_at: raw.ended_at.as_deref().and_then(parse_timestamp),
            queue: raw.queue.unwrap_or_default(),
        }
    }
}

/// Escallo report client.
pub struct EscalloClient {
    base_url: String,
    token: SecretString,
    client: reqwest::Client,
}

impl EscalloClient {
    /// `host` may be a bare `host[:port]`, in which case plain HTTP is used.
    pub fn new(host: impl Into<String>, token: SecretString) -> Result<Self> {
        let host = host.into();
        let host = host.trim().trim_end_matches('/');
        let base_url = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("http://{host}")
        };
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            base_url,
            token,
            client,
        })
    }

    async fn report_page(&self, window: &ReportWindow, page: usize) -> Result<Vec<Call>> {
        let response = self
            .client
            .post(format!("{}/{REPORT_PATH}", self.base_url))
            .query(&[
                ("registros", CALL_PAGE_SIZE.to_string()),
                ("pagina", page.to_string()),
            ])
            .header(
                AUTHORIZATION,
                format!("Partner {}", self.token.expose_secret().trim()),
            )
            .json(window)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Api {
                endpoint: REPORT_NAME.to_string(),
                status: status.as_u16(),
            });
        }
        let bytes = response.bytes().await?;
        let report: ReportResponse = serde_json::from_slice(&bytes)?;
        match report.code {
            Some(200) => {}
            code => {
                return Err(Error::Api {
                    endpoint: REPORT_NAME.to_string(),
                    status: code.unwrap_or_default(),
                });
            }
        }
        let records = report.data.map(|d| d.registros).unwrap_or_default();
        Ok(records.into_iter().map(Call::from).collect())
    }
}

#[async_trait]
impl CallSource for EscalloClient {
    async fn calls_since(&self, since: NaiveDateTime) -> Result<Vec<Call>> {
        let day = since.format("%Y-%m-%d").to_string();
        let window = ReportWindow {
            data_inicial: day.clone(),
            data_final: day,
            horario_inicial: since.format("%H:%M:%S").to_string(),
            horario_final: "23:59:59",
        };

        let mut calls = Vec::new();
        let mut page = 0;
        loop {
            let batch = self.report_page(&window, page).await?;
            let received = batch.len();
            calls.extend(batch);
            debug!(page, received, "call log page fetched");
            if received < CALL_PAGE_SIZE {
                break;
            }
            page += 1;
        }
        Ok(calls)
    }
}
