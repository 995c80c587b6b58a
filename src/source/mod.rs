//! Ticket, network and call data sources.
//!
//! The monitors only talk to the outside world through these traits, so
//! tests can drive them with in-process fakes. [`ixc::IxcClient`] is the
//! production implementation over the paginated REST API;
//! [`escallo::EscalloClient`] reads the PBX call log.

pub mod escallo;
pub mod ixc;
pub mod lookup;
pub mod wire;

use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::error::Result;
use crate::model::{Call, Client, FiberDetails, Login, SupportTicket, Ticket, TicketId};

pub use escallo::EscalloClient;
pub use ixc::IxcClient;
pub use lookup::LookupCache;
pub use wire::RawMessage;

/// Service orders, their message history and the lookups around them.
#[async_trait]
pub trait TicketSource: Send + Sync {
    /// Orders whose last update is at or after `since`.
    async fn tickets_updated_since(&self, since: NaiveDateTime) -> Result<Vec<Ticket>>;

    /// Orders currently in the given status.
    async fn tickets_with_status(&self, status: &str) -> Result<Vec<Ticket>>;

    /// Point lookup of one order.
    async fn ticket(&self, id: &TicketId) -> Result<Option<Ticket>>;

    /// Full message history of one order, in source order.
    async fn ticket_messages(&self, id: &TicketId) -> Result<Vec<RawMessage>>;

    async fn subject_name(&self, subject_id: u32) -> Result<Option<String>>;

    /// Responsible party recorded on a support ticket.
    async fn support_ticket_responsible(&self, support_ticket: &str) -> Result<Option<String>>;

    async fn employee_name(&self, employee_id: &str) -> Result<Option<String>>;
}

/// Access logins and their fiber attachment points.
#[async_trait]
pub trait NetworkSource: Send + Sync {
    async fn client_logins(&self, client_id: &str) -> Result<Vec<Login>>;

    async fn fiber_details(&self, login_id: &str) -> Result<Option<FiberDetails>>;

    async fn transmitter_name(&self, transmitter_id: &str) -> Result<Option<String>>;
}

/// Clients and the support tickets filed for them.
#[async_trait]
pub trait ClientSource: Send + Sync {
    /// Most recent support tickets filed under a subject.
    async fn support_tickets_with_subject(&self, subject_id: u32) -> Result<Vec<SupportTicket>>;

    /// Most recent support tickets of one client.
    async fn support_tickets_of_client(&self, client_id: &str) -> Result<Vec<SupportTicket>>;

    async fn client(&self, client_id: &str) -> Result<Option<Client>>;

    /// Clients whose `field` holds exactly `phone`, active or not.
    async fn clients_by_phone(&self, field: &str, phone: &str) -> Result<Vec<Client>>;
}

/// PBX call log.
#[async_trait]
pub trait CallSource: Send + Sync {
    /// Calls from `since` to the end of that day.
    async fn calls_since(&self, since: NaiveDateTime) -> Result<Vec<Call>>;
}
