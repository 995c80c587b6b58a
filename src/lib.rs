//! # ticketwatch
//!
//! Polling monitor for service orders and client connectivity in an IXC
//! deployment.
//!
//! Replays each order's message history through a fixed compliance rule
//! set, flags unscheduled orders and offline clients, checks that answered
//! phone calls got a support ticket, and pushes alerts to Telegram and
//! WhatsApp with cool-downs and a persisted cursor.

pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod monitor;
pub mod normalize;
pub mod notify;
pub mod source;
pub mod state;
pub mod telemetry;
