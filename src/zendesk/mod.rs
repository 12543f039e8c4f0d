//! Zendesk API access: wire models, the source trait, and the reqwest client.

pub mod client;
pub mod models;
pub mod source;

pub use client::ZendeskClient;
pub use source::TicketSource;
