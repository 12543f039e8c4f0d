//! # Ticketboard Library
//!
//! Core functionality for the Ticketboard service: the Zendesk acquisition
//! client, the enrichment pipeline, the TTL dataset cache, and the HTTP
//! surface handing the enriched table to the display layer.

pub mod cache;
pub mod config;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod pipeline;
pub mod refresher;
pub mod server;
pub mod zendesk;
