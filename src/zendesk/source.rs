//! The seam between the enrichment pipeline and the ticket backend.

use async_trait::async_trait;

use crate::zendesk::models::{Group, Ticket, User};

/// A fail-soft source of tickets and identity records.
///
/// Every method degrades to an empty sequence on transport errors, non-2xx
/// responses, or malformed payloads; callers cannot distinguish "no data"
/// from "fetch failed" except through the logs. Fan-out discipline (calling
/// `fetch_user_data` once per batch and `fetch_user_groups` once per distinct
/// assignee) is the caller's responsibility.
#[async_trait]
pub trait TicketSource: Send + Sync {
    /// Tickets created or updated at or after `now - minutes_back` minutes.
    async fn fetch_tickets(&self, minutes_back: u32) -> Vec<Ticket>;

    /// Batch user lookup. An empty `ids` slice must not issue a request.
    async fn fetch_user_data(&self, ids: &[i64]) -> Vec<User>;

    /// Group memberships for a single user.
    async fn fetch_user_groups(&self, user_id: i64) -> Vec<Group>;
}
