//! Reqwest-backed Zendesk client.
//!
//! All fetches fail soft: errors are logged and converted into empty
//! sequences so the pipeline always receives "a list, possibly empty".

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::config::ZendeskConfig;
use crate::zendesk::models::{
    Group, GroupsEnvelope, Ticket, TicketsEnvelope, User, UsersEnvelope,
};
use crate::zendesk::source::TicketSource;

/// Errors swallowed at the client boundary. Never propagated past the
/// fail-soft wrappers; surfaced only through logs and metrics.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status} from {url}")]
    Status { status: StatusCode, url: String },
    #[error("invalid request url: {0}")]
    Url(#[from] url::ParseError),
}

/// Zendesk REST client with basic-auth credentials and a shared timeout.
pub struct ZendeskClient {
    http: reqwest::Client,
    api_base: String,
    email: String,
    api_token: String,
}

impl ZendeskClient {
    /// Build a client from configuration.
    pub fn new(config: &ZendeskConfig) -> Result<Self, reqwest::Error> {
        Self::with_api_base(
            config.api_base(),
            config.email.clone().unwrap_or_default(),
            config.api_token.clone().unwrap_or_default(),
            Duration::from_secs(config.timeout_seconds),
        )
    }

    /// Build a client against an explicit API base (used by tests).
    pub fn with_api_base(
        api_base: String,
        email: String,
        api_token: String,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            email,
            api_token,
        })
    }

    /// The incremental window start: exactly `minutes_back` minutes before
    /// `now`, nothing more. The endpoint contract is "every ticket created
    /// or updated at or after this instant".
    fn window_start(minutes_back: u32) -> DateTime<Utc> {
        Utc::now() - chrono::Duration::minutes(i64::from(minutes_back))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ClientError> {
        let response = self
            .http
            .get(url.clone())
            .basic_auth(format!("{}/token", self.email), Some(&self.api_token))
            .header("Accept", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ClientError::Status {
                status: response.status(),
                url: url.to_string(),
            });
        }

        Ok(response.json::<T>().await?)
    }

    async fn try_fetch_tickets(&self, minutes_back: u32) -> Result<Vec<Ticket>, ClientError> {
        let start_time = Self::window_start(minutes_back);
        let url = Url::parse_with_params(
            &format!("{}/incremental/tickets.json", self.api_base),
            &[("start_time", start_time.timestamp().to_string())],
        )?;

        debug!(
            minutes_back,
            start_time = %start_time,
            "Fetching incremental tickets"
        );

        let envelope: TicketsEnvelope = self.get_json(url).await?;
        Ok(envelope.tickets)
    }

    async fn try_fetch_user_data(&self, ids: &[i64]) -> Result<Vec<User>, ClientError> {
        let joined = ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let url = Url::parse_with_params(
            &format!("{}/users/show_many.json", self.api_base),
            &[("ids", joined)],
        )?;

        let envelope: UsersEnvelope = self.get_json(url).await?;
        Ok(envelope.users)
    }

    async fn try_fetch_user_groups(&self, user_id: i64) -> Result<Vec<Group>, ClientError> {
        let url = Url::parse(&format!("{}/users/{}/groups.json", self.api_base, user_id))?;

        let envelope: GroupsEnvelope = self.get_json(url).await?;
        Ok(envelope.groups)
    }
}

#[async_trait]
impl TicketSource for ZendeskClient {
    async fn fetch_tickets(&self, minutes_back: u32) -> Vec<Ticket> {
        match self.try_fetch_tickets(minutes_back).await {
            Ok(tickets) => tickets,
            Err(err) => {
                error!(error = %err, minutes_back, "Ticket fetch failed, degrading to empty set");
                counter!("zendesk_fetch_errors_total").increment(1);
                Vec::new()
            }
        }
    }

    async fn fetch_user_data(&self, ids: &[i64]) -> Vec<User> {
        // Empty input means no request at all.
        if ids.is_empty() {
            return Vec::new();
        }

        match self.try_fetch_user_data(ids).await {
            Ok(users) => users,
            Err(err) => {
                error!(error = %err, user_count = ids.len(), "User fetch failed, degrading to empty set");
                counter!("zendesk_fetch_errors_total").increment(1);
                Vec::new()
            }
        }
    }

    async fn fetch_user_groups(&self, user_id: i64) -> Vec<Group> {
        match self.try_fetch_user_groups(user_id).await {
            Ok(groups) => groups,
            Err(err) => {
                error!(error = %err, user_id, "Group fetch failed, degrading to empty set");
                counter!("zendesk_fetch_errors_total").increment(1);
                Vec::new()
            }
        }
    }
}
