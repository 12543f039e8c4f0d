//! Wire models for the Zendesk REST API.
//!
//! Deserialization is deliberately lenient: every field the pipeline derives
//! from is optional, and unknown fields are ignored. A partially populated
//! ticket degrades specific derived columns to null downstream instead of
//! failing the whole fetch.

use serde::Deserialize;
use serde_json::Value;

/// A ticket as returned by `GET /incremental/tickets.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct Ticket {
    pub id: i64,
    pub status: Option<String>,
    pub via: Option<Via>,
    /// Kept as raw JSON: a payload where `tags` is present but not an array
    /// is treated the same as an absent `tags` field.
    pub tags: Option<Value>,
    pub satisfaction_rating: Option<SatisfactionRating>,
    pub assignee_id: Option<i64>,
    #[serde(rename = "type")]
    pub ticket_type: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

/// Nested `via` structure; only the channel is retained.
#[derive(Debug, Clone, Deserialize)]
pub struct Via {
    pub channel: Option<String>,
}

/// Nested satisfaction rating; the score may arrive as a number or a string.
#[derive(Debug, Clone, Deserialize)]
pub struct SatisfactionRating {
    pub score: Option<Value>,
}

impl SatisfactionRating {
    /// Coerce the score to a float; non-numeric values become `None`.
    pub fn score_f64(&self) -> Option<f64> {
        match self.score.as_ref()? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }
}

impl Ticket {
    /// The ticket's tags as strings, or `None` when absent or malformed.
    /// Non-string array elements are skipped.
    pub fn tag_list(&self) -> Option<Vec<String>> {
        let tags = self.tags.as_ref()?.as_array()?;
        Some(
            tags.iter()
                .filter_map(|t| t.as_str().map(|s| s.to_string()))
                .collect(),
        )
    }
}

/// A user record from `GET /users/show_many.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: Option<String>,
    pub last_login_at: Option<String>,
}

/// A group record from `GET /users/{id}/groups.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct Group {
    pub name: Option<String>,
}

/// Envelope for the incremental tickets response.
#[derive(Debug, Deserialize)]
pub struct TicketsEnvelope {
    #[serde(default)]
    pub tickets: Vec<Ticket>,
}

/// Envelope for the batch users response.
#[derive(Debug, Deserialize)]
pub struct UsersEnvelope {
    #[serde(default)]
    pub users: Vec<User>,
}

/// Envelope for the user groups response.
#[derive(Debug, Deserialize)]
pub struct GroupsEnvelope {
    #[serde(default)]
    pub groups: Vec<Group>,
}
