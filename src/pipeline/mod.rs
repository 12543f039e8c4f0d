//! # Enrichment Pipeline
//!
//! Turns raw incremental tickets into a rectangular dataset of enriched
//! rows: flattened channel, tag-derived sentiment, coerced satisfaction
//! score, resolved assignee identity/groups/last-login, and display-timezone
//! timestamps. One output row per input ticket.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info};
use utoipa::ToSchema;

use crate::zendesk::models::Ticket;
use crate::zendesk::source::TicketSource;

/// Display timestamps are shifted by a fixed offset from source UTC.
/// Deliberately not a full timezone conversion; not DST-aware.
const TIMEZONE_SHIFT_HOURS: i64 = 3;

/// One enriched ticket row. Every row carries every column; fields that
/// could not be derived or resolved are null, never fabricated.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct TicketRow {
    /// Source ticket identifier
    #[schema(example = 35436)]
    pub id: i64,
    /// Resolved assignee display name (null if unassigned or unresolved)
    pub assignee_name: Option<String>,
    /// Ticket status, lowercased and trimmed
    #[schema(example = "open")]
    pub status: Option<String>,
    /// Channel the ticket arrived through, flattened from `via.channel`
    #[schema(example = "email")]
    pub via_channel: Option<String>,
    /// Ticket type as reported by the source
    pub ticket_type: Option<String>,
    /// Creation time, shifted to display timezone (`YYYY-MM-DD HH:MM:SS`)
    #[schema(example = "2024-01-01 09:00:00")]
    pub created_at: Option<String>,
    /// Last update time, shifted to display timezone
    pub updated_at: Option<String>,
    /// Satisfaction score coerced to a float
    pub satisfaction_rating: Option<f64>,
    /// All tags joined with ", " (null when empty or malformed)
    pub tags: Option<String>,
    /// Five-level sentiment decoded from a `sentiment__<value>` tag
    #[schema(example = "very positive")]
    pub sentiment_5: Option<String>,
    /// Comma-joined group names for the assignee
    pub assignee_groups: Option<String>,
    /// Assignee's last login, shifted to display timezone
    pub assignee_last_login_at: Option<String>,
}

fn sentiment_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^sentiment__(very_positive|positive|neutral|negative|very_negative)$")
            .expect("sentiment pattern compiles")
    })
}

/// Decode the first sentiment-encoding tag, in source tag order.
/// `sentiment__very_positive` becomes `very positive`; no tag, no sentiment.
pub fn sentiment_from_tags(tags: &[String]) -> Option<String> {
    tags.iter().find_map(|tag| {
        sentiment_regex()
            .captures(tag.trim())
            .map(|captures| captures[1].to_lowercase().replace('_', " "))
    })
}

/// Parse a source timestamp, apply the fixed display shift, and format it.
/// Unparseable input degrades to `None`.
pub fn shift_timestamp(raw: &str) -> Option<String> {
    let parsed = DateTime::parse_from_rfc3339(raw.trim()).ok()?;
    let shifted = parsed.with_timezone(&Utc) - chrono::Duration::hours(TIMEZONE_SHIFT_HOURS);
    Some(shifted.format("%Y-%m-%d %H:%M:%S").to_string())
}

/// The data acquisition and enrichment pipeline.
pub struct TicketPipeline {
    source: Arc<dyn TicketSource>,
}

impl TicketPipeline {
    pub fn new(source: Arc<dyn TicketSource>) -> Self {
        Self { source }
    }

    /// Fetch the requested window and produce the enriched dataset.
    ///
    /// Always returns rows, possibly zero of them; upstream failures have
    /// already been degraded to empty sequences by the source. Calls go out
    /// strictly as tickets, then one user batch, then one group lookup per
    /// distinct assignee.
    pub async fn process(&self, minutes_back: u32) -> Vec<TicketRow> {
        let started = std::time::Instant::now();

        let tickets = self.source.fetch_tickets(minutes_back).await;
        if tickets.is_empty() {
            info!(minutes_back, "No tickets returned for window");
            return Vec::new();
        }
        counter!("tickets_fetched_total").increment(tickets.len() as u64);

        // Distinct assignees; an id shared by N tickets resolves once.
        let assignee_ids: Vec<i64> = tickets
            .iter()
            .filter_map(|t| t.assignee_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut id_to_name: HashMap<i64, String> = HashMap::new();
        let mut id_to_groups: HashMap<i64, String> = HashMap::new();
        let mut id_to_last_login: HashMap<i64, String> = HashMap::new();

        if !assignee_ids.is_empty() {
            let users = self.source.fetch_user_data(&assignee_ids).await;
            if !users.is_empty() {
                for user in &users {
                    if let Some(name) = &user.name {
                        id_to_name.insert(user.id, name.clone());
                    }
                    if let Some(last_login) = &user.last_login_at {
                        id_to_last_login.insert(user.id, last_login.clone());
                    }
                }

                for &id in &assignee_ids {
                    let groups = self.source.fetch_user_groups(id).await;
                    let joined = groups
                        .iter()
                        .filter_map(|g| g.name.clone())
                        .collect::<Vec<_>>()
                        .join(", ");
                    if !joined.is_empty() {
                        id_to_groups.insert(id, joined);
                    }
                }
            }
        }

        debug!(
            minutes_back,
            ticket_count = tickets.len(),
            assignee_count = assignee_ids.len(),
            resolved_names = id_to_name.len(),
            "Enriching tickets"
        );

        let rows: Vec<TicketRow> = tickets
            .iter()
            .map(|ticket| build_row(ticket, &id_to_name, &id_to_groups, &id_to_last_login))
            .collect();

        histogram!("pipeline_duration_ms").record(started.elapsed().as_secs_f64() * 1_000.0);

        rows
    }
}

fn build_row(
    ticket: &Ticket,
    id_to_name: &HashMap<i64, String>,
    id_to_groups: &HashMap<i64, String>,
    id_to_last_login: &HashMap<i64, String>,
) -> TicketRow {
    let tag_list = ticket.tag_list();
    let sentiment_5 = tag_list.as_deref().and_then(sentiment_from_tags);
    let tags = tag_list.and_then(|list| {
        if list.is_empty() {
            None
        } else {
            Some(list.join(", "))
        }
    });

    let assignee_id = ticket.assignee_id;

    TicketRow {
        id: ticket.id,
        assignee_name: assignee_id.and_then(|id| id_to_name.get(&id).cloned()),
        status: ticket
            .status
            .as_deref()
            .map(|s| s.trim().to_lowercase()),
        via_channel: ticket.via.as_ref().and_then(|v| v.channel.clone()),
        ticket_type: ticket.ticket_type.clone(),
        created_at: ticket.created_at.as_deref().and_then(shift_timestamp),
        updated_at: ticket.updated_at.as_deref().and_then(shift_timestamp),
        satisfaction_rating: ticket
            .satisfaction_rating
            .as_ref()
            .and_then(|rating| rating.score_f64()),
        tags,
        sentiment_5,
        assignee_groups: assignee_id.and_then(|id| id_to_groups.get(&id).cloned()),
        assignee_last_login_at: assignee_id
            .and_then(|id| id_to_last_login.get(&id))
            .and_then(|raw| shift_timestamp(raw)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zendesk::models::{Group, User};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct MockSource {
        tickets: Vec<Ticket>,
        users: Vec<User>,
        groups: HashMap<i64, Vec<Group>>,
        ticket_calls: AtomicUsize,
        user_calls: AtomicUsize,
        group_calls: AtomicUsize,
        last_user_ids: Mutex<Vec<i64>>,
    }

    #[async_trait]
    impl TicketSource for MockSource {
        async fn fetch_tickets(&self, _minutes_back: u32) -> Vec<Ticket> {
            self.ticket_calls.fetch_add(1, Ordering::SeqCst);
            self.tickets.clone()
        }

        async fn fetch_user_data(&self, ids: &[i64]) -> Vec<User> {
            self.user_calls.fetch_add(1, Ordering::SeqCst);
            *self.last_user_ids.lock().await = ids.to_vec();
            self.users.clone()
        }

        async fn fetch_user_groups(&self, user_id: i64) -> Vec<Group> {
            self.group_calls.fetch_add(1, Ordering::SeqCst);
            self.groups.get(&user_id).cloned().unwrap_or_default()
        }
    }

    fn ticket(value: serde_json::Value) -> Ticket {
        serde_json::from_value(value).unwrap()
    }

    fn user(id: i64, name: &str, last_login_at: Option<&str>) -> User {
        serde_json::from_value(json!({
            "id": id,
            "name": name,
            "last_login_at": last_login_at,
        }))
        .unwrap()
    }

    fn group(name: &str) -> Group {
        serde_json::from_value(json!({ "name": name })).unwrap()
    }

    #[test]
    fn sentiment_takes_first_matching_tag() {
        let tags: Vec<String> = ["urgent", "sentiment__very_positive", "other"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(sentiment_from_tags(&tags).as_deref(), Some("very positive"));
    }

    #[test]
    fn sentiment_is_null_without_matching_tag() {
        let tags = vec!["billing".to_string()];
        assert_eq!(sentiment_from_tags(&tags), None);
    }

    #[test]
    fn sentiment_matches_case_insensitively() {
        let tags = vec!["SENTIMENT__Negative".to_string()];
        assert_eq!(sentiment_from_tags(&tags).as_deref(), Some("negative"));
    }

    #[test]
    fn sentiment_rejects_partial_matches() {
        let tags = vec![
            "sentiment__angry".to_string(),
            "mysentiment__positive".to_string(),
            "sentiment__positive_extra".to_string(),
        ];
        assert_eq!(sentiment_from_tags(&tags), None);
    }

    #[test]
    fn timestamps_shift_back_three_hours() {
        assert_eq!(
            shift_timestamp("2024-01-01T12:00:00Z").as_deref(),
            Some("2024-01-01 09:00:00")
        );
        // Shift crosses the date boundary
        assert_eq!(
            shift_timestamp("2024-01-01T01:30:00Z").as_deref(),
            Some("2023-12-31 22:30:00")
        );
    }

    #[test]
    fn invalid_timestamp_degrades_to_null() {
        assert_eq!(shift_timestamp("not-a-timestamp"), None);
        assert_eq!(shift_timestamp(""), None);
    }

    #[tokio::test]
    async fn empty_window_short_circuits() {
        let source = Arc::new(MockSource::default());
        let pipeline = TicketPipeline::new(source.clone());

        let rows = pipeline.process(5).await;

        assert!(rows.is_empty());
        assert_eq!(source.ticket_calls.load(Ordering::SeqCst), 1);
        assert_eq!(source.user_calls.load(Ordering::SeqCst), 0);
        assert_eq!(source.group_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn shared_assignee_resolves_once() {
        let source = Arc::new(MockSource {
            tickets: vec![
                ticket(json!({ "id": 1, "assignee_id": 7 })),
                ticket(json!({ "id": 2, "assignee_id": 7 })),
                ticket(json!({ "id": 3, "assignee_id": 7 })),
            ],
            users: vec![user(7, "Ana Souza", None)],
            groups: HashMap::from([(7, vec![group("Tier 1")])]),
            ..Default::default()
        });
        let pipeline = TicketPipeline::new(source.clone());

        let rows = pipeline.process(5).await;

        assert_eq!(rows.len(), 3);
        assert_eq!(source.user_calls.load(Ordering::SeqCst), 1);
        assert_eq!(source.group_calls.load(Ordering::SeqCst), 1);
        assert_eq!(*source.last_user_ids.lock().await, vec![7]);
        for row in &rows {
            assert_eq!(row.assignee_name.as_deref(), Some("Ana Souza"));
            assert_eq!(row.assignee_groups.as_deref(), Some("Tier 1"));
        }
    }

    #[tokio::test]
    async fn unassigned_tickets_skip_identity_resolution() {
        let source = Arc::new(MockSource {
            tickets: vec![ticket(json!({ "id": 1, "status": "new" }))],
            ..Default::default()
        });
        let pipeline = TicketPipeline::new(source.clone());

        let rows = pipeline.process(5).await;

        assert_eq!(rows.len(), 1);
        assert_eq!(source.user_calls.load(Ordering::SeqCst), 0);
        assert_eq!(source.group_calls.load(Ordering::SeqCst), 0);
        assert_eq!(rows[0].assignee_name, None);
        assert_eq!(rows[0].assignee_groups, None);
        assert_eq!(rows[0].assignee_last_login_at, None);
    }

    #[tokio::test]
    async fn failed_user_batch_yields_nulls_and_no_group_calls() {
        // An empty user batch is what a failed fetch degrades to.
        let source = Arc::new(MockSource {
            tickets: vec![ticket(json!({ "id": 1, "assignee_id": 9 }))],
            ..Default::default()
        });
        let pipeline = TicketPipeline::new(source.clone());

        let rows = pipeline.process(5).await;

        assert_eq!(source.user_calls.load(Ordering::SeqCst), 1);
        assert_eq!(source.group_calls.load(Ordering::SeqCst), 0);
        assert_eq!(rows[0].assignee_name, None);
        assert_eq!(rows[0].assignee_groups, None);
    }

    #[tokio::test]
    async fn full_row_enrichment() {
        let source = Arc::new(MockSource {
            tickets: vec![ticket(json!({
                "id": 10,
                "status": " Open ",
                "type": "incident",
                "via": { "channel": "email" },
                "tags": ["vip", "sentiment__neutral"],
                "satisfaction_rating": { "score": "4.0" },
                "assignee_id": 3,
                "created_at": "2024-01-01T12:00:00Z",
                "updated_at": "2024-01-02T00:15:00Z"
            }))],
            users: vec![user(3, "Jo Lima", Some("2024-01-01T06:00:00Z"))],
            groups: HashMap::from([(3, vec![group("Tier 1"), group("VIP Desk")])]),
            ..Default::default()
        });
        let pipeline = TicketPipeline::new(source.clone());

        let rows = pipeline.process(30).await;
        assert_eq!(rows.len(), 1);
        let row = &rows[0];

        assert_eq!(row.id, 10);
        assert_eq!(row.status.as_deref(), Some("open"));
        assert_eq!(row.via_channel.as_deref(), Some("email"));
        assert_eq!(row.ticket_type.as_deref(), Some("incident"));
        assert_eq!(row.created_at.as_deref(), Some("2024-01-01 09:00:00"));
        assert_eq!(row.updated_at.as_deref(), Some("2024-01-01 21:15:00"));
        assert_eq!(row.satisfaction_rating, Some(4.0));
        assert_eq!(row.tags.as_deref(), Some("vip, sentiment__neutral"));
        assert_eq!(row.sentiment_5.as_deref(), Some("neutral"));
        assert_eq!(row.assignee_name.as_deref(), Some("Jo Lima"));
        assert_eq!(row.assignee_groups.as_deref(), Some("Tier 1, VIP Desk"));
        assert_eq!(
            row.assignee_last_login_at.as_deref(),
            Some("2024-01-01 03:00:00")
        );
    }

    #[tokio::test]
    async fn malformed_tags_degrade_to_null_fields() {
        let source = Arc::new(MockSource {
            tickets: vec![ticket(json!({ "id": 1, "tags": "oops-not-a-list" }))],
            ..Default::default()
        });
        let pipeline = TicketPipeline::new(source);

        let rows = pipeline.process(5).await;
        assert_eq!(rows[0].tags, None);
        assert_eq!(rows[0].sentiment_5, None);
    }

    #[tokio::test]
    async fn repeated_runs_are_idempotent_for_unchanged_upstream() {
        let source = Arc::new(MockSource {
            tickets: vec![
                ticket(json!({
                    "id": 1,
                    "assignee_id": 5,
                    "tags": ["sentiment__positive"],
                    "created_at": "2024-03-01T10:00:00Z"
                })),
                ticket(json!({ "id": 2 })),
            ],
            users: vec![user(5, "Rui Costa", None)],
            groups: HashMap::from([(5, vec![group("Tier 2")])]),
            ..Default::default()
        });
        let pipeline = TicketPipeline::new(source);

        let first = pipeline.process(5).await;
        let second = pipeline.process(5).await;
        assert_eq!(first, second);
    }
}
