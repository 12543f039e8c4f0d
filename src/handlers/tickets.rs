//! # Tickets Endpoint Handlers
//!
//! `GET /tickets` serves the enriched dataset for a requested time window,
//! through the TTL cache. `POST /refresh` clears the cache so the next read
//! recomputes against live upstream data.

use axum::{extract::Query, extract::State, response::Json};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use crate::error::{ApiError, validation_error};
use crate::pipeline::TicketRow;
use crate::server::AppState;

const MIN_WINDOW_MINUTES: u32 = 1;
const MAX_WINDOW_MINUTES: u32 = 1_440;

/// Query parameters for the tickets endpoint
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct ListTicketsQuery {
    /// How many minutes back to fetch tickets for (1-1440); defaults to the
    /// configured refresher window
    pub minutes_back: Option<u32>,
}

/// Enriched dataset response
#[derive(Debug, Serialize, ToSchema)]
pub struct TicketsResponse {
    /// One row per ticket in the window
    pub rows: Vec<TicketRow>,
    /// Number of rows returned
    pub row_count: usize,
    /// The window the dataset covers
    pub minutes_back: u32,
    /// When this dataset was computed (RFC3339); reflects cache age
    #[schema(example = "2024-01-15T10:30:00Z")]
    pub generated_at: String,
}

/// Response for a cache refresh request
#[derive(Debug, Serialize, ToSchema)]
pub struct RefreshResponse {
    /// Whether the cache was cleared
    pub cleared: bool,
}

/// Serve the enriched ticket dataset for a time window
#[utoipa::path(
    get,
    path = "/tickets",
    params(ListTicketsQuery),
    responses(
        (status = 200, description = "Enriched ticket dataset", body = TicketsResponse),
        (status = 400, description = "Invalid query parameters", body = ApiError, example = json!({
            "code": "VALIDATION_FAILED",
            "message": "minutes_back must be between 1 and 1440",
            "details": { "minutes_back": 0 },
            "trace_id": "corr-12345678"
        }))
    ),
    tag = "tickets"
)]
pub async fn list_tickets(
    State(state): State<AppState>,
    Query(query): Query<ListTicketsQuery>,
) -> Result<Json<TicketsResponse>, ApiError> {
    let minutes_back = query
        .minutes_back
        .unwrap_or(state.config.refresher.window_minutes);
    if !(MIN_WINDOW_MINUTES..=MAX_WINDOW_MINUTES).contains(&minutes_back) {
        return Err(validation_error(
            "minutes_back must be between 1 and 1440",
            serde_json::json!({ "minutes_back": minutes_back }),
        ));
    }

    let pipeline = state.pipeline.clone();
    let dataset = state
        .cache
        .get_or_compute(minutes_back, move || async move {
            pipeline.process(minutes_back).await
        })
        .await;

    Ok(Json(TicketsResponse {
        row_count: dataset.rows.len(),
        rows: dataset.rows.as_ref().clone(),
        minutes_back,
        generated_at: dataset.generated_at.to_rfc3339(),
    }))
}

/// Clear the dataset cache
#[utoipa::path(
    post,
    path = "/refresh",
    responses(
        (status = 200, description = "Cache cleared", body = RefreshResponse)
    ),
    tag = "tickets"
)]
pub async fn refresh_cache(State(state): State<AppState>) -> Json<RefreshResponse> {
    info!("Clearing dataset cache on request");
    state.cache.clear().await;
    Json(RefreshResponse { cleared: true })
}
