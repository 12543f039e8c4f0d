//! # Server Configuration
//!
//! Server setup and wiring for the Ticketboard API: builds the Zendesk
//! client, pipeline, cache, and background refresher, then serves the
//! HTTP surface.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    routing::{get, post},
};
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::cache::DatasetCache;
use crate::config::AppConfig;
use crate::handlers;
use crate::pipeline::TicketPipeline;
use crate::refresher::CacheRefresher;
use crate::zendesk::ZendeskClient;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub cache: Arc<DatasetCache>,
    pub pipeline: Arc<TicketPipeline>,
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/tickets", get(handlers::tickets::list_tickets))
        .route("/refresh", post(handlers::tickets::refresh_cache))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
}

/// Starts the server with the given configuration
pub async fn run_server(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let config = Arc::new(config);

    let client = ZendeskClient::new(&config.zendesk)?;
    let pipeline = Arc::new(TicketPipeline::new(Arc::new(client)));
    let cache = Arc::new(DatasetCache::new(Duration::from_secs(
        config.cache.ttl_seconds,
    )));

    let shutdown = CancellationToken::new();
    let refresher = CacheRefresher::new(config.clone(), cache.clone(), pipeline.clone());
    let refresher_task = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { refresher.run(shutdown).await }
    });

    let state = AppState {
        config: config.clone(),
        cache,
        pipeline,
    };
    let app = create_app(state);

    // Resolve the configured bind address
    let addr = config
        .bind_addr()
        .map_err(|e| format!("Invalid server address: {}", e))?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, profile = %config.profile, "Server listening");

    axum::serve(listener, app).await?;

    shutdown.cancel();
    refresher_task.await?;

    Ok(())
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::tickets::list_tickets,
        crate::handlers::tickets::refresh_cache,
    ),
    components(
        schemas(
            crate::handlers::ServiceInfo,
            crate::handlers::tickets::TicketsResponse,
            crate::handlers::tickets::RefreshResponse,
            crate::pipeline::TicketRow,
            crate::error::ApiError,
        )
    ),
    info(
        title = "Ticketboard API",
        description = "Enriched support-ticket dataset service",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
