//! # Cache Refresher
//!
//! Background task that periodically re-runs the pipeline for the default
//! window and re-primes the dataset cache, so interactive reads rarely pay
//! for a cold fetch. Runs until its shutdown token fires; the continuous
//! re-render loop of the display layer stays out of process.

use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, histogram};
use rand::Rng;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::cache::DatasetCache;
use crate::config::AppConfig;
use crate::pipeline::TicketPipeline;

/// Periodically refreshes the cached dataset for the configured window.
pub struct CacheRefresher {
    config: Arc<AppConfig>,
    cache: Arc<DatasetCache>,
    pipeline: Arc<TicketPipeline>,
}

impl CacheRefresher {
    pub fn new(
        config: Arc<AppConfig>,
        cache: Arc<DatasetCache>,
        pipeline: Arc<TicketPipeline>,
    ) -> Self {
        Self {
            config,
            cache,
            pipeline,
        }
    }

    /// Run the refresh loop until the provided shutdown token fires.
    #[instrument(skip_all)]
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            tick_seconds = self.config.refresher.tick_seconds,
            window_minutes = self.config.refresher.window_minutes,
            "Starting cache refresher"
        );

        loop {
            let interval = self.jittered_interval();
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Cache refresher shutdown requested");
                    break;
                }
                _ = sleep(interval) => {
                    let tick_started = std::time::Instant::now();
                    self.tick().await;
                    histogram!("cache_refresh_tick_duration_ms")
                        .record(tick_started.elapsed().as_secs_f64() * 1_000.0);
                }
            }
        }

        info!("Cache refresher stopped");
    }

    /// Execute one refresh tick.
    pub async fn tick(&self) {
        let window = self.config.refresher.window_minutes;
        let rows = self.pipeline.process(window).await;

        debug!(
            window_minutes = window,
            row_count = rows.len(),
            "Refreshed cached dataset"
        );
        counter!("cache_refresh_ticks_total").increment(1);

        self.cache.store(window, rows).await;
    }

    /// Tick interval with bounded random jitter so restarts do not align
    /// every instance against the upstream API.
    fn jittered_interval(&self) -> Duration {
        let base = self.config.refresher.tick_seconds as f64;
        let jitter_factor = self.config.refresher.jitter_factor;
        if jitter_factor <= 0.0 {
            return Duration::from_secs_f64(base);
        }

        let jitter = rand::thread_rng().gen_range(-jitter_factor..=jitter_factor);
        Duration::from_secs_f64((base * (1.0 + jitter)).max(1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, CacheConfig, RefresherConfig, ZendeskConfig};
    use crate::zendesk::models::{Group, Ticket, User};
    use crate::zendesk::source::TicketSource;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TicketSource for StaticSource {
        async fn fetch_tickets(&self, _minutes_back: u32) -> Vec<Ticket> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            vec![serde_json::from_value(serde_json::json!({ "id": 1 })).unwrap()]
        }

        async fn fetch_user_data(&self, _ids: &[i64]) -> Vec<User> {
            Vec::new()
        }

        async fn fetch_user_groups(&self, _user_id: i64) -> Vec<Group> {
            Vec::new()
        }
    }

    fn test_config() -> AppConfig {
        AppConfig {
            profile: "test".to_string(),
            api_bind_addr: "127.0.0.1:0".to_string(),
            log_level: "info".to_string(),
            zendesk: ZendeskConfig::default(),
            cache: CacheConfig { ttl_seconds: 60 },
            refresher: RefresherConfig {
                tick_seconds: 10,
                window_minutes: 5,
                jitter_factor: 0.0,
            },
        }
    }

    #[tokio::test]
    async fn tick_primes_cache_for_default_window() {
        let source = Arc::new(StaticSource {
            calls: AtomicUsize::new(0),
        });
        let pipeline = Arc::new(TicketPipeline::new(source.clone()));
        let cache = Arc::new(DatasetCache::new(Duration::from_secs(60)));
        let refresher = CacheRefresher::new(Arc::new(test_config()), cache.clone(), pipeline);

        refresher.tick().await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        // The subsequent interactive read is served from cache.
        let dataset = cache
            .get_or_compute(5, || async {
                panic!("cache should already be primed");
            })
            .await;
        assert_eq!(dataset.rows.len(), 1);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn run_stops_on_cancellation() {
        let source = Arc::new(StaticSource {
            calls: AtomicUsize::new(0),
        });
        let pipeline = Arc::new(TicketPipeline::new(source));
        let cache = Arc::new(DatasetCache::new(Duration::from_secs(60)));
        let refresher =
            Arc::new(CacheRefresher::new(Arc::new(test_config()), cache, pipeline));

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn({
            let refresher = refresher.clone();
            let shutdown = shutdown.clone();
            async move { refresher.run(shutdown).await }
        });

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("refresher exits promptly")
            .unwrap();
    }

    #[test]
    fn zero_jitter_uses_exact_interval() {
        let source = Arc::new(StaticSource {
            calls: AtomicUsize::new(0),
        });
        let pipeline = Arc::new(TicketPipeline::new(source));
        let cache = Arc::new(DatasetCache::new(Duration::from_secs(60)));
        let refresher = CacheRefresher::new(Arc::new(test_config()), cache, pipeline);

        assert_eq!(refresher.jittered_interval(), Duration::from_secs(10));
    }
}
