//! TTL-bounded memoization of pipeline output, keyed by the requested
//! window (`minutes_back`).
//!
//! Concurrent requests for the same key during the validity window share a
//! single pipeline execution: the first caller computes, the rest wait on a
//! per-key flight lock and read the freshly stored entry.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use lru::LruCache;
use metrics::counter;
use tokio::sync::Mutex;
use tracing::debug;

use crate::pipeline::TicketRow;

// More distinct windows than any dashboard realistically requests.
const MAX_CACHED_WINDOWS: usize = 64;

/// A cached dataset together with the instant it was computed.
#[derive(Clone)]
pub struct CachedDataset {
    pub rows: Arc<Vec<TicketRow>>,
    pub generated_at: DateTime<Utc>,
}

struct CacheEntry {
    rows: Arc<Vec<TicketRow>>,
    generated_at: DateTime<Utc>,
    expires_at: Instant,
}

/// TTL cache over enriched datasets.
pub struct DatasetCache {
    ttl: Duration,
    entries: Mutex<LruCache<u32, CacheEntry>>,
    flights: Mutex<HashMap<u32, Arc<Mutex<()>>>>,
}

impl DatasetCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(LruCache::new(
                NonZeroUsize::new(MAX_CACHED_WINDOWS).expect("capacity is non-zero"),
            )),
            flights: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached dataset for `key`, computing it at most once per
    /// TTL window even under concurrent callers.
    pub async fn get_or_compute<F, Fut>(&self, key: u32, compute: F) -> CachedDataset
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Vec<TicketRow>>,
    {
        if let Some(hit) = self.lookup(key).await {
            counter!("dataset_cache_hits_total").increment(1);
            return hit;
        }

        let flight = {
            let mut flights = self.flights.lock().await;
            flights
                .entry(key)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let _guard = flight.lock().await;

        // Another caller may have finished while we waited for the flight.
        if let Some(hit) = self.lookup(key).await {
            counter!("dataset_cache_hits_total").increment(1);
            return hit;
        }

        counter!("dataset_cache_misses_total").increment(1);
        let rows = compute().await;
        let dataset = self.store(key, rows).await;

        drop(_guard);
        self.flights.lock().await.remove(&key);

        dataset
    }

    /// Store a freshly computed dataset, restarting its TTL window.
    pub async fn store(&self, key: u32, rows: Vec<TicketRow>) -> CachedDataset {
        let dataset = CachedDataset {
            rows: Arc::new(rows),
            generated_at: Utc::now(),
        };

        let mut entries = self.entries.lock().await;
        entries.put(
            key,
            CacheEntry {
                rows: dataset.rows.clone(),
                generated_at: dataset.generated_at,
                expires_at: Instant::now() + self.ttl,
            },
        );

        debug!(key, row_count = dataset.rows.len(), "Cached dataset stored");
        dataset
    }

    /// Drop the entry for one window key.
    pub async fn invalidate(&self, key: u32) {
        self.entries.lock().await.pop(&key);
    }

    /// Drop every cached entry.
    pub async fn clear(&self) {
        self.entries.lock().await.clear();
        counter!("dataset_cache_clears_total").increment(1);
    }

    async fn lookup(&self, key: u32) -> Option<CachedDataset> {
        let mut entries = self.entries.lock().await;
        let entry = entries.get(&key)?;
        if entry.expires_at <= Instant::now() {
            entries.pop(&key);
            return None;
        }
        Some(CachedDataset {
            rows: entry.rows.clone(),
            generated_at: entry.generated_at,
        })
    }
}
