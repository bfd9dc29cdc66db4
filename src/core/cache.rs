//! Time-limited read cache
//!
//! Memoizes `find` results keyed by the serialised (query, options,
//! storage options) triple. Entries expire after the configured lifespan and
//! are pruned lazily whenever the cache is read; there is no background task.
//!
//! Every fetch is recorded, even while the cache is disabled, so each live
//! entry holds a full copy of one result set. The entry count is capped and
//! the oldest entry makes room for a new one.

use crate::core::{Document, Query};
use crate::storage::{DocumentStore, FindOptions};
use anyhow::Result;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct CacheEntry {
    data: Vec<Document>,
    inserted: Instant,
}

/// Time-limited cache of read results
#[derive(Debug)]
pub struct DataCache {
    enabled: bool,
    lifespan: Duration,
    max_entries: usize,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl DataCache {
    pub const DEFAULT_MAX_ENTRIES: usize = 256;

    pub fn new(enabled: bool, lifespan: Duration) -> Self {
        Self {
            enabled,
            lifespan,
            max_entries: Self::DEFAULT_MAX_ENTRIES,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Cap the number of live entries (at least one)
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries.max(1);
        self
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn lifespan(&self) -> Duration {
        self.lifespan
    }

    /// Build the cache key for a read
    pub fn key<O: Serialize>(query: &Query, options: &O, find_options: &FindOptions) -> String {
        let part = |value: serde_json::Result<String>| {
            value.unwrap_or_else(|e| {
                tracing::warn!("failed to serialise cache key: {}", e);
                String::new()
            })
        };
        format!(
            "{}{}{}",
            part(serde_json::to_string(query)),
            part(serde_json::to_string(options)),
            part(serde_json::to_string(find_options))
        )
    }

    /// Return cached data for the read, or fetch it from the store
    ///
    /// Expired entries are pruned first. Fresh results are always recorded,
    /// even while the cache is disabled.
    pub async fn get<O: Serialize>(
        &self,
        store: &dyn DocumentStore,
        collection: &str,
        query: &Query,
        options: &O,
        find_options: &FindOptions,
    ) -> Result<Vec<Document>> {
        let key = Self::key(query, options, find_options);
        self.prune();

        if self.enabled {
            if let Some(data) = self.lookup(&key) {
                tracing::trace!(collection, "cache hit");
                return Ok(data);
            }
        }

        let data = store.find(collection, query, find_options).await?;
        self.record(key, data.clone());
        Ok(data)
    }

    fn lookup(&self, key: &str) -> Option<Vec<Document>> {
        match self.entries.lock() {
            Ok(entries) => entries.get(key).map(|e| e.data.clone()),
            Err(e) => {
                tracing::warn!("cache lock poisoned: {}", e);
                None
            }
        }
    }

    fn record(&self, key: String, data: Vec<Document>) {
        match self.entries.lock() {
            Ok(mut entries) => {
                while entries.len() >= self.max_entries && !entries.contains_key(&key) {
                    let oldest = entries
                        .iter()
                        .min_by_key(|(_, e)| e.inserted)
                        .map(|(k, _)| k.clone());
                    match oldest {
                        Some(oldest) => entries.remove(&oldest),
                        None => break,
                    };
                }
                entries.insert(
                    key,
                    CacheEntry {
                        data,
                        inserted: Instant::now(),
                    },
                );
            }
            Err(e) => tracing::warn!("cache lock poisoned: {}", e),
        }
    }

    /// Remove every entry older than the lifespan
    pub fn prune(&self) {
        let now = Instant::now();
        match self.entries.lock() {
            Ok(mut entries) => entries.retain(|_, e| now <= e.inserted + self.lifespan),
            Err(e) => tracing::warn!("cache lock poisoned: {}", e),
        }
    }

    /// Number of live entries (expired ones may still be counted until pruned)
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
